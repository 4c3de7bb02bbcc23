//! Per-dot pixel compositing: backgrounds (flat or Matrix Mode), sprites,
//! windowing, and the draw-order/priority rules of spec §4.4.5-4.4.6.
//!
//! Tile and sprite graphics are both 4bpp, two pixels per byte with the
//! left pixel in the high nibble. A tile's pixel data lives at
//! `tile_index * bytes_per_tile` in VRAM directly (there is no separate
//! character-base register in the I/O map) — this is consistent with the
//! seed scenario in spec §8 that fills VRAM tile 0 at address 0 and
//! references it as "tile 0" from both a background tilemap entry and an
//! OAM sprite.

use super::color::{blend5, rgb555_to_rgb888, BlendMode};
use super::{BgLayer, OutsideMode, Ppu};

#[derive(Clone, Copy)]
struct Entry {
    priority: u8,
    is_sprite: bool,
    index: usize,
}

pub fn render_pixel(ppu: &Ppu, x: u16, y: u16) -> [u8; 3] {
    let mut entries: Vec<Entry> = Vec::with_capacity(8);

    for (i, layer) in ppu.bg.iter().enumerate() {
        if layer.enabled && layer_visible(ppu, i, x, y) {
            // BG0 must end up drawn last (topmost) among backgrounds, so it
            // gets the highest priority number here; the draw loop below
            // paints ascending priority, writing the highest-priority entry
            // last.
            entries.push(Entry { priority: (3 - i) as u8, is_sprite: false, index: i });
        }
    }

    for sprite in 0..super::SPRITE_COUNT {
        let control = ppu.oam_byte(sprite, 4);
        if control & 0x01 == 0 {
            continue;
        }
        if let Some(bbox) = sprite_bbox(ppu, sprite) {
            if bbox.contains(x, y) {
                let attr = ppu.oam_byte(sprite, 3);
                let priority = (attr >> 6) & 0x3;
                entries.push(Entry { priority, is_sprite: true, index: sprite });
            }
        }
    }

    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.is_sprite.cmp(&b.is_sprite))
            .then(a.index.cmp(&b.index))
    });

    let mut current = rgb555_to_rgb888(ppu.cgram_word(0));
    for entry in entries {
        if entry.is_sprite {
            if let Some((color, mode, alpha)) = sprite_pixel(ppu, entry.index, x, y) {
                current = blend5(mode, color, current, alpha);
            }
        } else {
            current = bg_pixel(ppu, entry.index, x, y);
        }
    }
    current
}

struct BBox {
    x: u16,
    y: u16,
    size: u16,
}

impl BBox {
    fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x && x < self.x + self.size && y >= self.y && y < self.y + self.size
    }
}

fn sprite_bbox(ppu: &Ppu, sprite: usize) -> Option<BBox> {
    let x_low = ppu.oam_byte(sprite, 0);
    let y = ppu.oam_byte(sprite, 1);
    let x_high = ppu.oam_byte(sprite, 5) & 1;
    let control = ppu.oam_byte(sprite, 4);
    let size = if control & 0x02 != 0 { 16 } else { 8 };
    let x = x_low as u16 | ((x_high as u16) << 8);
    Some(BBox { x, y: y as u16, size })
}

fn window_visible(ppu: &Ppu, layer: usize, x: u16, y: u16) -> bool {
    let enables = [ppu.window_enable[layer][0], ppu.window_enable[layer][1]];
    if !enables[0] && !enables[1] {
        return true;
    }
    let inside0 = enables[0] && ppu.windows[0].contains(x, y);
    let inside1 = enables[1] && ppu.windows[1].contains(x, y);
    ppu.window_logic[layer].combine(inside0, inside1)
}

fn layer_visible(ppu: &Ppu, layer: usize, x: u16, y: u16) -> bool {
    window_visible(ppu, layer, x, y)
}

fn apply_mosaic(layer: &BgLayer, x: u16, y: u16) -> (u16, u16) {
    if layer.mosaic.enabled && layer.mosaic.size > 1 {
        let size = layer.mosaic.size as u16;
        (x - (x % size), y - (y % size))
    } else {
        (x, y)
    }
}

fn tile_color(ppu: &Ppu, tile_index: u8, tile_size: u8, px: u16, py: u16) -> u8 {
    let bytes_per_row = tile_size as u32 / 2;
    let bytes_per_tile = tile_size as u32 * bytes_per_row;
    let base = tile_index as u32 * bytes_per_tile + py as u32 * bytes_per_row;
    let byte = ppu.vram_byte((base + px as u32 / 2) as u16);
    if px % 2 == 0 {
        byte >> 4
    } else {
        byte & 0xF
    }
}

fn cgram_lookup(ppu: &Ppu, palette: u8, color_index: u8) -> [u8; 3] {
    let idx = (palette & 0xF) * 16 + (color_index & 0xF);
    rgb555_to_rgb888(ppu.cgram_word(idx))
}

fn bg_pixel(ppu: &Ppu, layer_index: usize, x: u16, y: u16) -> [u8; 3] {
    let layer = &ppu.bg[layer_index];
    if layer.matrix.enabled {
        return matrix_bg_pixel(ppu, layer, x, y);
    }

    let (ex, ey) = apply_mosaic(layer, x, y);
    let span = 32 * layer.tile_size as i32;
    let world_x = (ex as i32 + layer.scroll_x as i32).rem_euclid(span) as u16;
    let world_y = (ey as i32 + layer.scroll_y as i32).rem_euclid(span) as u16;

    let tile_size = layer.tile_size as u16;
    let tx = world_x / tile_size;
    let ty = world_y / tile_size;
    let mut px = world_x % tile_size;
    let mut py = world_y % tile_size;

    let entry_addr = layer.tilemap_base.wrapping_add((ty * 32 + tx) * 2);
    let tile_index = ppu.vram_byte(entry_addr);
    let attrs = ppu.vram_byte(entry_addr.wrapping_add(1));

    if attrs & 0x10 != 0 {
        px = tile_size - 1 - px;
    }
    if attrs & 0x20 != 0 {
        py = tile_size - 1 - py;
    }

    let color_index = tile_color(ppu, tile_index, layer.tile_size, px, py);
    if color_index == 0 {
        cgram_lookup(ppu, 0, 0)
    } else {
        cgram_lookup(ppu, attrs & 0xF, color_index)
    }
}

fn matrix_bg_pixel(ppu: &Ppu, layer: &BgLayer, x: u16, y: u16) -> [u8; 3] {
    let m = &layer.matrix;
    let (mut sx, mut sy) = (x as i32, y as i32);
    if m.mirror_h {
        sx = super::FRAME_WIDTH as i32 - 1 - sx;
    }
    if m.mirror_v {
        sy = super::FRAME_HEIGHT as i32 - 1 - sy;
    }

    let dx = sx - m.cx as i32;
    let dy = sy - m.cy as i32;
    // 8.8 fixed-point matrix multiply, results shifted back down by 8.
    let world_x = ((m.a as i32 * dx + m.b as i32 * dy) >> 8) + layer.scroll_x as i32;
    let world_y = ((m.c as i32 * dx + m.d as i32 * dy) >> 8) + layer.scroll_y as i32;

    let tile_size = layer.tile_size as i32;
    let span = 32 * tile_size;
    let out_of_bounds = world_x < 0 || world_y < 0 || world_x >= span || world_y >= span;

    let (tile_index, px, py) = if out_of_bounds {
        match m.outside {
            OutsideMode::Wrap => {
                let wx = world_x.rem_euclid(span) as u16;
                let wy = world_y.rem_euclid(span) as u16;
                tile_lookup(ppu, layer, wx, wy)
            }
            OutsideMode::Backdrop => return cgram_lookup(ppu, 0, 0),
            OutsideMode::Tile0 => (0u8, (world_x.rem_euclid(tile_size)) as u16, (world_y.rem_euclid(tile_size)) as u16),
        }
    } else {
        tile_lookup(ppu, layer, world_x as u16, world_y as u16)
    };

    let color_index = tile_color(ppu, tile_index, layer.tile_size, px, py);
    if m.direct_color {
        let packed = ((color_index as u16) << 11) | ((color_index as u16) << 6) | (color_index as u16 << 1);
        rgb555_to_rgb888(packed)
    } else if color_index == 0 {
        cgram_lookup(ppu, 0, 0)
    } else {
        // attribute palette only available via the tilemap entry, re-read here
        let tile_size16 = layer.tile_size as u16;
        let tx = (world_x.rem_euclid(32 * tile_size)) as u16 / tile_size16;
        let ty = (world_y.rem_euclid(32 * tile_size)) as u16 / tile_size16;
        let entry_addr = layer.tilemap_base.wrapping_add((ty * 32 + tx) * 2);
        let attrs = ppu.vram_byte(entry_addr.wrapping_add(1));
        cgram_lookup(ppu, attrs & 0xF, color_index)
    }
}

fn tile_lookup(ppu: &Ppu, layer: &BgLayer, world_x: u16, world_y: u16) -> (u8, u16, u16) {
    let tile_size = layer.tile_size as u16;
    let tx = world_x / tile_size;
    let ty = world_y / tile_size;
    let entry_addr = layer.tilemap_base.wrapping_add((ty * 32 + tx) * 2);
    let tile_index = ppu.vram_byte(entry_addr);
    (tile_index, world_x % tile_size, world_y % tile_size)
}

fn sprite_pixel(ppu: &Ppu, sprite: usize, x: u16, y: u16) -> Option<([u8; 3], BlendMode, u8)> {
    let bbox = sprite_bbox(ppu, sprite)?;
    let size = bbox.size;
    let mut px = x - bbox.x;
    let mut py = y - bbox.y;

    let attr = ppu.oam_byte(sprite, 3);
    if attr & 0x10 != 0 {
        px = size - 1 - px;
    }
    if attr & 0x20 != 0 {
        py = size - 1 - py;
    }

    // A sprite's graphics are one contiguous block sized to its own
    // dimensions (8x8 or 16x16), addressed from its single `tile_index` the
    // same way a background tile is — not four separate 8x8 subtiles.
    let tile_index = ppu.oam_byte(sprite, 2);
    let color_index = tile_color(ppu, tile_index, size as u8, px, py);
    if color_index == 0 {
        return None;
    }

    let palette = attr & 0xF;
    let color = cgram_lookup(ppu, palette, color_index);

    let control = ppu.oam_byte(sprite, 4);
    let mode = BlendMode::from_bits(control >> 2);
    let alpha = ((control >> 4) & 0xF) * 2;
    Some((color, mode, alpha))
}
