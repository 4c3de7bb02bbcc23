//! Seed scenario 6 (spec §8): a one-shot channel's completion latch sets
//! exactly once, on the frame its duration counter reaches zero, and reads
//! as 0 on every other frame boundary.

use nitro_core::apu::Apu;
use nitro_core::cpu::PendingInterrupt;
use nitro_core::ppu::InterruptSink;

struct NullSink;
impl InterruptSink for NullSink {
    fn raise(&mut self, _kind: PendingInterrupt) {}
}

#[test]
fn one_shot_square_channel_completes_on_the_expected_frame() {
    let mut apu = Apu::new();
    let mut sink = NullSink;

    // channel 0: 440 Hz square, full volume, one-shot, duration 30 frames.
    apu.write_io(0, (440u16 & 0xFF) as u8);
    apu.write_io(1, (440u16 >> 8) as u8);
    apu.write_io(2, 0xFF);
    apu.write_io(4, 30);
    apu.write_io(5, 0);
    apu.write_io(6, 0); // one-shot
    apu.write_io(3, 0x01 | (1 << 1)); // enabled, waveform = square

    for frame in 0..31u32 {
        apu.tick_frame_boundary(&mut sink);
        let status = apu.read_io(0x21);
        if frame == 29 {
            assert_eq!(status, 0x01, "completion bit must set on the 30th frame boundary");
        } else {
            assert_eq!(status, 0, "completion bit must read 0 on frame {frame}");
        }
    }
}

#[test]
fn completion_latch_drains_on_read_and_stays_clear() {
    let mut apu = Apu::new();
    let mut sink = NullSink;

    apu.write_io(3, 0x01); // channel 0 enabled, sine
    apu.write_io(4, 1);
    apu.write_io(6, 0); // one-shot

    apu.tick_frame_boundary(&mut sink);
    assert_eq!(apu.read_io(0x21), 0x01);
    assert_eq!(apu.read_io(0x21), 0, "a second read without a new completion must return 0");

    apu.tick_frame_boundary(&mut sink);
    assert_eq!(apu.read_io(0x21), 0, "channel is disabled after completing; no further latch");
}
