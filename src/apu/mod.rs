//! 4-channel waveform synthesis with fixed-point phase accumulators,
//! completion latch, and fractional sample-rate resampling (spec §4.5).
//!
//! Grounded on `pokey.rs`'s divider/phase-based tone generation and its
//! register read/write dispatch table; the fractional-accumulator
//! resampler is this core's equivalent of that device's internal clock
//! divider, adapted to hit an exact 44.1 kHz output rate from an arbitrary
//! CPU clock instead of a fixed hardware divider ratio.

use crate::ppu::InterruptSink;
use std::f64::consts::TAU;

pub const SAMPLE_RATE: u32 = 44_100;
pub const CYCLES_PER_FRAME: u32 = 127_820;
pub const FRAMES_PER_SECOND: u32 = 60;
pub const CPU_CLOCK_RATE: u64 = CYCLES_PER_FRAME as u64 * FRAMES_PER_SECOND as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Noise,
}

impl Waveform {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Sine,
            1 => Self::Square,
            2 => Self::Saw,
            _ => Self::Noise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMode {
    OneShot,
    Loop,
}

pub struct Channel {
    pub enabled: bool,
    pub waveform: Waveform,
    pub freq: u16,
    pub volume: u8,
    pub phase: u32,
    pub duration: u16,
    pub initial_duration: u16,
    pub duration_mode: DurationMode,
    lfsr: u16,
}

impl Channel {
    fn new() -> Self {
        Self {
            enabled: false,
            waveform: Waveform::Sine,
            freq: 0,
            volume: 0,
            phase: 0,
            duration: 0,
            initial_duration: 0,
            duration_mode: DurationMode::OneShot,
            lfsr: 0xACE1,
        }
    }

    fn phase_increment(&self) -> u32 {
        ((self.freq as u64 * (1u64 << 32)) / SAMPLE_RATE as u64) as u32
    }

    /// Advances phase by one sample period; for `noise`, the LFSR advances
    /// once per period crossing (i.e. once per 32-bit phase wraparound),
    /// not once per sample.
    fn advance(&mut self) {
        let increment = self.phase_increment();
        let (next, wrapped) = self.phase.overflowing_add(increment);
        self.phase = next;
        if wrapped && self.waveform == Waveform::Noise {
            let bit = (self.lfsr ^ (self.lfsr >> 2) ^ (self.lfsr >> 3) ^ (self.lfsr >> 5)) & 1;
            self.lfsr = (self.lfsr >> 1) | (bit << 15);
        }
    }

    fn raw_sample(&self) -> i32 {
        match self.waveform {
            Waveform::Sine => {
                let angle = self.phase as f64 / (u32::MAX as f64 + 1.0) * TAU;
                (angle.sin() * i16::MAX as f64) as i32
            }
            Waveform::Square => {
                if self.phase & 0x8000_0000 != 0 {
                    i16::MIN as i32
                } else {
                    i16::MAX as i32
                }
            }
            Waveform::Saw => (self.phase.wrapping_sub(0x8000_0000) >> 16) as i16 as i32,
            Waveform::Noise => {
                if self.lfsr & 1 != 0 {
                    i16::MAX as i32
                } else {
                    i16::MIN as i32
                }
            }
        }
    }

    fn mixed_sample(&mut self, master_volume: u8) -> i32 {
        if !self.enabled {
            return 0;
        }
        self.advance();
        let raw = self.raw_sample();
        (raw * self.volume as i32 * master_volume as i32) >> 16
    }
}

/// Not assigned a register offset in the external I/O map (spec §4.5
/// describes it only as "present for completeness"); exposed here at
/// 0x22..0x25, directly after the channel/master-volume/completion
/// registers, so a host can still drive it through the same I/O window.
#[derive(Default)]
pub struct TimerUnit {
    pub enabled: bool,
    pub irq_enable: bool,
    pub reload: u16,
    counter: u16,
}

impl TimerUnit {
    fn tick(&mut self, sink: &mut impl InterruptSink) {
        if !self.enabled {
            return;
        }
        if self.counter == 0 {
            self.counter = self.reload;
        }
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 && self.irq_enable {
            sink.raise(crate::cpu::PendingInterrupt::Timer);
        }
    }
}

pub struct Apu {
    pub channels: [Channel; 4],
    pub master_volume: u8,
    completion_status: u8,
    timer: TimerUnit,
    sample_acc: u64,
    output: Vec<i16>,
}

impl Apu {
    pub fn new() -> Self {
        Self {
            channels: [Channel::new(), Channel::new(), Channel::new(), Channel::new()],
            master_volume: 0xFF,
            completion_status: 0,
            timer: TimerUnit::default(),
            sample_acc: 0,
            output: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advances `cycles` worth of the CPU clock, emitting however many
    /// 44.1 kHz samples the fractional accumulator has earned. Carrying
    /// the remainder forward is what keeps the long-run sample count
    /// exact (spec §8 property 2).
    pub fn step(&mut self, cycles: u32) {
        self.sample_acc += SAMPLE_RATE as u64 * cycles as u64;
        while self.sample_acc >= CPU_CLOCK_RATE {
            self.sample_acc -= CPU_CLOCK_RATE;
            self.emit_sample();
        }
    }

    fn emit_sample(&mut self) {
        let master_volume = self.master_volume;
        let mut sum: i32 = 0;
        for channel in &mut self.channels {
            sum += channel.mixed_sample(master_volume);
        }
        self.output.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    /// Called once per frame boundary; decrements each running channel's
    /// duration and handles one-shot completion / loop reload, then ticks
    /// the optional timer subunit the same number of times a frame's
    /// worth of APU steps would (approximated here as one tick per frame,
    /// since the timer's own reload value sets its effective rate).
    pub fn tick_frame_boundary(&mut self, sink: &mut impl InterruptSink) {
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if !channel.enabled {
                continue;
            }
            if channel.duration > 0 {
                channel.duration -= 1;
            }
            if channel.duration == 0 {
                match channel.duration_mode {
                    DurationMode::OneShot => {
                        channel.enabled = false;
                        self.completion_status |= 1 << i;
                    }
                    DurationMode::Loop => channel.duration = channel.initial_duration,
                }
            }
        }
        self.timer.tick(sink);
    }

    /// Drains this frame's captured samples; the caller owns them after this.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.output)
    }

    pub fn read_io(&mut self, offset: u16) -> u8 {
        if offset < 0x20 {
            let channel = &self.channels[(offset / 8) as usize];
            return match offset % 8 {
                0 => (channel.freq & 0xFF) as u8,
                1 => (channel.freq >> 8) as u8,
                2 => channel.volume,
                3 => {
                    let mut b = channel.enabled as u8;
                    b |= match channel.waveform {
                        Waveform::Sine => 0,
                        Waveform::Square => 1,
                        Waveform::Saw => 2,
                        Waveform::Noise => 3,
                    } << 1;
                    b
                }
                4 => (channel.duration & 0xFF) as u8,
                5 => (channel.duration >> 8) as u8,
                6 => (channel.duration_mode == DurationMode::Loop) as u8,
                _ => 0,
            };
        }
        match offset {
            0x20 => self.master_volume,
            0x21 => {
                let v = self.completion_status & 0xF;
                self.completion_status = 0;
                v
            }
            0x22 => (self.timer.enabled as u8) | ((self.timer.irq_enable as u8) << 1),
            0x24 => (self.timer.reload & 0xFF) as u8,
            0x25 => (self.timer.reload >> 8) as u8,
            _ => 0,
        }
    }

    pub fn write_io(&mut self, offset: u16, value: u8) {
        if offset < 0x20 {
            let channel = &mut self.channels[(offset / 8) as usize];
            match offset % 8 {
                0 => channel.freq = (channel.freq & 0xFF00) | value as u16,
                1 => {
                    let new_freq = (channel.freq & 0x00FF) | ((value as u16) << 8);
                    if new_freq != channel.freq && new_freq != 0 {
                        channel.phase = 0;
                    }
                    channel.freq = new_freq;
                }
                2 => channel.volume = value,
                3 => {
                    channel.enabled = value & 0x01 != 0;
                    channel.waveform = Waveform::from_bits(value >> 1);
                }
                4 => channel.duration = (channel.duration & 0xFF00) | value as u16,
                5 => channel.duration = (channel.duration & 0x00FF) | ((value as u16) << 8),
                6 => {
                    channel.duration_mode = if value & 1 != 0 { DurationMode::Loop } else { DurationMode::OneShot };
                    channel.initial_duration = channel.duration;
                }
                _ => {}
            }
            return;
        }
        match offset {
            0x20 => self.master_volume = value,
            0x22 => {
                self.timer.enabled = value & 0x01 != 0;
                self.timer.irq_enable = value & 0x02 != 0;
            }
            0x24 => self.timer.reload = (self.timer.reload & 0xFF00) | value as u16,
            0x25 => self.timer.reload = (self.timer.reload & 0x00FF) | ((value as u16) << 8),
            _ => {}
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
