//! Error taxonomy for cartridge loading and CPU execution.
//!
//! Hand-rolled enums with manual `Display`/`Error` impls, matching the style
//! of `RomLoadError` elsewhere in this lineage of cores: no `thiserror`, no
//! `anyhow`, just a `match` in `fmt` and a blanket `impl std::error::Error`.

use std::fmt;

/// Raised while parsing a ROM image in [`crate::cartridge::Cartridge::load`].
///
/// A `LoadError` aborts the load; any cartridge previously loaded into a
/// [`crate::system::System`] is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The first four header bytes were not `b"RMCF"`.
    BadMagic,
    /// The header's version field is not the one version this core understands.
    UnsupportedVersion { found: u16 },
    /// The decoded entry point is not reachable: bank 0, or an offset below
    /// the ROM window (`0x8000`).
    InvalidEntry { bank: u8, offset: u16 },
    /// The file is too short to contain a full header, or shorter than the
    /// header's declared ROM size.
    ShortFile { expected: usize, actual: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "cartridge header magic is not \"RMCF\""),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported cartridge header version: {found}")
            }
            Self::InvalidEntry { bank, offset } => write!(
                f,
                "invalid cartridge entry point: bank {bank:02X} offset {offset:04X}"
            ),
            Self::ShortFile { expected, actual } => write!(
                f,
                "cartridge file too short: expected at least {expected} bytes, found {actual}"
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Raised by [`crate::system::System::run_frame`] when the CPU hits an
/// architecturally invalid state. Execution stops at the faulting
/// instruction; everything committed by prior instructions stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    /// The CPU would have fetched from an address that can never hold code:
    /// bank 0 at or above the I/O carve-out, or a cartridge bank with an
    /// offset below the ROM window.
    InvalidPc { bank: u8, offset: u16 },
    /// A reserved `MOV` submode (6..15) was decoded while strict mode is
    /// enabled (see [`crate::cpu::Cpu::set_strict`]).
    ReservedOpcode { mode: u8 },
    /// A `RET`/interrupt-return popped past the bottom of a call frame.
    StackUnderflow,
    /// An interrupt vector pointed at bank 0 or below the ROM window.
    BadInterruptVector { bank: u8, offset: u16 },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPc { bank, offset } => {
                write!(f, "invalid fetch address: bank {bank:02X} offset {offset:04X}")
            }
            Self::ReservedOpcode { mode } => write!(f, "reserved MOV submode {mode} taken as opcode under strict mode"),
            Self::StackUnderflow => write!(f, "stack underflow on RET/interrupt return"),
            Self::BadInterruptVector { bank, offset } => write!(
                f,
                "invalid interrupt vector: bank {bank:02X} offset {offset:04X}"
            ),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Programmer errors: calling the core out of the order it documents.
/// Real hosts should never trigger these; they exist so misuse fails loudly
/// in development instead of corrupting state silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `reset` was called while a `run_frame` call was in flight (never
    /// happens through the public API, reserved for host misuse via
    /// re-entrant calls).
    ResetMidFrame,
    /// The framebuffer was read before `frame_complete()` returned `true`.
    FramebufferNotReady,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResetMidFrame => write!(f, "reset() called mid-frame"),
            Self::FramebufferNotReady => write!(f, "framebuffer read before frame_complete()"),
        }
    }
}

impl std::error::Error for StateError {}
