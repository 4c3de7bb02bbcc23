pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod error;
pub mod input;
pub mod ppu;
pub mod system;

pub mod prelude {
    pub use crate::bus::MemoryBus;
    pub use crate::cartridge::Cartridge;
    pub use crate::cpu::Cpu;
    pub use crate::error::{ExecutionError, LoadError, StateError};
    pub use crate::system::System;
}
