//! A decimal teaching machine with base and limit protection, interrupts and
//! a DMA disk.

pub mod constants;
pub mod loader;
pub mod process;
pub mod runtime;

pub use self::loader::{inspect, load};
pub use self::runtime::{Computer, Machine, MachineConfig};
