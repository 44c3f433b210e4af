//! Picopc - PC chipset core for small hosts
//!
//! This library provides the bus, interrupt routing, disk controllers and
//! VGA adapter of an IBM PC compatible. The instruction engine plugs in
//! through [`machine::Cpu`].

pub mod memory;
pub mod io;
pub mod interrupts;
pub mod disk;
pub mod ata;
pub mod floppy;
pub mod vga;
pub mod game_port;
pub mod qemu_config;
pub mod machine;
pub mod config;
pub mod debugger;

pub use config::{ConfigError, MachineConfig};
pub use disk::DiskError;
pub use machine::{Cpu, GraphicsConfig, Machine, SystemBus};
pub use memory::AddressSpace;
