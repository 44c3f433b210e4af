// src/memory/mod.rs

pub mod address_space;
pub mod byte_utils;

pub use address_space::{AddressSpace, DirtyBitmap, MemoryRequestHook};

/// The bus is 24 bits wide (AT-class), so 16MB of address space.
pub const MAX_ADDRESS: usize = 1 << 24;

/// Mapping, protection and dirty tracking all work on 16KB blocks.
pub const BLOCK_SIZE: usize = 16 * 1024;

pub const NUM_BLOCKS: usize = MAX_ADDRESS / BLOCK_SIZE;

/// Value read from an address with nothing behind it.
///
/// Matches a floating ISA data bus, which reads back all ones.
pub const OPEN_BUS: u8 = 0xFF;
