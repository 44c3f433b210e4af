//! PC Physical Address Space
//!
//! This module implements the block-granular memory map that sits behind
//! the CPU. Every 16KB block of the 16MB space is described by one entry in
//! an arena of block descriptors.
//!
//! ## Typical PC Memory Map
//!
//! | Address Range      | Size    | Description                    |
//! |:-------------------|:--------|:-------------------------------|
//! | 0x000000-0x09FFFF  | 640 KB  | Conventional RAM               |
//! | 0x0A0000-0x0BFFFF  | 128 KB  | VGA aperture (not block backed)|
//! | 0x0C0000-0x0DFFFF  | 128 KB  | Option ROMs                    |
//! | 0x0E0000-0x0FFFFF  | 128 KB  | System BIOS (read-only)        |
//! | 0x100000-0xFFFFFF  | 15 MB   | Extended RAM                   |
//!
//! Reads from unbacked addresses return [`OPEN_BUS`]; writes to unbacked or
//! read-only addresses are dropped.

use super::{BLOCK_SIZE, MAX_ADDRESS, NUM_BLOCKS, OPEN_BUS};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;

/// Demand-fill callback, invoked with a block index when an access hits a
/// block with no backing. Returning `None` leaves the block unmapped.
pub type MemoryRequestHook = Box<dyn FnMut(usize) -> Option<Box<[u8]>>>;

/// How a block's bytes are held.
enum Backing {
    Unmapped,
    /// Exclusively owned, writable.
    Owned(Box<[u8]>),
    /// Shared read-only image. `offset` is the index in the image of the
    /// first mapped byte in this block.
    ReadOnly { image: Arc<[u8]>, offset: usize },
}

/// One entry of the block arena.
struct Block {
    backing: Backing,
    /// First mapped byte within the block.
    start: usize,
    /// Number of mapped bytes from `start`.
    len: usize,
}

impl Block {
    const fn unmapped() -> Self {
        Self {
            backing: Backing::Unmapped,
            start: 0,
            len: 0,
        }
    }

    #[inline]
    fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.start + self.len
    }
}

/// One bit per block; set by writes, cleared only by the consumer.
#[derive(Clone, PartialEq, Eq)]
pub struct DirtyBitmap {
    words: [u32; NUM_BLOCKS / 32],
}

impl DirtyBitmap {
    fn new() -> Self {
        Self {
            words: [0; NUM_BLOCKS / 32],
        }
    }

    #[inline]
    pub fn is_set(&self, block: usize) -> bool {
        block < NUM_BLOCKS && self.words[block / 32] & (1 << (block % 32)) != 0
    }

    #[inline]
    fn set(&mut self, block: usize) {
        self.words[block / 32] |= 1 << (block % 32);
    }

    #[inline]
    fn clear(&mut self, block: usize) {
        self.words[block / 32] &= !(1 << (block % 32));
    }

    /// Raw words, bit `n % 32` of word `n / 32` covering block `n`.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Iterate the indices of dirty blocks in ascending order.
    pub fn dirty_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NUM_BLOCKS).filter(move |&b| self.is_set(b))
    }
}

impl fmt::Debug for DirtyBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.dirty_blocks()).finish()
    }
}

/// The 16MB physical address space.
pub struct AddressSpace {
    blocks: Vec<Block>,
    dirty: DirtyBitmap,
    request_hook: Option<MemoryRequestHook>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// Create an empty address space (everything reads as open bus)
    pub fn new() -> Self {
        Self {
            blocks: (0..NUM_BLOCKS).map(|_| Block::unmapped()).collect(),
            dirty: DirtyBitmap::new(),
            request_hook: None,
        }
    }

    /// Map writable RAM at `base`, taking ownership of `data`.
    ///
    /// Any part of the range that falls outside the address space is
    /// dropped. The range replaces whatever was mapped in the affected
    /// blocks; partial blocks keep only the new range mapped.
    pub fn add_memory(&mut self, base: u32, data: Vec<u8>) {
        let base = base as usize;
        let len = data.len().min(MAX_ADDRESS.saturating_sub(base));
        debug!("Mapping RAM {:06X}-{:06X}", base, base + len);

        let mut pos = 0;
        while pos < len {
            let addr = base + pos;
            let block = addr / BLOCK_SIZE;
            let start = addr % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - start).min(len - pos);

            let mut buf = vec![0u8; BLOCK_SIZE].into_boxed_slice();
            buf[start..start + chunk].copy_from_slice(&data[pos..pos + chunk]);

            self.blocks[block] = Block {
                backing: Backing::Owned(buf),
                start,
                len: chunk,
            };
            pos += chunk;
        }
    }

    /// Map a shared read-only image at `base`.
    pub fn add_read_only_memory(&mut self, base: u32, image: Arc<[u8]>) {
        let base = base as usize;
        let len = image.len().min(MAX_ADDRESS.saturating_sub(base));
        debug!("Mapping ROM {:06X}-{:06X}", base, base + len);

        let mut pos = 0;
        while pos < len {
            let addr = base + pos;
            let block = addr / BLOCK_SIZE;
            let start = addr % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - start).min(len - pos);

            self.blocks[block] = Block {
                backing: Backing::ReadOnly {
                    image: Arc::clone(&image),
                    offset: pos,
                },
                start,
                len: chunk,
            };
            pos += chunk;
        }
    }

    /// Unmap a block. Its contents are released and its dirty bit is left
    /// for the consumer to clear.
    pub fn remove_memory(&mut self, block: usize) {
        if let Some(b) = self.blocks.get_mut(block) {
            *b = Block::unmapped();
        }
    }

    pub fn set_memory_request_hook(&mut self, hook: Option<MemoryRequestHook>) {
        self.request_hook = hook;
    }

    pub fn has_memory_request_hook(&self) -> bool {
        self.request_hook.is_some()
    }

    /// Is the block backed by anything?
    pub fn is_block_mapped(&self, block: usize) -> bool {
        self.blocks
            .get(block)
            .is_some_and(|b| !matches!(b.backing, Backing::Unmapped))
    }

    pub fn is_block_read_only(&self, block: usize) -> bool {
        self.blocks
            .get(block)
            .is_some_and(|b| matches!(b.backing, Backing::ReadOnly { .. }))
    }

    /// Ask the hook to back an unmapped block.
    fn request_block(&mut self, block: usize) -> bool {
        let Some(hook) = self.request_hook.as_mut() else {
            return false;
        };

        match hook(block) {
            Some(buf) if buf.len() == BLOCK_SIZE => {
                trace!("Memory request filled block {}", block);
                self.blocks[block] = Block {
                    backing: Backing::Owned(buf),
                    start: 0,
                    len: BLOCK_SIZE,
                };
                true
            }
            Some(buf) => {
                warn!(
                    "Memory request for block {} returned {} bytes, expected {}",
                    block,
                    buf.len(),
                    BLOCK_SIZE
                );
                false
            }
            None => false,
        }
    }

    /// Read a byte from the address space
    pub fn read_byte(&mut self, address: u32) -> u8 {
        let addr = address as usize & (MAX_ADDRESS - 1);
        let block = addr / BLOCK_SIZE;

        if matches!(self.blocks[block].backing, Backing::Unmapped) && !self.request_block(block) {
            return OPEN_BUS;
        }

        self.peek_byte(address)
    }

    /// Read a byte without triggering the memory request hook.
    pub fn peek_byte(&self, address: u32) -> u8 {
        let addr = address as usize & (MAX_ADDRESS - 1);
        let b = &self.blocks[addr / BLOCK_SIZE];
        let offset = addr % BLOCK_SIZE;

        if !b.contains(offset) {
            return OPEN_BUS;
        }

        match &b.backing {
            Backing::Unmapped => OPEN_BUS,
            Backing::Owned(buf) => buf[offset],
            Backing::ReadOnly { image, offset: base } => image[base + offset - b.start],
        }
    }

    /// Write a byte to the address space
    pub fn write_byte(&mut self, address: u32, value: u8) {
        let addr = address as usize & (MAX_ADDRESS - 1);
        let block = addr / BLOCK_SIZE;

        if matches!(self.blocks[block].backing, Backing::Unmapped) && !self.request_block(block) {
            return;
        }

        let b = &mut self.blocks[block];
        let offset = addr % BLOCK_SIZE;
        if !b.contains(offset) {
            return;
        }

        if let Backing::Owned(buf) = &mut b.backing {
            buf[offset] = value;
            self.dirty.set(block);
        }
    }

    /// Direct view of block-backed memory from `address` to the end of its
    /// mapped range, if any.
    pub fn map_address(&self, address: u32) -> Option<&[u8]> {
        let addr = address as usize;
        if addr >= MAX_ADDRESS {
            return None;
        }
        let b = &self.blocks[addr / BLOCK_SIZE];
        let offset = addr % BLOCK_SIZE;
        if !b.contains(offset) {
            return None;
        }
        let end = b.start + b.len;

        match &b.backing {
            Backing::Unmapped => None,
            Backing::Owned(buf) => Some(&buf[offset..end]),
            Backing::ReadOnly { image, offset: base } => {
                Some(&image[base + offset - b.start..base + end - b.start])
            }
        }
    }

    pub fn dirty_bitmap(&self) -> &DirtyBitmap {
        &self.dirty
    }

    pub fn is_block_dirty(&self, block: usize) -> bool {
        self.dirty.is_set(block)
    }

    pub fn mark_block_dirty(&mut self, block: usize) {
        if block < NUM_BLOCKS {
            self.dirty.set(block);
        }
    }

    pub fn clear_block_dirty(&mut self, block: usize) {
        if block < NUM_BLOCKS {
            self.dirty.clear(block);
        }
    }
}
