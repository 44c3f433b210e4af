//! Disk images and the storage I/O bridge
//!
//! Storage access blocks for an unpredictable amount of time, so the disk
//! controllers never touch image files directly. They hand a
//! [`DiskAccessRequest`] to a [`DiskIoBridge`], which performs the operation
//! on a worker thread and reports a [`DiskCompletion`] the controller picks
//! up on a later poll.
//!
//! ## Sector sizes
//!
//! | Image            | Sector size |
//! |:-----------------|:------------|
//! | Floppy           | 512         |
//! | ATA hard disk    | 512         |
//! | ATAPI (`.iso`)   | 2048        |

pub mod bridge;
pub mod geometry;
pub mod image;

pub use bridge::DiskIoBridge;
pub use geometry::FloppyGeometry;
pub use self::image::{DiskImage, DiskSet, DriveInfo};

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Sector size of floppy and ATA images.
pub const SECTOR_SIZE: usize = 512;
/// Sector size of ATAPI (CD) images.
pub const CD_SECTOR_SIZE: usize = 2048;
/// Drives per controller.
pub const MAX_DRIVES: usize = 2;

/// Which controller a bridge serves. Each has its own single-slot channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskChannel {
    Floppy,
    Ata,
}

impl fmt::Display for DiskChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskChannel::Floppy => write!(f, "floppy"),
            DiskChannel::Ata => write!(f, "ata"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One sector transfer. The buffer travels with the request to the worker
/// and comes back in the matching [`DiskCompletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskAccessRequest {
    pub unit: u8,
    pub lba: u32,
    pub direction: Direction,
    pub buffer: Vec<u8>,
}

impl DiskAccessRequest {
    /// Read into a fresh zeroed buffer of `sector_size` bytes.
    pub fn read(unit: u8, lba: u32, sector_size: usize) -> Self {
        Self {
            unit,
            lba,
            direction: Direction::Read,
            buffer: vec![0; sector_size],
        }
    }

    pub fn write(unit: u8, lba: u32, buffer: Vec<u8>) -> Self {
        Self {
            unit,
            lba,
            direction: Direction::Write,
            buffer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCompletion {
    pub unit: u8,
    pub lba: u32,
    pub direction: Direction,
    pub buffer: Vec<u8>,
    pub success: bool,
}

impl DiskCompletion {
    pub fn was_write(&self) -> bool {
        self.direction == Direction::Write
    }
}

/// Sector-addressed storage the bridge worker operates on.
pub trait BlockStore: Send + 'static {
    fn read(&mut self, unit: u8, lba: u32, buf: &mut [u8]) -> io::Result<()>;
    fn write(&mut self, unit: u8, lba: u32, buf: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("disk image I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to open disk image {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("disk image {} is empty", .path.display())]
    EmptyImage { path: PathBuf },

    #[error("invalid drive unit {unit}")]
    InvalidUnit { unit: u8 },

    #[error("{channel} disk channel busy")]
    ChannelBusy {
        channel: DiskChannel,
        request: Box<DiskAccessRequest>,
    },

    #[error("failed to start {channel} disk worker: {source}")]
    WorkerSpawn {
        channel: DiskChannel,
        #[source]
        source: io::Error,
    },

    #[error("{channel} disk worker has stopped")]
    WorkerGone { channel: DiskChannel },

    #[error("no {channel} controller on the bus")]
    NoController { channel: DiskChannel },
}

impl DiskError {
    /// Hand back the request rejected by a busy channel, for a later retry.
    pub fn into_request(self) -> Option<DiskAccessRequest> {
        match self {
            DiskError::ChannelBusy { request, .. } => Some(*request),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests_bridge;

#[cfg(test)]
mod tests_image;
