use super::SECTOR_SIZE;
use serde::{Deserialize, Serialize};

/// Floppy drive geometry, used to turn cylinder/head/sector into an LBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloppyGeometry {
    pub cylinders: u8,
    pub heads: u8,
    pub sectors_per_track: u8,
}

// (image size in KiB, cylinders, heads, sectors per track)
const KNOWN_FORMATS: &[(u64, u8, u8, u8)] = &[
    (160, 40, 1, 8),
    (180, 40, 1, 9),
    (320, 40, 2, 8),
    (360, 40, 2, 9),
    (720, 80, 2, 9),
    (1200, 80, 2, 15),
    (1440, 80, 2, 18),
    (1680, 80, 2, 21),
    (2880, 80, 2, 36),
];

impl Default for FloppyGeometry {
    /// 3.5" 1.44M
    fn default() -> Self {
        Self {
            cylinders: 80,
            heads: 2,
            sectors_per_track: 18,
        }
    }
}

impl FloppyGeometry {
    /// Guess the geometry of a raw image from its size in bytes.
    ///
    /// Unknown sizes fall back to 1.44M with the cylinder count stretched to
    /// cover the image.
    pub fn guess(image_size: u64) -> Self {
        let kib = image_size / 1024;
        if let Some(&(_, cylinders, heads, sectors_per_track)) =
            KNOWN_FORMATS.iter().find(|f| f.0 == kib)
        {
            return Self {
                cylinders,
                heads,
                sectors_per_track,
            };
        }

        let mut geometry = Self::default();
        let track_bytes =
            geometry.heads as u64 * geometry.sectors_per_track as u64 * SECTOR_SIZE as u64;
        let cylinders = image_size.div_ceil(track_bytes).clamp(1, 255);
        geometry.cylinders = cylinders as u8;
        geometry
    }

    pub fn double_sided(&self) -> bool {
        self.heads > 1
    }

    /// Replace sectors per track, keeping the same total image size where
    /// possible.
    pub fn with_sectors_per_track(self, image_size: u64, sectors_per_track: u8) -> Self {
        let sectors_per_track = sectors_per_track.max(1);
        let track_bytes = self.heads as u64 * sectors_per_track as u64 * SECTOR_SIZE as u64;
        let cylinders = image_size.div_ceil(track_bytes).clamp(1, 255);
        Self {
            cylinders: cylinders as u8,
            heads: self.heads,
            sectors_per_track,
        }
    }

    /// LBA of a 1-based sector number, or `None` if it lies outside the
    /// geometry.
    pub fn lba(&self, cylinder: u8, head: u8, sector: u8) -> Option<u32> {
        if sector == 0 || sector > self.sectors_per_track || head >= self.heads {
            return None;
        }
        let track = cylinder as u32 * self.heads as u32 + head as u32;
        Some(track * self.sectors_per_track as u32 + sector as u32 - 1)
    }
}
