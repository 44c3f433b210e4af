//! Machine Configuration
//!
//! JSON description of the disks and memory a machine starts with.
//!
//! ```json
//! {
//!   "ram_size": 16777216,
//!   "graphics": "Cga80",
//!   "floppy": [{ "unit": 0, "path": "dos.img", "sectors_per_track": 9 }],
//!   "ata": [{ "unit": 0, "path": "hd.img" }, { "unit": 1, "path": "cd.iso" }]
//! }
//! ```
//!
//! Every field is optional. Applying a configuration only opens images,
//! overrides floppy geometry and shows or hides fixed disks.

use crate::disk::DiskError;
use crate::machine::{GraphicsConfig, Machine};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration files larger than this are rejected unread.
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

pub const DEFAULT_RAM_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration too large: {size} bytes (max {MAX_CONFIG_SIZE})")]
    TooLarge { size: u64 },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Disk(#[from] DiskError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloppyConfig {
    pub unit: u8,
    pub path: PathBuf,
    #[serde(default)]
    pub sectors_per_track: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtaConfig {
    pub unit: u8,
    pub path: PathBuf,
    #[serde(default = "default_present")]
    pub present: bool,
}

fn default_present() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub ram_size: usize,
    pub graphics: GraphicsConfig,
    pub floppy: Vec<FloppyConfig>,
    pub ata: Vec<AtaConfig>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            graphics: GraphicsConfig::default(),
            floppy: Vec::new(),
            ata: Vec::new(),
        }
    }
}

impl MachineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file. Relative image paths are resolved
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let read_error = |source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(read_error)?;
        if let Ok(metadata) = file.metadata() {
            if metadata.len() > MAX_CONFIG_SIZE {
                return Err(ConfigError::TooLarge {
                    size: metadata.len(),
                });
            }
        }

        // Metadata can lie (pipes, procfs)
        let mut buffer = String::new();
        file.take(MAX_CONFIG_SIZE + 1)
            .read_to_string(&mut buffer)
            .map_err(read_error)?;
        if buffer.len() as u64 > MAX_CONFIG_SIZE {
            return Err(ConfigError::TooLarge {
                size: buffer.len() as u64,
            });
        }

        let mut config = Self::from_json(&buffer)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let paths = self
            .floppy
            .iter_mut()
            .map(|f| &mut f.path)
            .chain(self.ata.iter_mut().map(|a| &mut a.path));
        for path in paths {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    /// Open every configured image on `machine`.
    pub fn apply(&self, machine: &mut Machine) -> Result<(), ConfigError> {
        machine.set_graphics_config(self.graphics);

        for floppy in &self.floppy {
            let fdc = machine.floppy_mut()?;
            let drive = fdc.open_disk(floppy.unit, &floppy.path)?;
            info!(
                "Floppy {}: {} ({} sectors)",
                floppy.unit,
                floppy.path.display(),
                drive.num_sectors
            );
            if let Some(spt) = floppy.sectors_per_track {
                fdc.override_sectors_per_track(floppy.unit, spt)?;
            }
        }

        for ata in &self.ata {
            let controller = machine.ata_mut()?;
            let drive = controller.open_disk(ata.unit, &ata.path)?;
            info!(
                "ATA {}: {} ({} sectors{})",
                ata.unit,
                ata.path.display(),
                drive.num_sectors,
                if drive.is_cd { ", ATAPI" } else { "" }
            );
            controller.set_fixed_disk_present(ata.unit, ata.present)?;
        }
        Ok(())
    }

    /// Build a machine and apply this configuration to it.
    pub fn build(&self) -> Result<Machine, ConfigError> {
        let mut machine = Machine::new(self.ram_size)?;
        self.apply(&mut machine)?;
        Ok(machine)
    }
}
