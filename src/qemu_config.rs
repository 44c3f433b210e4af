//! QEMU Firmware Configuration (fw_cfg) subset
//!
//! Just enough of the legacy port interface for SeaBIOS to find and load a
//! VGA option ROM.
//!
//! | Port  | Access | Function             |
//! |:------|:-------|:---------------------|
//! | 0x510 | write  | Item selector (16-bit) |
//! | 0x511 | read   | Item data, one byte per read |
//!
//! | Key    | Item                                  |
//! |:-------|:--------------------------------------|
//! | 0x0000 | Signature `"QEMU"`                    |
//! | 0x0001 | Interface ID                          |
//! | 0x0019 | File directory (big endian)           |
//! | 0x0020 | `vgaroms/vgabios.bin`, if set         |

use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice, NO_DEVICE};
use log::debug;
use std::any::Any;
use std::sync::Arc;

pub const FW_CFG_PORT: u16 = 0x510;

pub const KEY_SIGNATURE: u16 = 0x0000;
pub const KEY_ID: u16 = 0x0001;
pub const KEY_FILE_DIR: u16 = 0x0019;
pub const KEY_VGA_BIOS: u16 = 0x0020;

pub const VGA_BIOS_NAME: &str = "vgaroms/vgabios.bin";
const FILE_NAME_LEN: usize = 56;

/// Traditional (port) interface only, no DMA.
const INTERFACE_ID: u32 = 1;

pub struct QemuConfig {
    selected: Arc<[u8]>,
    offset: usize,
    vga_bios: Option<Arc<[u8]>>,
}

fn empty() -> Arc<[u8]> {
    Arc::from(Vec::new())
}

impl Default for QemuConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl QemuConfig {
    pub fn new() -> Self {
        Self {
            selected: empty(),
            offset: 0,
            vga_bios: None,
        }
    }

    /// Register 0x510-0x511.
    pub fn attach_to(self, bus: &mut IoBus) -> DeviceId {
        bus.add_device(0xFFFE, FW_CFG_PORT, 0, Box::new(self))
    }

    pub fn set_vga_bios(&mut self, bios: Arc<[u8]>) {
        self.vga_bios = Some(bios);
    }

    fn file_directory(&self) -> Vec<u8> {
        let files: Vec<(u32, u16, &str)> = self
            .vga_bios
            .iter()
            .map(|bios| (bios.len() as u32, KEY_VGA_BIOS, VGA_BIOS_NAME))
            .collect();

        let mut dir = Vec::with_capacity(4 + files.len() * 64);
        dir.extend_from_slice(&(files.len() as u32).to_be_bytes());
        for (size, select, name) in files {
            dir.extend_from_slice(&size.to_be_bytes());
            dir.extend_from_slice(&select.to_be_bytes());
            dir.extend_from_slice(&0u16.to_be_bytes());
            let mut field = [0u8; FILE_NAME_LEN];
            let len = name.len().min(FILE_NAME_LEN - 1);
            field[..len].copy_from_slice(&name.as_bytes()[..len]);
            dir.extend_from_slice(&field);
        }
        dir
    }

    /// Select an item; the data port then reads it from the start.
    pub fn select(&mut self, key: u16) {
        self.offset = 0;
        self.selected = match key {
            KEY_SIGNATURE => Arc::from(&b"QEMU"[..]),
            KEY_ID => Arc::from(&INTERFACE_ID.to_le_bytes()[..]),
            KEY_FILE_DIR => Arc::from(self.file_directory()),
            KEY_VGA_BIOS => self.vga_bios.clone().unwrap_or_else(empty),
            _ => {
                debug!("fw_cfg: unknown item {:04X}", key);
                empty()
            }
        };
    }
}

impl IoDevice for QemuConfig {
    fn read(&mut self, port: u16, _ctx: &mut DeviceContext) -> u8 {
        if port != FW_CFG_PORT + 1 {
            return NO_DEVICE;
        }
        match self.selected.get(self.offset) {
            Some(&value) => {
                self.offset += 1;
                value
            }
            None => 0,
        }
    }

    fn write(&mut self, port: u16, data: u8, _ctx: &mut DeviceContext) {
        if port == FW_CFG_PORT {
            self.select(data as u16);
        }
    }

    fn write16(&mut self, port: u16, data: u16, ctx: &mut DeviceContext) {
        if port == FW_CFG_PORT {
            self.select(data);
        } else {
            self.write(port, data as u8, ctx);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
