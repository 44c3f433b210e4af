//! VGA Card
//!
//! Register banks behind their index/data port pairs, 256 KiB of planar
//! memory seen through the 0xA0000-0xBFFFF aperture, and a scanline renderer
//! for text, 16-colour planar and chain-4 256-colour modes.
//!
//! ## Memory Organization
//!
//! | Addressing | Selected by                  | Plane        | Plane offset  |
//! |:-----------|:-----------------------------|:-------------|:--------------|
//! | Chain-4    | sequencer memory mode bit 3  | `addr & 3`   | `addr >> 2`   |
//! | Odd/even   | sequencer memory mode bit 2 clear | `addr & 1` (+2 via read map) | `addr >> 1` |
//! | Planar     | otherwise                    | map mask / read map | `addr`  |
//!
//! Only planar accesses go through the latch and the write pipeline.

pub mod constants;
pub mod pipeline;
pub mod render;

use crate::debugger::Debuggable;
use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice, NO_DEVICE};
use crate::machine::SYSTEM_CLOCK;
use crate::memory::OPEN_BUS;
use constants::*;
use log::{trace, warn};
use pipeline::WriteRegisters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

const FRAME_TICKS: u64 = SYSTEM_CLOCK as u64 / 60;
const LINE_TICKS: u64 = FRAME_TICKS / 525;
const VISIBLE_LINES: u64 = 480;

/// All host-visible register state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VgaRegisters {
    pub misc_output: u8,

    pub crtc_index: u8,
    pub crtc: [u8; NUM_CRTC_REGS],

    pub seq_index: u8,
    pub seq: [u8; NUM_SEQ_REGS],

    pub gc_index: u8,
    pub gc: [u8; NUM_GC_REGS],

    pub attr_index: u8,
    /// Next 0x3C0 write goes to the data register
    pub attr_is_data: bool,
    pub palette: [u8; NUM_PALETTE],
    pub attr_mode: u8,
    pub attr_plane_enable: u8,

    pub pel_mask: u8,
    /// Component cursors into `dac` (index * 3 + component)
    pub dac_read: usize,
    pub dac_write: usize,
    pub dac_reading: bool,
    pub dac: Vec<u8>,
}

impl Default for VgaRegisters {
    fn default() -> Self {
        let mut seq = [0; NUM_SEQ_REGS];
        seq[SEQ_MAP_MASK] = 0x0F;
        let mut gc = [0; NUM_GC_REGS];
        gc[GC_BIT_MASK] = 0xFF;

        Self {
            misc_output: MISC_COLOUR,
            crtc_index: 0,
            crtc: [0; NUM_CRTC_REGS],
            seq_index: 0,
            seq,
            gc_index: 0,
            gc,
            attr_index: 0,
            attr_is_data: false,
            palette: [0; NUM_PALETTE],
            attr_mode: 0,
            attr_plane_enable: 0x0F,
            pel_mask: 0xFF,
            dac_read: 0,
            dac_write: 0,
            dac_reading: false,
            dac: vec![0; DAC_SIZE],
        }
    }
}

impl VgaRegisters {
    pub fn colour(&self) -> bool {
        self.misc_output & MISC_COLOUR != 0
    }

    pub fn write_registers(&self) -> WriteRegisters {
        WriteRegisters {
            set_reset: self.gc[GC_SET_RESET],
            enable_set_reset: self.gc[GC_ENABLE_SET_RESET],
            data_rotate: self.gc[GC_DATA_ROTATE],
            mode: self.gc[GC_MODE],
            bit_mask: self.gc[GC_BIT_MASK],
            map_mask: self.seq[SEQ_MAP_MASK],
        }
    }

    pub fn start_address(&self) -> usize {
        (self.crtc[CRTC_START_HIGH] as usize) << 8 | self.crtc[CRTC_START_LOW] as usize
    }

    pub fn cursor_address(&self) -> usize {
        (self.crtc[CRTC_CURSOR_HIGH] as usize) << 8 | self.crtc[CRTC_CURSOR_LOW] as usize
    }

    pub fn graphics_mode(&self) -> bool {
        self.gc[GC_MISC] & GC_MISC_GRAPHICS != 0
    }
}

pub struct VgaCard {
    regs: VgaRegisters,
    /// Plane-major: plane `p` occupies `p * PLANE_SIZE..(p + 1) * PLANE_SIZE`
    vram: Vec<u8>,
    latch: [u8; 4],
}

impl Default for VgaCard {
    fn default() -> Self {
        Self::new()
    }
}

impl VgaCard {
    pub fn new() -> Self {
        Self {
            regs: VgaRegisters::default(),
            vram: vec![0; VRAM_SIZE],
            latch: [0; 4],
        }
    }

    /// Register 0x3C0-0x3CF and both CRTC/status blocks (0x3B0 and 0x3D0).
    pub fn attach_to(self, bus: &mut IoBus) -> DeviceId {
        let id = bus.add_device(0x3F0, 0x3C0, 0, Box::new(self));
        bus.add_region(id, 0x3F0, 0x3B0, 0);
        bus.add_region(id, 0x3F0, 0x3D0, 0);
        id
    }

    pub fn reset(&mut self) {
        self.regs = VgaRegisters::default();
        self.latch = [0; 4];
    }

    pub fn registers(&self) -> &VgaRegisters {
        &self.regs
    }

    pub fn latch(&self) -> [u8; 4] {
        self.latch
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        let start = (plane & 3) * PLANE_SIZE;
        &self.vram[start..start + PLANE_SIZE]
    }

    /// Store directly into a plane, bypassing the pipeline.
    pub fn write_plane(&mut self, plane: usize, offset: usize, value: u8) {
        self.vram[Self::vram_index(plane, offset)] = value;
    }

    #[inline]
    fn vram_index(plane: usize, offset: usize) -> usize {
        (plane & 3) * PLANE_SIZE + offset % PLANE_SIZE
    }

    /// Offset of `addr` inside the aperture selected by the graphics misc
    /// memory map field.
    fn aperture_offset(&self, addr: u32) -> Option<usize> {
        let (base, size) = match (self.regs.gc[GC_MISC] >> 2) & 3 {
            0 => (0xA0000, 0x20000),
            1 => (0xA0000, 0x10000),
            2 => (0xB0000, 0x8000),
            _ => (0xB8000, 0x8000),
        };
        addr.checked_sub(base)
            .filter(|&offset| offset < size)
            .map(|offset| offset as usize)
    }

    fn load_latch(&mut self, offset: usize) {
        for plane in 0..4 {
            self.latch[plane] = self.vram[Self::vram_index(plane, offset)];
        }
    }

    /// CPU read from the memory aperture.
    pub fn read_mem(&mut self, addr: u32) -> u8 {
        let Some(offset) = self.aperture_offset(addr) else {
            return OPEN_BUS;
        };
        let mem_mode = self.regs.seq[SEQ_MEMORY_MODE];

        if mem_mode & MEM_CHAIN4 != 0 {
            self.load_latch(offset >> 2);
            return self.latch[offset & 3];
        }

        if mem_mode & MEM_ODD_EVEN_DISABLE == 0 {
            let plane = (self.regs.gc[GC_READ_MAP] & 2) as usize | (offset & 1);
            self.load_latch(offset >> 1);
            return self.latch[plane];
        }

        self.load_latch(offset);
        if self.regs.gc[GC_MODE] & GC_MODE_READ1 != 0 {
            pipeline::colour_compare(
                self.latch,
                self.regs.gc[GC_COLOUR_COMPARE],
                self.regs.gc[GC_COLOUR_DONT_CARE],
            )
        } else {
            self.latch[(self.regs.gc[GC_READ_MAP] & 3) as usize]
        }
    }

    /// CPU write to the memory aperture.
    pub fn write_mem(&mut self, addr: u32, data: u8) {
        let Some(offset) = self.aperture_offset(addr) else {
            return;
        };
        let mem_mode = self.regs.seq[SEQ_MEMORY_MODE];
        let map_mask = self.regs.seq[SEQ_MAP_MASK];

        if mem_mode & MEM_CHAIN4 != 0 {
            let plane = offset & 3;
            if map_mask & (1 << plane) != 0 {
                self.vram[Self::vram_index(plane, offset >> 2)] = data;
            }
            return;
        }

        if mem_mode & MEM_ODD_EVEN_DISABLE == 0 {
            let planes = if offset & 1 != 0 { 0b1010 } else { 0b0101 };
            for plane in 0..4 {
                if map_mask & planes & (1 << plane) != 0 {
                    self.vram[Self::vram_index(plane, offset >> 1)] = data;
                }
            }
            return;
        }

        let regs = self.regs.write_registers();
        // Write mode 1 copies the latch left by the last read
        if regs.write_mode() != 1 {
            self.load_latch(offset);
        }
        let result = pipeline::write(&regs, self.latch, data);
        for (plane, stored) in result.stored.iter().enumerate() {
            if let Some(value) = stored {
                self.vram[Self::vram_index(plane, offset)] = *value;
            }
        }
        self.latch = result.latch;
    }

    /// CRTC register offset within the active mono/colour block.
    fn crtc_port(&self, port: u16) -> Option<u16> {
        let base = if self.regs.colour() { 0x3D0 } else { 0x3B0 };
        (port & 0x3F0 == base).then_some(port & 0x0F)
    }

    fn input_status1(&mut self, cycle_count: u64) -> u8 {
        self.regs.attr_is_data = false;

        let frame_pos = cycle_count % FRAME_TICKS;
        let line = frame_pos / LINE_TICKS;
        if line >= VISIBLE_LINES {
            STATUS_VRETRACE | STATUS_DISPLAY_DISABLED
        } else if frame_pos % LINE_TICKS >= LINE_TICKS * 4 / 5 {
            STATUS_DISPLAY_DISABLED
        } else {
            0
        }
    }

    fn read_attribute(&self) -> u8 {
        match self.regs.attr_index & ATTR_INDEX_MASK {
            i if (i as usize) < NUM_PALETTE => self.regs.palette[i as usize],
            ATTR_MODE => self.regs.attr_mode,
            ATTR_PLANE_ENABLE => self.regs.attr_plane_enable,
            _ => 0,
        }
    }

    fn write_attribute(&mut self, data: u8) {
        if !self.regs.attr_is_data {
            self.regs.attr_index = data & 0x3F;
        } else {
            match self.regs.attr_index & ATTR_INDEX_MASK {
                i if (i as usize) < NUM_PALETTE => self.regs.palette[i as usize] = data & 0x3F,
                ATTR_MODE => self.regs.attr_mode = data,
                ATTR_PLANE_ENABLE => self.regs.attr_plane_enable = data & 0x0F,
                i => trace!("VGA attribute {:02X} = {:02X} ignored", i, data),
            }
        }
        self.regs.attr_is_data = !self.regs.attr_is_data;
    }

    fn write_crtc(&mut self, data: u8) {
        let index = self.regs.crtc_index as usize;
        if index >= NUM_CRTC_REGS {
            return;
        }
        if index < 8 && self.regs.crtc[CRTC_VRETRACE_END] & CRTC_PROTECT != 0 {
            trace!("VGA CRTC {:02X} write protected", index);
            return;
        }
        self.regs.crtc[index] = data;
    }

    fn read_dac(&mut self) -> u8 {
        let value = self.regs.dac[self.regs.dac_read % DAC_SIZE];
        self.regs.dac_read = (self.regs.dac_read + 1) % DAC_SIZE;
        value
    }

    fn write_dac(&mut self, data: u8) {
        self.regs.dac[self.regs.dac_write % DAC_SIZE] = data & 0x3F;
        self.regs.dac_write = (self.regs.dac_write + 1) % DAC_SIZE;
    }
}

impl IoDevice for VgaCard {
    fn read(&mut self, port: u16, ctx: &mut DeviceContext) -> u8 {
        if let Some(offset) = self.crtc_port(port) {
            return match offset {
                0x4 => self.regs.crtc_index,
                0x5 => self
                    .regs
                    .crtc
                    .get(self.regs.crtc_index as usize)
                    .copied()
                    .unwrap_or(0),
                0xA => self.input_status1(ctx.cycle_count),
                _ => NO_DEVICE,
            };
        }

        match port {
            PORT_ATTR_INDEX => self.regs.attr_index,
            PORT_ATTR_DATA_READ => self.read_attribute(),
            // Input status 0
            PORT_MISC_WRITE => 0,
            PORT_SEQ_INDEX => self.regs.seq_index,
            PORT_SEQ_DATA => self
                .regs
                .seq
                .get(self.regs.seq_index as usize)
                .copied()
                .unwrap_or(NO_DEVICE),
            PORT_PEL_MASK => self.regs.pel_mask,
            PORT_DAC_READ_INDEX => {
                if self.regs.dac_reading {
                    0x03
                } else {
                    0x00
                }
            }
            PORT_DAC_WRITE_INDEX => (self.regs.dac_write / 3) as u8,
            PORT_DAC_DATA => self.read_dac(),
            PORT_MISC_READ => self.regs.misc_output,
            PORT_GC_INDEX => self.regs.gc_index,
            PORT_GC_DATA => self
                .regs
                .gc
                .get(self.regs.gc_index as usize)
                .copied()
                .unwrap_or(NO_DEVICE),
            _ => {
                trace!("VGA read from unknown port {:04X}", port);
                NO_DEVICE
            }
        }
    }

    fn write(&mut self, port: u16, data: u8, _ctx: &mut DeviceContext) {
        if let Some(offset) = self.crtc_port(port) {
            match offset {
                0x4 => self.regs.crtc_index = data,
                0x5 => self.write_crtc(data),
                _ => trace!("VGA write {:04X} = {:02X} ignored", port, data),
            }
            return;
        }

        match port {
            PORT_ATTR_INDEX => self.write_attribute(data),
            PORT_MISC_WRITE => self.regs.misc_output = data,
            PORT_SEQ_INDEX => self.regs.seq_index = data,
            PORT_SEQ_DATA => {
                if let Some(reg) = self.regs.seq.get_mut(self.regs.seq_index as usize) {
                    *reg = data;
                }
            }
            PORT_PEL_MASK => self.regs.pel_mask = data,
            PORT_DAC_READ_INDEX => {
                self.regs.dac_read = data as usize * 3;
                self.regs.dac_reading = true;
            }
            PORT_DAC_WRITE_INDEX => {
                self.regs.dac_write = data as usize * 3;
                self.regs.dac_reading = false;
            }
            PORT_DAC_DATA => self.write_dac(data),
            PORT_GC_INDEX => self.regs.gc_index = data,
            PORT_GC_DATA => {
                if let Some(reg) = self.regs.gc.get_mut(self.regs.gc_index as usize) {
                    *reg = data;
                }
            }
            _ => trace!("VGA write {:04X} = {:02X} ignored", port, data),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Debuggable for VgaCard {
    fn read_state(&self) -> Value {
        serde_json::to_value(&self.regs).unwrap_or(Value::Null)
    }

    fn write_state(&mut self, state: &Value) {
        match serde_json::from_value::<VgaRegisters>(state.clone()) {
            Ok(mut regs) => {
                regs.dac.resize(DAC_SIZE, 0);
                self.regs = regs;
            }
            Err(e) => warn!("Error deserializing VGA state: {}", e),
        }
    }
}

#[cfg(test)]
mod tests_pipeline;
#[cfg(test)]
mod tests_ports;
