//! ATA Controller
//!
//! Primary-channel IDE controller with two units (master/slave, selected by
//! bit 4 of the device/head register). Fixed disks use 512-byte sectors;
//! ATAPI units (ISO images) take 12-byte packets and use 2048-byte sectors.
//! All sector I/O goes through a [`DiskIoBridge`], so a transfer stays BSY
//! until the machine collects the completion with [`AtaController::service_io`].
//!
//! ## Registers
//!
//! | Port  | Read            | Write           |
//! |:------|:----------------|:----------------|
//! | 0x1F0 | Data (16-bit)   | Data (16-bit)   |
//! | 0x1F1 | Error           | Features        |
//! | 0x1F2 | Sector count    | Sector count    |
//! | 0x1F3 | LBA low/sector  | LBA low/sector  |
//! | 0x1F4 | LBA mid/cyl lo  | LBA mid/cyl lo  |
//! | 0x1F5 | LBA high/cyl hi | LBA high/cyl hi |
//! | 0x1F6 | Device/head     | Device/head     |
//! | 0x1F7 | Status          | Command         |
//! | 0x3F6 | Alt status      | Device control  |
//!
//! 0x3F7 (device address) is not decoded here; the floppy controller owns
//! it for DIR/CCR.
//!
//! Bit 7 of the port is ignored when decoding, so the same register file
//! answers at 0x170-0x177 if registered there.

pub mod atapi;

use crate::debugger::Debuggable;
use crate::disk::{
    DiskAccessRequest, DiskChannel, DiskCompletion, DiskError, DiskImage, DiskIoBridge, DiskSet,
    Direction, DriveInfo, CD_SECTOR_SIZE, MAX_DRIVES, SECTOR_SIZE,
};
use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice, NO_DEVICE};
use crate::memory::byte_utils::{self, write_ata_string};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::path::Path;

pub const ATA_IRQ: u8 = 14;

pub const STATUS_ERR: u8 = 0x01;
pub const STATUS_DRQ: u8 = 0x08;
pub const STATUS_DF: u8 = 0x20;
pub const STATUS_DRDY: u8 = 0x40;
pub const STATUS_BSY: u8 = 0x80;

pub const ERROR_ABRT: u8 = 0x04;
pub const ERROR_IDNF: u8 = 0x10;
pub const ERROR_UNC: u8 = 0x40;

const CTRL_NIEN: u8 = 0x02;
const CTRL_SRST: u8 = 0x04;

const DEVICE_LBA: u8 = 0x40;
const DEVICE_UNIT: u8 = 0x10;

const REG_DATA: u16 = 0;
const REG_ERROR_FEATURES: u16 = 1;
const REG_SECTOR_COUNT: u16 = 2;
const REG_LBA_LOW: u16 = 3;
const REG_LBA_MID: u16 = 4;
const REG_LBA_HIGH: u16 = 5;
const REG_DEVICE: u16 = 6;

/// Control block ports (0x3F6) have bit 9 set.
const CONTROL_BLOCK: u16 = 0x200;

/// The guest-visible register file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtaRegisters {
    pub features: u8,
    pub sector_count: u8,
    pub lba_low: u8,
    pub lba_mid: u8,
    pub lba_high: u8,
    pub device_head: u8,
    pub status: u8,
    pub error: u8,
    pub control: u8,
    pub irq_pending: bool,
}

/// Cylinder/head/sector translation for a fixed disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChsGeometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
}

impl ChsGeometry {
    /// Default translation: 16 heads, 63 sectors per track.
    pub fn for_sectors(num_sectors: u32) -> Self {
        Self::with_heads_and_sectors(num_sectors, 16, 63)
    }

    fn with_heads_and_sectors(num_sectors: u32, heads: u8, sectors_per_track: u8) -> Self {
        let per_cylinder = heads as u32 * sectors_per_track as u32;
        let cylinders = (num_sectors / per_cylinder.max(1)).clamp(1, 16383);
        Self {
            cylinders: cylinders as u16,
            heads,
            sectors_per_track,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.cylinders as u32 * self.heads as u32 * self.sectors_per_track as u32
    }

    pub fn lba(&self, cylinder: u16, head: u8, sector: u8) -> Option<u32> {
        if sector == 0 || sector > self.sectors_per_track || head >= self.heads {
            return None;
        }
        let track = cylinder as u32 * self.heads as u32 + head as u32;
        Some(track * self.sectors_per_track as u32 + sector as u32 - 1)
    }
}

#[derive(Debug, Clone, Default)]
struct Drive {
    info: Option<DriveInfo>,
    present: bool,
    default_geometry: Option<ChsGeometry>,
    geometry: Option<ChsGeometry>,
    sense: atapi::Sense,
}

impl Drive {
    /// The attached image, if the guest is allowed to see it.
    fn visible(&self) -> Option<DriveInfo> {
        self.info.filter(|_| self.present)
    }

    fn is_atapi(&self) -> bool {
        self.visible().is_some_and(|info| info.is_cd)
    }

    fn fixed_disk(&self) -> Option<DriveInfo> {
        self.visible().filter(|info| !info.is_cd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataMode {
    Idle,
    /// Host reads `data`; `atapi` selects the packet data phase rules
    PioIn { atapi: bool },
    /// Host writes one sector into `data`
    PioOut,
    /// Host writes a 12-byte packet into `data`
    Packet,
}

/// A multi-sector transfer in progress.
#[derive(Debug, Clone, Copy)]
struct SectorOp {
    unit: u8,
    lba: u32,
    remaining: u32,
    direction: Direction,
    sector_size: usize,
    atapi: bool,
}

impl SectorOp {
    fn matches(&self, completion: &DiskCompletion) -> bool {
        self.unit == completion.unit
            && self.lba == completion.lba
            && self.direction == completion.direction
    }
}

pub struct AtaController {
    regs: AtaRegisters,
    drives: [Drive; MAX_DRIVES],
    mode: DataMode,
    data: Vec<u8>,
    data_index: usize,
    op: Option<SectorOp>,
    /// Request refused by a busy bridge, submitted again on the next service
    retry: Option<DiskAccessRequest>,
    disks: DiskSet,
    bridge: DiskIoBridge,
}

impl std::fmt::Debug for AtaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtaController")
            .field("regs", &self.regs)
            .field("mode", &self.mode)
            .field("op", &self.op)
            .finish()
    }
}

impl AtaController {
    /// Create the controller and start its storage worker.
    pub fn new() -> Result<Self, DiskError> {
        let disks = DiskSet::new();
        let bridge = DiskIoBridge::spawn(DiskChannel::Ata, disks.clone())?;
        Ok(Self {
            regs: AtaRegisters::default(),
            drives: Default::default(),
            mode: DataMode::Idle,
            data: Vec::new(),
            data_index: 0,
            op: None,
            retry: None,
            disks,
            bridge,
        })
    }

    /// Register the task file (0x1F0-0x1F7) and alternate status (0x3F6).
    pub fn attach_to(self, bus: &mut IoBus) -> DeviceId {
        let id = bus.add_device(0x3F8, 0x1F0, 1 << ATA_IRQ, Box::new(self));
        bus.add_region(id, 0x3FF, 0x3F6, 1 << ATA_IRQ);
        id
    }

    /// Attach an image file to `unit`. `.iso` files become ATAPI units.
    pub fn open_disk(&mut self, unit: u8, path: impl AsRef<Path>) -> Result<DriveInfo, DiskError> {
        let info = self.disks.open(unit, path)?;
        self.install(unit, info);
        Ok(info)
    }

    pub fn attach_image(&mut self, unit: u8, image: DiskImage) -> Result<DriveInfo, DiskError> {
        let info = self.disks.attach(unit, image)?;
        self.install(unit, info);
        Ok(info)
    }

    fn install(&mut self, unit: u8, info: DriveInfo) {
        let geometry = (!info.is_cd).then(|| ChsGeometry::for_sectors(info.num_sectors));
        self.drives[unit as usize] = Drive {
            info: Some(info),
            present: true,
            default_geometry: geometry,
            geometry,
            sense: atapi::Sense::default(),
        };
    }

    /// Show or hide an attached unit from the guest.
    pub fn set_fixed_disk_present(&mut self, unit: u8, present: bool) -> Result<(), DiskError> {
        let drive = self
            .drives
            .get_mut(unit as usize)
            .ok_or(DiskError::InvalidUnit { unit })?;
        drive.present = present;
        Ok(())
    }

    pub fn is_present(&self, unit: u8) -> bool {
        self.drives
            .get(unit as usize)
            .is_some_and(|d| d.visible().is_some())
    }

    pub fn drive_info(&self, unit: u8) -> Option<DriveInfo> {
        self.drives.get(unit as usize)?.visible()
    }

    /// Number of visible fixed (non-ATAPI) disks.
    pub fn fixed_disk_count(&self) -> usize {
        self.drives.iter().filter(|d| d.fixed_disk().is_some()).count()
    }

    /// Current register file, without the side effects of a status read.
    pub fn registers(&self) -> AtaRegisters {
        self.regs
    }

    pub fn irq_pending(&self) -> bool {
        self.regs.irq_pending
    }

    /// True while a sector transfer is waiting on storage.
    pub fn is_busy(&self) -> bool {
        self.regs.status & STATUS_BSY != 0
    }

    pub fn reset(&mut self) {
        self.regs.control = 0;
        self.software_reset();
    }

    /// Collect a finished storage operation, if any, and resubmit a refused
    /// request once the channel is free.
    pub fn service_io(&mut self, ctx: &mut DeviceContext) {
        if let Some(completion) = self.bridge.poll() {
            self.io_complete(completion, ctx);
        }
        self.submit_retry(ctx);
    }

    /// Block until the outstanding storage operation finishes, then handle
    /// it as `service_io` would. Returns false if nothing was outstanding.
    pub fn wait_for_io(&mut self, ctx: &mut DeviceContext) -> bool {
        self.submit_retry(ctx);
        match self.bridge.wait() {
            Some(completion) => {
                self.io_complete(completion, ctx);
                self.submit_retry(ctx);
                true
            }
            None => false,
        }
    }

    fn submit_retry(&mut self, ctx: &mut DeviceContext) {
        if self.bridge.is_pending() {
            return;
        }
        if let Some(request) = self.retry.take() {
            self.submit(request, ctx);
        }
    }

    /// Completion of a storage operation for `completion.unit`.
    pub fn io_complete(&mut self, completion: DiskCompletion, ctx: &mut DeviceContext) {
        // With a request still to resubmit, anything arriving is left over
        // from a command that was reset
        let current = self.op.filter(|op| self.retry.is_none() && op.matches(&completion));
        let Some(mut op) = current else {
            debug!(
                "Dropping stale ATA completion unit {} lba {}",
                completion.unit, completion.lba
            );
            return;
        };

        if !completion.success {
            warn!(
                "ATA {:?} failed, unit {} lba {}",
                completion.direction, completion.unit, completion.lba
            );
            self.op = None;
            self.end_data_phase();
            if op.atapi {
                self.regs.sector_count = atapi::REASON_STATUS;
            }
            self.regs.error = if completion.was_write() { ERROR_ABRT } else { ERROR_UNC };
            self.regs.status = STATUS_DRDY | STATUS_DF | STATUS_ERR;
            self.set_irq(ctx);
            return;
        }

        match completion.direction {
            Direction::Read => {
                if op.atapi {
                    let [low, high] = (op.sector_size as u16).to_le_bytes();
                    self.regs.sector_count = atapi::REASON_DATA_IN;
                    self.regs.lba_mid = low;
                    self.regs.lba_high = high;
                }
                self.data = completion.buffer;
                self.data_index = 0;
                self.mode = DataMode::PioIn { atapi: op.atapi };
                self.regs.status = STATUS_DRDY | STATUS_DRQ;
            }
            Direction::Write => {
                op.remaining -= 1;
                op.lba += 1;
                if op.remaining > 0 {
                    self.op = Some(op);
                    self.data = vec![0; op.sector_size];
                    self.data_index = 0;
                    self.mode = DataMode::PioOut;
                    self.regs.status = STATUS_DRDY | STATUS_DRQ;
                } else {
                    self.op = None;
                    self.end_data_phase();
                    self.regs.status = STATUS_DRDY;
                }
            }
        }
        self.set_irq(ctx);
    }

    fn selected_unit(&self) -> u8 {
        (self.regs.device_head & DEVICE_UNIT) >> 4
    }

    fn selected(&self) -> &Drive {
        &self.drives[self.selected_unit() as usize]
    }

    fn set_irq(&mut self, ctx: &mut DeviceContext) {
        self.regs.irq_pending = true;
        if self.regs.control & CTRL_NIEN == 0 {
            ctx.raise_irq(ATA_IRQ);
        }
    }

    fn set_signature(&mut self, unit: u8) {
        let atapi = self.drives[unit as usize].is_atapi();
        self.regs.sector_count = 1;
        self.regs.lba_low = 1;
        (self.regs.lba_mid, self.regs.lba_high) = if atapi { (0x14, 0xEB) } else { (0, 0) };
    }

    fn software_reset(&mut self) {
        self.op = None;
        self.retry = None;
        self.end_data_phase();

        let control = self.regs.control;
        self.regs = AtaRegisters {
            control,
            error: 0x01, // diagnostics passed
            ..AtaRegisters::default()
        };
        self.set_signature(0);
        if !self.drives[0].is_atapi() {
            self.regs.status = STATUS_DRDY;
        }
    }

    fn end_data_phase(&mut self) {
        self.mode = DataMode::Idle;
        self.data.clear();
        self.data_index = 0;
    }

    fn abort(&mut self, error: u8, ctx: &mut DeviceContext) {
        self.op = None;
        self.end_data_phase();
        self.regs.error = error;
        self.regs.status &= !(STATUS_BSY | STATUS_DRQ);
        self.regs.status |= STATUS_ERR;
        self.set_irq(ctx);
    }

    fn complete_non_data(&mut self, ctx: &mut DeviceContext) {
        self.end_data_phase();
        self.regs.status = STATUS_DRDY;
        self.set_irq(ctx);
    }

    fn begin_pio_in(&mut self, data: Vec<u8>, atapi: bool, ctx: &mut DeviceContext) {
        self.data = data;
        self.data_index = 0;
        self.mode = DataMode::PioIn { atapi };
        self.regs.status = STATUS_DRDY | STATUS_DRQ;
        self.set_irq(ctx);
    }

    fn begin_pio_out(&mut self, mode: DataMode, len: usize) {
        self.data = vec![0; len];
        self.data_index = 0;
        self.mode = mode;
        self.regs.status = STATUS_DRDY | STATUS_DRQ;
    }

    fn submit(&mut self, request: DiskAccessRequest, ctx: &mut DeviceContext) {
        let was_write = request.direction == Direction::Write;
        if let Err(err) = self.bridge.submit(request) {
            match err {
                DiskError::ChannelBusy { request, .. } => self.retry = Some(*request),
                err => {
                    warn!("ATA request failed: {}", err);
                    self.op = None;
                    self.end_data_phase();
                    self.regs.error = if was_write { ERROR_ABRT } else { ERROR_UNC };
                    self.regs.status = STATUS_DRDY | STATUS_DF | STATUS_ERR;
                    self.set_irq(ctx);
                }
            }
        }
    }

    /// LBA addressed by the task file, in LBA or CHS form.
    fn task_file_lba(&self, unit: u8) -> Option<u32> {
        let r = &self.regs;
        if r.device_head & DEVICE_LBA != 0 {
            return Some(
                ((r.device_head as u32 & 0x0F) << 24)
                    | (r.lba_high as u32) << 16
                    | (r.lba_mid as u32) << 8
                    | r.lba_low as u32,
            );
        }
        let cylinder = byte_utils::join_u16(r.lba_mid, r.lba_high);
        self.drives[unit as usize]
            .geometry?
            .lba(cylinder, r.device_head & 0x0F, r.lba_low)
    }

    fn sector_count(&self) -> u32 {
        match self.regs.sector_count {
            0 => 256,
            n => n as u32,
        }
    }

    fn exec_command(&mut self, command: u8, ctx: &mut DeviceContext) {
        if self.is_busy() {
            debug!("ATA command {:02X} ignored while busy", command);
            return;
        }

        let unit = self.selected_unit();
        self.regs.error = 0;
        self.regs.status &= !(STATUS_ERR | STATUS_DF);

        match command {
            // DEVICE RESET
            0x08 if self.selected().is_atapi() => {
                self.end_data_phase();
                self.set_signature(unit);
                self.regs.error = 0x01;
                self.regs.status = 0;
            }
            // READ SECTORS (with/without retry)
            0x20 | 0x21 => self.start_transfer(unit, Direction::Read, ctx),
            // WRITE SECTORS
            0x30 | 0x31 => self.start_transfer(unit, Direction::Write, ctx),
            // INITIALIZE DEVICE PARAMETERS
            0x91 => {
                let heads = (self.regs.device_head & 0x0F) + 1;
                let sectors = self.regs.sector_count;
                match self.selected().fixed_disk() {
                    Some(info) if sectors != 0 => {
                        self.drives[unit as usize].geometry = Some(
                            ChsGeometry::with_heads_and_sectors(info.num_sectors, heads, sectors),
                        );
                        self.complete_non_data(ctx);
                    }
                    _ => self.abort(ERROR_ABRT, ctx),
                }
            }
            // PACKET
            0xA0 if self.selected().is_atapi() => {
                self.regs.sector_count = atapi::REASON_COMMAND;
                self.begin_pio_out(DataMode::Packet, 12);
            }
            // IDENTIFY PACKET DEVICE
            0xA1 if self.selected().is_atapi() => {
                self.begin_pio_in(atapi::identify_packet_data(), false, ctx);
            }
            // IDENTIFY DEVICE
            0xEC => {
                let drive = self.selected();
                match (drive.fixed_disk(), drive.default_geometry, drive.geometry) {
                    (Some(info), Some(default), Some(current)) => {
                        let data = identify_data(info, default, current);
                        self.begin_pio_in(data, false, ctx);
                    }
                    _ => {
                        // Packet devices leave their signature behind
                        if drive.is_atapi() {
                            self.set_signature(unit);
                        }
                        self.abort(ERROR_ABRT, ctx);
                    }
                }
            }
            // SET FEATURES
            0xEF if self.selected().visible().is_some() => self.complete_non_data(ctx),
            _ => {
                debug!("Unhandled ATA command {:02X} (unit {})", command, unit);
                self.abort(ERROR_ABRT, ctx);
            }
        }
    }

    fn start_transfer(&mut self, unit: u8, direction: Direction, ctx: &mut DeviceContext) {
        if self.selected().fixed_disk().is_none() {
            if self.selected().is_atapi() {
                self.set_signature(unit);
            }
            self.abort(ERROR_ABRT, ctx);
            return;
        }
        let Some(lba) = self.task_file_lba(unit) else {
            self.abort(ERROR_IDNF, ctx);
            return;
        };

        let op = SectorOp {
            unit,
            lba,
            remaining: self.sector_count(),
            direction,
            sector_size: SECTOR_SIZE,
            atapi: false,
        };
        self.op = Some(op);

        match direction {
            Direction::Read => {
                self.regs.status = STATUS_BSY;
                self.submit(DiskAccessRequest::read(unit, lba, SECTOR_SIZE), ctx);
            }
            // Data for the first sector comes before any storage access
            Direction::Write => self.begin_pio_out(DataMode::PioOut, SECTOR_SIZE),
        }
    }

    fn run_packet(&mut self, ctx: &mut DeviceContext) {
        let mut packet = [0u8; 12];
        packet.copy_from_slice(&self.data[..12]);
        self.end_data_phase();

        let unit = self.selected_unit();
        let drive = &mut self.drives[unit as usize];
        let info = drive.visible();
        debug!("ATAPI packet {:02X?} (unit {})", packet, unit);

        match atapi::handle_packet(&mut drive.sense, &packet, info) {
            atapi::PacketResult::DataIn(data) if !data.is_empty() => {
                let [low, high] = (data.len().min(0xFFFF) as u16).to_le_bytes();
                self.regs.sector_count = atapi::REASON_DATA_IN;
                self.regs.lba_mid = low;
                self.regs.lba_high = high;
                self.begin_pio_in(data, true, ctx);
            }
            atapi::PacketResult::DataIn(_) | atapi::PacketResult::NoData => {
                self.regs.sector_count = atapi::REASON_STATUS;
                self.complete_non_data(ctx);
            }
            atapi::PacketResult::Read { lba, blocks } => {
                self.op = Some(SectorOp {
                    unit,
                    lba,
                    remaining: blocks,
                    direction: Direction::Read,
                    sector_size: CD_SECTOR_SIZE,
                    atapi: true,
                });
                self.regs.status = STATUS_BSY;
                self.submit(DiskAccessRequest::read(unit, lba, CD_SECTOR_SIZE), ctx);
            }
            atapi::PacketResult::Error(sense) => {
                self.regs.sector_count = atapi::REASON_STATUS;
                self.abort((sense.key << 4) | ERROR_ABRT, ctx);
            }
        }
    }

    /// The host has read the whole data buffer.
    fn finish_data_in(&mut self, atapi: bool, ctx: &mut DeviceContext) {
        self.end_data_phase();

        let Some(mut op) = self.op else {
            // IDENTIFY or packet data
            if atapi {
                self.regs.sector_count = atapi::REASON_STATUS;
                self.complete_non_data(ctx);
            } else {
                self.regs.status = STATUS_DRDY;
            }
            return;
        };

        op.remaining -= 1;
        op.lba += 1;
        if op.remaining > 0 {
            self.op = Some(op);
            self.regs.status = STATUS_BSY;
            self.submit(DiskAccessRequest::read(op.unit, op.lba, op.sector_size), ctx);
        } else {
            self.op = None;
            if op.atapi {
                self.regs.sector_count = atapi::REASON_STATUS;
                self.complete_non_data(ctx);
            } else {
                self.regs.status = STATUS_DRDY;
            }
        }
    }

    /// The host has filled the data buffer.
    fn finish_data_out(&mut self, ctx: &mut DeviceContext) {
        match self.mode {
            DataMode::Packet => self.run_packet(ctx),
            DataMode::PioOut => {
                let Some(op) = self.op else {
                    self.end_data_phase();
                    return;
                };
                let buffer = std::mem::take(&mut self.data);
                self.end_data_phase();
                self.regs.status = STATUS_BSY;
                self.submit(DiskAccessRequest::write(op.unit, op.lba, buffer), ctx);
            }
            _ => {}
        }
    }

    fn data_in_u8(&mut self, ctx: &mut DeviceContext) -> u8 {
        let DataMode::PioIn { atapi } = self.mode else {
            return NO_DEVICE;
        };
        let value = self.data.get(self.data_index).copied().unwrap_or(0);
        self.data_index += 1;
        if self.data_index >= self.data.len() {
            self.finish_data_in(atapi, ctx);
        }
        value
    }

    fn data_in_u16(&mut self, ctx: &mut DeviceContext) -> u16 {
        let DataMode::PioIn { atapi } = self.mode else {
            return 0xFFFF;
        };
        let low = self.data.get(self.data_index).copied().unwrap_or(0);
        let high = self.data.get(self.data_index + 1).copied().unwrap_or(0);
        self.data_index += 2;
        if self.data_index >= self.data.len() {
            self.finish_data_in(atapi, ctx);
        }
        byte_utils::join_u16(low, high)
    }

    fn data_out(&mut self, bytes: &[u8], ctx: &mut DeviceContext) {
        if !matches!(self.mode, DataMode::PioOut | DataMode::Packet) {
            return;
        }
        for &byte in bytes {
            if let Some(slot) = self.data.get_mut(self.data_index) {
                *slot = byte;
                self.data_index += 1;
            }
        }
        if self.data_index >= self.data.len() {
            self.finish_data_out(ctx);
        }
    }

    fn write_control(&mut self, value: u8, ctx: &mut DeviceContext) {
        let previous = self.regs.control;
        self.regs.control = value;

        if previous & CTRL_SRST == 0 && value & CTRL_SRST != 0 {
            debug!("ATA software reset");
            self.software_reset();
            ctx.lower_irq(ATA_IRQ);
            return;
        }

        if value & CTRL_NIEN != 0 {
            ctx.lower_irq(ATA_IRQ);
        } else if previous & CTRL_NIEN != 0 && self.regs.irq_pending {
            ctx.raise_irq(ATA_IRQ);
        }
    }
}

/// IDENTIFY DEVICE response for a fixed disk.
fn identify_data(info: DriveInfo, default: ChsGeometry, current: ChsGeometry) -> Vec<u8> {
    let mut words = [0u16; 256];

    // Fixed device
    words[0] = 0x0040;
    words[1] = default.cylinders;
    words[3] = default.heads as u16;
    words[6] = default.sectors_per_track as u16;
    write_ata_string(&mut words[10..20], "PICOPC0000000001");
    write_ata_string(&mut words[23..27], "1.0");
    write_ata_string(&mut words[27..47], "PICOPC ATA DISK");
    // LBA supported
    words[49] = 1 << 9;
    // Words 54-58 valid
    words[53] = 1;
    words[54] = current.cylinders;
    words[55] = current.heads as u16;
    words[56] = current.sectors_per_track as u16;
    let capacity = current.capacity();
    words[57] = capacity as u16;
    words[58] = (capacity >> 16) as u16;
    let total = info.num_sectors.min(0x0FFF_FFFF);
    words[60] = total as u16;
    words[61] = (total >> 16) as u16;

    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

impl IoDevice for AtaController {
    fn read(&mut self, port: u16, ctx: &mut DeviceContext) -> u8 {
        let reg = port & 7;
        if port & CONTROL_BLOCK != 0 {
            // Alternate status leaves the interrupt alone
            return if reg == REG_DEVICE { self.regs.status } else { NO_DEVICE };
        }

        match reg {
            REG_DATA => self.data_in_u8(ctx),
            REG_ERROR_FEATURES => self.regs.error,
            REG_SECTOR_COUNT => self.regs.sector_count,
            REG_LBA_LOW => self.regs.lba_low,
            REG_LBA_MID => self.regs.lba_mid,
            REG_LBA_HIGH => self.regs.lba_high,
            REG_DEVICE => self.regs.device_head,
            _ => {
                // Reading status acknowledges the interrupt
                self.regs.irq_pending = false;
                ctx.lower_irq(ATA_IRQ);
                self.regs.status
            }
        }
    }

    fn write(&mut self, port: u16, data: u8, ctx: &mut DeviceContext) {
        let reg = port & 7;
        if port & CONTROL_BLOCK != 0 {
            if reg == REG_DEVICE {
                self.write_control(data, ctx);
            }
            return;
        }

        match reg {
            REG_DATA => self.data_out(&[data], ctx),
            REG_ERROR_FEATURES => self.regs.features = data,
            REG_SECTOR_COUNT => self.regs.sector_count = data,
            REG_LBA_LOW => self.regs.lba_low = data,
            REG_LBA_MID => self.regs.lba_mid = data,
            REG_LBA_HIGH => self.regs.lba_high = data,
            REG_DEVICE => {
                self.regs.device_head = data;
                // Selecting a non-packet unit reports it ready
                if !self.selected().is_atapi() {
                    self.regs.status |= STATUS_DRDY;
                }
            }
            _ => self.exec_command(data, ctx),
        }
    }

    fn read16(&mut self, port: u16, ctx: &mut DeviceContext) -> u16 {
        if port & CONTROL_BLOCK == 0 && port & 7 == REG_DATA {
            return self.data_in_u16(ctx);
        }
        let low = self.read(port, ctx);
        let high = self.read(port.wrapping_add(1), ctx);
        byte_utils::join_u16(low, high)
    }

    fn write16(&mut self, port: u16, data: u16, ctx: &mut DeviceContext) {
        if port & CONTROL_BLOCK == 0 && port & 7 == REG_DATA {
            self.data_out(&data.to_le_bytes(), ctx);
            return;
        }
        let (low, high) = byte_utils::split_u16(data);
        self.write(port, low, ctx);
        self.write(port.wrapping_add(1), high, ctx);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Debuggable for AtaController {
    fn read_state(&self) -> Value {
        serde_json::to_value(self.regs).unwrap_or(Value::Null)
    }

    fn write_state(&mut self, state: &Value) {
        match serde_json::from_value::<AtaRegisters>(state.clone()) {
            Ok(regs) => self.regs = regs,
            Err(e) => warn!("Error deserializing ATA state: {}", e),
        }
    }
}
