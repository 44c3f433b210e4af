//! Floppy Disk Controller
//!
//! An 82077AA-style controller for two drives. Commands are written byte by
//! byte to the FIFO, run through an execution phase, and leave result bytes
//! for the host to read back. Sector data moves on DMA channel 2 through the
//! device DMA hooks, or through the FIFO when SPECIFY selects non-DMA mode.
//! Sector storage access goes through a [`DiskIoBridge`]; seeks complete
//! after a delay scheduled through `cycles_to_next_interrupt`.
//!
//! ## Registers
//!
//! | Port  | Read                  | Write                  |
//! |:------|:----------------------|:-----------------------|
//! | 0x3F0 | Status A              |                        |
//! | 0x3F1 | Status B              |                        |
//! | 0x3F2 | Digital output (DOR)  | Digital output (DOR)   |
//! | 0x3F4 | Main status (MSR)     | Data rate select (DSR) |
//! | 0x3F5 | FIFO                  | FIFO                   |
//! | 0x3F7 | Digital input (DIR)   | Config control (CCR)   |

use crate::debugger::Debuggable;
use crate::disk::{
    DiskAccessRequest, DiskChannel, DiskCompletion, DiskError, DiskImage, DiskIoBridge, DiskSet,
    Direction, DriveInfo, MAX_DRIVES, SECTOR_SIZE,
};
use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice, NO_DEVICE};
use crate::machine::SYSTEM_CLOCK;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::path::Path;

pub const FLOPPY_IRQ: u8 = 6;
pub const FLOPPY_DMA_CHANNEL: u8 = 2;

// DOR
const DOR_DRIVE_MASK: u8 = 0x03;
const DOR_NRESET: u8 = 0x04;
const DOR_IRQ_DMA: u8 = 0x08;

// MSR
const MSR_RQM: u8 = 0x80;
const MSR_DIO: u8 = 0x40;
const MSR_NDMA: u8 = 0x20;
const MSR_CB: u8 = 0x10;

const DSR_RESET: u8 = 0x80;
const DIR_DISK_CHANGE: u8 = 0x80;

// ST0
const ST0_ABNORMAL: u8 = 0x40;
const ST0_INVALID: u8 = 0x80;
const ST0_SEEK_END: u8 = 0x20;
const ST0_NOT_READY: u8 = 0x08;
const ST0_RESET: u8 = 0xC0;

// ST1
const ST1_NO_DATA: u8 = 0x04;
const ST1_DATA_ERROR: u8 = 0x20;

// ST2
const ST2_DATA_ERROR: u8 = 0x20;

// ST3
const ST3_TWO_SIDED: u8 = 0x08;
const ST3_TRACK0: u8 = 0x10;
const ST3_READY: u8 = 0x20;

/// Head step time, 3ms per track.
const STEP_TICKS: u64 = SYSTEM_CLOCK as u64 * 3 / 1000;

/// Host-visible register state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloppyRegisters {
    pub dor: u8,
    pub ccr: u8,
    /// SPECIFY byte 1: step rate / head unload time
    pub srt_hut: u8,
    /// SPECIFY byte 2: head load time / non-DMA
    pub hlt_nd: u8,
    pub cylinders: [u8; MAX_DRIVES],
    pub irq_pending: bool,
}

impl FloppyRegisters {
    fn non_dma(&self) -> bool {
        self.hlt_nd & 1 != 0
    }
}

#[derive(Debug, Clone, Default)]
struct Drive {
    info: Option<DriveInfo>,
    disk_changed: bool,
    /// Target cylinder and completion cycle of a seek in progress
    seek: Option<(u8, u64)>,
}

/// A READ DATA / WRITE DATA command in its execution phase.
#[derive(Debug, Clone, Copy)]
struct Transfer {
    unit: u8,
    direction: Direction,
    cylinder: u8,
    head: u8,
    sector: u8,
    size: u8,
    end_of_track: u8,
    multi_track: bool,
    /// A sector is with the storage worker
    waiting: bool,
    /// The current read sector has been consumed; fetch the next one
    next_pending: bool,
    terminal_count: bool,
}

impl Transfer {
    /// Move to the next sector. Returns false once past the end of the
    /// track (or of both sides with multi-track).
    fn advance(&mut self) -> bool {
        self.sector += 1;
        if self.sector <= self.end_of_track {
            return true;
        }
        self.sector = 1;
        if self.multi_track && self.head == 0 {
            self.head = 1;
            return true;
        }
        if self.multi_track {
            self.head = 0;
        }
        self.cylinder = self.cylinder.wrapping_add(1);
        false
    }

    fn hds(&self) -> u8 {
        (self.head << 2) | self.unit
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Command,
    Execution(Transfer),
    Result,
}

pub struct FloppyController {
    regs: FloppyRegisters,
    drives: [Drive; MAX_DRIVES],
    phase: Phase,
    command: Vec<u8>,
    result: VecDeque<u8>,
    data: Vec<u8>,
    data_index: usize,
    /// ST0 values waiting for SENSE INTERRUPT STATUS
    interrupts: VecDeque<u8>,
    /// Request refused by a busy channel, resubmitted once it drains
    retry: Option<DiskAccessRequest>,
    disks: DiskSet,
    bridge: DiskIoBridge,
}

impl std::fmt::Debug for FloppyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloppyController")
            .field("regs", &self.regs)
            .field("phase", &self.phase)
            .field("command", &self.command)
            .field("result", &self.result)
            .finish()
    }
}

/// Total command length (including the opcode), by the low five bits.
fn command_length(opcode: u8) -> Option<usize> {
    match opcode & 0x1F {
        0x03 => Some(3),        // SPECIFY
        0x04 => Some(2),        // SENSE DRIVE STATUS
        0x05 | 0x06 => Some(9), // WRITE DATA / READ DATA
        0x07 => Some(2),        // RECALIBRATE
        0x08 => Some(1),        // SENSE INTERRUPT STATUS
        0x0A => Some(2),        // READ ID
        0x0F => Some(3),        // SEEK
        0x10 => Some(1),        // VERSION
        0x12 => Some(2),        // PERPENDICULAR MODE
        0x13 => Some(4),        // CONFIGURE
        _ => None,
    }
}

impl FloppyController {
    /// Create the controller and start its storage worker.
    pub fn new() -> Result<Self, DiskError> {
        let disks = DiskSet::new();
        let bridge = DiskIoBridge::spawn(DiskChannel::Floppy, disks.clone())?;
        Ok(Self {
            regs: FloppyRegisters::default(),
            drives: Default::default(),
            phase: Phase::Command,
            command: Vec::with_capacity(9),
            result: VecDeque::with_capacity(7),
            data: Vec::new(),
            data_index: 0,
            interrupts: VecDeque::new(),
            retry: None,
            disks,
            bridge,
        })
    }

    /// Register ports 0x3F0-0x3F5 and 0x3F7.
    pub fn attach_to(self, bus: &mut IoBus) -> DeviceId {
        let id = bus.add_device(0x3FC, 0x3F0, 1 << FLOPPY_IRQ, Box::new(self));
        bus.add_region(id, 0x3FE, 0x3F4, 1 << FLOPPY_IRQ);
        bus.add_region(id, 0x3FF, 0x3F7, 1 << FLOPPY_IRQ);
        id
    }

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
        let drive = &mut self.drives[unit as usize];
        drive.info = Some(info);
        drive.disk_changed = true;
    }

    /// Replace the guessed sectors per track of an attached image.
    pub fn override_sectors_per_track(
        &mut self,
        unit: u8,
        sectors_per_track: u8,
    ) -> Result<DriveInfo, DiskError> {
        let info = self.disks.override_sectors_per_track(unit, sectors_per_track)?;
        self.drives[unit as usize].info = Some(info);
        Ok(info)
    }

    pub fn is_present(&self, unit: u8) -> bool {
        self.drive_info(unit).is_some()
    }

    pub fn drive_info(&self, unit: u8) -> Option<DriveInfo> {
        self.drives.get(unit as usize)?.info
    }

    pub fn registers(&self) -> FloppyRegisters {
        self.regs
    }

    pub fn irq_pending(&self) -> bool {
        self.regs.irq_pending
    }

    /// LBA of a cylinder/head/sector on `unit`, using its geometry.
    pub fn get_lba(&self, unit: u8, cylinder: u8, head: u8, sector: u8) -> Option<u32> {
        self.drive_info(unit)?
            .floppy_geometry
            .lba(cylinder, head, sector)
    }

    /// True while sector data is ready for the DMA controller.
    pub fn dma_ready(&self) -> bool {
        matches!(&self.phase, Phase::Execution(t) if !t.waiting && !t.next_pending)
            && !self.regs.non_dma()
    }

    pub fn reset(&mut self) {
        self.regs = FloppyRegisters::default();
        self.controller_reset(&mut DeviceContext::default());
    }

    fn controller_reset(&mut self, ctx: &mut DeviceContext) {
        debug!("FDC reset");
        self.phase = Phase::Command;
        self.command.clear();
        self.result.clear();
        self.data.clear();
        self.data_index = 0;
        self.interrupts.clear();
        self.retry = None;
        for drive in &mut self.drives {
            drive.seek = None;
        }
        // One ready-changed status per drive
        self.interrupts.extend((0..4).map(|unit| ST0_RESET | unit));
        self.set_irq(ctx);
    }

    fn set_irq(&mut self, ctx: &mut DeviceContext) {
        if self.regs.dor & DOR_IRQ_DMA != 0 {
            self.regs.irq_pending = true;
            ctx.raise_irq(FLOPPY_IRQ);
        }
    }

    fn clear_irq(&mut self, ctx: &mut DeviceContext) {
        if self.regs.irq_pending {
            self.regs.irq_pending = false;
            ctx.lower_irq(FLOPPY_IRQ);
        }
    }

    fn main_status(&self) -> u8 {
        let seeking = self
            .drives
            .iter()
            .enumerate()
            .filter(|(_, d)| d.seek.is_some())
            .fold(0, |msr, (i, _)| msr | (1 << i));

        let phase = match &self.phase {
            Phase::Command if self.command.is_empty() => MSR_RQM,
            Phase::Command => MSR_RQM | MSR_CB,
            Phase::Result => MSR_RQM | MSR_DIO | MSR_CB,
            Phase::Execution(t) if t.waiting || t.next_pending => MSR_CB,
            Phase::Execution(t) if self.regs.non_dma() => {
                let dio = if t.direction == Direction::Read { MSR_DIO } else { 0 };
                MSR_RQM | MSR_NDMA | MSR_CB | dio
            }
            Phase::Execution(_) => MSR_CB,
        };
        phase | seeking
    }

    fn finish_with_result(&mut self, result: &[u8], ctx: &mut DeviceContext) {
        self.result.clear();
        self.result.extend(result);
        self.phase = Phase::Result;
        self.set_irq(ctx);
    }

    fn finish_transfer(&mut self, t: Transfer, st0: u8, st1: u8, st2: u8, ctx: &mut DeviceContext) {
        self.data.clear();
        self.data_index = 0;
        self.finish_with_result(
            &[st0 | t.hds(), st1, st2, t.cylinder, t.head, t.sector, t.size],
            ctx,
        );
    }

    fn write_fifo(&mut self, data: u8, ctx: &mut DeviceContext) {
        match self.phase {
            Phase::Command => {
                self.command.push(data);
                match command_length(self.command[0]) {
                    Some(len) if self.command.len() < len => {}
                    Some(_) => {
                        let command = std::mem::take(&mut self.command);
                        self.execute(&command, ctx);
                    }
                    None => {
                        debug!("Unhandled FDC command {:02X}", self.command[0]);
                        self.command.clear();
                        self.result.clear();
                        self.result.push_back(ST0_INVALID);
                        self.phase = Phase::Result;
                    }
                }
            }
            Phase::Execution(t) if self.regs.non_dma() && t.direction == Direction::Write => {
                self.put_byte(data, ctx);
            }
            _ => debug!("FDC FIFO write {:02X} ignored", data),
        }
    }

    fn read_fifo(&mut self, ctx: &mut DeviceContext) -> u8 {
        match self.phase {
            Phase::Result => {
                self.clear_irq(ctx);
                let value = self.result.pop_front().unwrap_or(NO_DEVICE);
                if self.result.is_empty() {
                    self.phase = Phase::Command;
                }
                value
            }
            Phase::Execution(t) if self.regs.non_dma() && t.direction == Direction::Read => {
                self.take_byte(ctx)
            }
            _ => NO_DEVICE,
        }
    }

    fn execute(&mut self, command: &[u8], ctx: &mut DeviceContext) {
        let opcode = command[0];
        match opcode & 0x1F {
            0x03 => {
                self.regs.srt_hut = command[1];
                self.regs.hlt_nd = command[2];
                self.phase = Phase::Command;
            }
            0x04 => {
                let unit = command[1] & DOR_DRIVE_MASK;
                let head = (command[1] >> 2) & 1;
                let mut st3 = unit | (head << 2);
                if let Some(info) = self.drive_info(unit) {
                    st3 |= ST3_READY;
                    if info.floppy_geometry.double_sided() {
                        st3 |= ST3_TWO_SIDED;
                    }
                }
                if self.cylinder(unit) == 0 {
                    st3 |= ST3_TRACK0;
                }
                self.result.clear();
                self.result.push_back(st3);
                self.phase = Phase::Result;
            }
            0x05 | 0x06 => self.start_transfer(command, ctx),
            0x07 => self.start_seek(command[1] & DOR_DRIVE_MASK, 0, ctx),
            0x08 => {
                let result = match self.interrupts.pop_front() {
                    Some(st0) => {
                        let unit = (st0 & DOR_DRIVE_MASK) as usize;
                        [st0, self.cylinder(unit as u8)].to_vec()
                    }
                    None => vec![ST0_INVALID],
                };
                self.clear_irq(ctx);
                self.result.clear();
                self.result.extend(result);
                self.phase = Phase::Result;
            }
            0x0A => {
                let unit = command[1] & DOR_DRIVE_MASK;
                let head = (command[1] >> 2) & 1;
                let cylinder = self.cylinder(unit);
                let st0 = if self.drive_info(unit).is_some() {
                    0
                } else {
                    ST0_ABNORMAL | ST0_NOT_READY
                };
                self.finish_with_result(
                    &[st0 | (head << 2) | unit, 0, 0, cylinder, head, 1, 2],
                    ctx,
                );
            }
            0x0F => self.start_seek(command[1] & DOR_DRIVE_MASK, command[2], ctx),
            0x10 => {
                self.result.clear();
                self.result.push_back(0x90);
                self.phase = Phase::Result;
            }
            // PERPENDICULAR MODE, CONFIGURE: accepted, no result
            _ => self.phase = Phase::Command,
        }
    }

    fn cylinder(&self, unit: u8) -> u8 {
        self.regs.cylinders.get(unit as usize).copied().unwrap_or(0)
    }

    fn start_seek(&mut self, unit: u8, target: u8, ctx: &mut DeviceContext) {
        self.phase = Phase::Command;
        let Some(drive) = self.drives.get_mut(unit as usize) else {
            // No such drive: the seek ends at once, abnormally
            self.interrupts.push_back(ST0_SEEK_END | ST0_ABNORMAL | unit);
            self.set_irq(ctx);
            return;
        };
        let distance = self.regs.cylinders[unit as usize].abs_diff(target).max(1) as u64;
        drive.seek = Some((target, ctx.cycle_count + distance * STEP_TICKS));
    }

    fn complete_seeks(&mut self, ctx: &mut DeviceContext) {
        let mut finished = false;
        for unit in 0..MAX_DRIVES {
            match self.drives[unit].seek {
                Some((target, due)) if due <= ctx.cycle_count => {
                    self.drives[unit].seek = None;
                    self.drives[unit].disk_changed = false;
                    self.regs.cylinders[unit] = target;
                    self.interrupts.push_back(ST0_SEEK_END | unit as u8);
                    finished = true;
                }
                _ => {}
            }
        }
        if finished {
            self.set_irq(ctx);
        }
    }

    fn start_transfer(&mut self, command: &[u8], ctx: &mut DeviceContext) {
        let direction = if command[0] & 0x1F == 0x06 {
            Direction::Read
        } else {
            Direction::Write
        };
        let mut t = Transfer {
            unit: command[1] & DOR_DRIVE_MASK,
            direction,
            cylinder: command[2],
            head: command[3] & 1,
            sector: command[4],
            size: command[5],
            end_of_track: command[6],
            multi_track: command[0] & 0x80 != 0,
            waiting: false,
            next_pending: false,
            terminal_count: false,
        };

        if !self.is_present(t.unit) {
            self.finish_transfer(t, ST0_ABNORMAL | ST0_NOT_READY, 0, 0, ctx);
            return;
        }
        if t.size != 2 {
            self.finish_transfer(t, ST0_ABNORMAL, ST1_NO_DATA, 0, ctx);
            return;
        }

        match direction {
            Direction::Read => {
                if self.request_read(&mut t, ctx) {
                    self.phase = Phase::Execution(t);
                }
            }
            Direction::Write => {
                self.data = vec![0; SECTOR_SIZE];
                self.data_index = 0;
                self.phase = Phase::Execution(t);
                if self.regs.non_dma() {
                    self.set_irq(ctx);
                }
            }
        }
    }

    /// Submit the read of `t`'s current sector. On failure the command ends
    /// with a result and false is returned.
    fn request_read(&mut self, t: &mut Transfer, ctx: &mut DeviceContext) -> bool {
        let Some(lba) = self.get_lba(t.unit, t.cylinder, t.head, t.sector) else {
            self.finish_transfer(*t, ST0_ABNORMAL, ST1_NO_DATA, 0, ctx);
            return false;
        };
        self.submit(DiskAccessRequest::read(t.unit, lba, SECTOR_SIZE), t, ctx)
    }

    fn submit(&mut self, request: DiskAccessRequest, t: &mut Transfer, ctx: &mut DeviceContext) -> bool {
        match self.bridge.submit(request) {
            Ok(()) => {
                t.waiting = true;
                t.next_pending = false;
                true
            }
            // An earlier command's sector is still with the worker
            Err(DiskError::ChannelBusy { request, .. }) => {
                self.retry = Some(*request);
                t.waiting = true;
                t.next_pending = false;
                true
            }
            Err(err) => {
                warn!("FDC request failed: {}", err);
                self.finish_transfer(*t, ST0_ABNORMAL, ST1_DATA_ERROR, ST2_DATA_ERROR, ctx);
                false
            }
        }
    }

    /// Collect a finished storage operation, resubmit a refused request
    /// and start any sector read that was left pending.
    pub fn service_io(&mut self, ctx: &mut DeviceContext) {
        if let Some(completion) = self.bridge.poll() {
            self.io_complete(completion, ctx);
        }
        self.submit_retry(ctx);
        self.fetch_next_sector(ctx);
    }

    /// Blocking variant of `service_io`. Returns false if nothing was
    /// outstanding.
    pub fn wait_for_io(&mut self, ctx: &mut DeviceContext) -> bool {
        self.submit_retry(ctx);
        self.fetch_next_sector(ctx);
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
        let Some(request) = self.retry.take() else {
            return;
        };
        if let Phase::Execution(mut t) = self.phase {
            if self.submit(request, &mut t, ctx) {
                self.phase = Phase::Execution(t);
            }
        }
    }

    fn fetch_next_sector(&mut self, ctx: &mut DeviceContext) {
        if let Phase::Execution(mut t) = self.phase {
            if t.next_pending && !self.bridge.is_pending() {
                if self.request_read(&mut t, ctx) {
                    self.phase = Phase::Execution(t);
                }
            }
        }
    }

    /// Completion of a storage operation for `completion.unit`.
    pub fn io_complete(&mut self, completion: DiskCompletion, ctx: &mut DeviceContext) {
        let Phase::Execution(mut t) = self.phase else {
            debug!("Dropping stale FDC completion unit {}", completion.unit);
            return;
        };
        // A request still to resubmit means the completion is left over
        // from before a reset
        if self.retry.is_some()
            || !t.waiting
            || t.unit != completion.unit
            || t.direction != completion.direction
        {
            debug!("Dropping stale FDC completion unit {}", completion.unit);
            return;
        }
        t.waiting = false;

        if !completion.success {
            warn!(
                "Floppy {:?} failed, unit {} lba {}",
                completion.direction, completion.unit, completion.lba
            );
            self.finish_transfer(t, ST0_ABNORMAL, ST1_DATA_ERROR, ST2_DATA_ERROR, ctx);
            return;
        }

        match completion.direction {
            Direction::Read => {
                if t.terminal_count {
                    self.finish_transfer(t, 0, 0, 0, ctx);
                    return;
                }
                self.data = completion.buffer;
                self.data_index = 0;
                self.phase = Phase::Execution(t);
                if self.regs.non_dma() {
                    self.set_irq(ctx);
                }
            }
            Direction::Write => self.sector_done(t, ctx),
        }
    }

    /// The current sector has been fully transferred.
    fn sector_done(&mut self, mut t: Transfer, ctx: &mut DeviceContext) {
        let more = t.advance();
        if t.terminal_count || !more {
            self.finish_transfer(t, 0, 0, 0, ctx);
            return;
        }
        match t.direction {
            // Fetched on the next service, so a terminal count arriving
            // with the last byte does not trigger a needless read
            Direction::Read => t.next_pending = true,
            Direction::Write => {
                self.data = vec![0; SECTOR_SIZE];
                self.data_index = 0;
            }
        }
        self.phase = Phase::Execution(t);
    }

    fn take_byte(&mut self, ctx: &mut DeviceContext) -> u8 {
        let Phase::Execution(t) = self.phase else {
            return NO_DEVICE;
        };
        if t.direction != Direction::Read || t.waiting || t.next_pending {
            return NO_DEVICE;
        }
        let value = self.data.get(self.data_index).copied().unwrap_or(NO_DEVICE);
        self.data_index += 1;
        if self.data_index >= self.data.len() {
            self.data.clear();
            self.data_index = 0;
            self.sector_done(t, ctx);
        }
        value
    }

    fn put_byte(&mut self, value: u8, ctx: &mut DeviceContext) {
        let Phase::Execution(mut t) = self.phase else {
            return;
        };
        if t.direction != Direction::Write || t.waiting {
            return;
        }
        if let Some(slot) = self.data.get_mut(self.data_index) {
            *slot = value;
            self.data_index += 1;
        }
        if self.data_index < self.data.len() {
            return;
        }

        let Some(lba) = self.get_lba(t.unit, t.cylinder, t.head, t.sector) else {
            self.finish_transfer(t, ST0_ABNORMAL, ST1_NO_DATA, 0, ctx);
            return;
        };
        let buffer = std::mem::take(&mut self.data);
        self.data_index = 0;
        if self.submit(DiskAccessRequest::write(t.unit, lba, buffer), &mut t, ctx) {
            self.phase = Phase::Execution(t);
        }
    }

    fn terminal_count(&mut self, ctx: &mut DeviceContext) {
        let Phase::Execution(mut t) = self.phase else {
            return;
        };
        if t.waiting {
            // Finish once storage is done with the sector
            t.terminal_count = true;
            self.phase = Phase::Execution(t);
        } else {
            self.finish_transfer(t, 0, 0, 0, ctx);
        }
    }

    fn write_dor(&mut self, value: u8, ctx: &mut DeviceContext) {
        let previous = self.regs.dor;
        self.regs.dor = value;
        if previous & DOR_NRESET == 0 && value & DOR_NRESET != 0 {
            self.controller_reset(ctx);
        } else if value & DOR_IRQ_DMA == 0 {
            self.clear_irq(ctx);
        }
    }
}

impl IoDevice for FloppyController {
    fn read(&mut self, port: u16, ctx: &mut DeviceContext) -> u8 {
        match port & 7 {
            // Status A: interrupt line
            0 => {
                if self.regs.irq_pending {
                    0x80
                } else {
                    0
                }
            }
            1 => 0,
            2 => self.regs.dor,
            4 => self.main_status(),
            5 => self.read_fifo(ctx),
            7 => {
                let unit = (self.regs.dor & DOR_DRIVE_MASK) as usize;
                match self.drives.get(unit) {
                    Some(drive) if drive.disk_changed => DIR_DISK_CHANGE,
                    _ => 0,
                }
            }
            _ => NO_DEVICE,
        }
    }

    fn write(&mut self, port: u16, data: u8, ctx: &mut DeviceContext) {
        match port & 7 {
            2 => self.write_dor(data, ctx),
            4 => {
                self.regs.ccr = data & 0x03;
                if data & DSR_RESET != 0 {
                    self.controller_reset(ctx);
                }
            }
            5 => self.write_fifo(data, ctx),
            7 => self.regs.ccr = data & 0x03,
            _ => debug!("FDC write {:04X} = {:02X} ignored", port, data),
        }
    }

    fn update_for_interrupts(&mut self, _mask: u16, ctx: &mut DeviceContext) {
        self.complete_seeks(ctx);
    }

    fn cycles_to_next_interrupt(&self, cycle_count: u64) -> u32 {
        self.drives
            .iter()
            .filter_map(|d| d.seek)
            .map(|(_, due)| due.saturating_sub(cycle_count).clamp(1, u32::MAX as u64) as u32)
            .min()
            .unwrap_or(0)
    }

    fn dma_read(&mut self, channel: u8, ctx: &mut DeviceContext) -> u8 {
        if channel != FLOPPY_DMA_CHANNEL || self.regs.non_dma() {
            return NO_DEVICE;
        }
        self.take_byte(ctx)
    }

    fn dma_write(&mut self, channel: u8, data: u8, ctx: &mut DeviceContext) {
        if channel == FLOPPY_DMA_CHANNEL && !self.regs.non_dma() {
            self.put_byte(data, ctx);
        }
    }

    fn dma_complete(&mut self, channel: u8, ctx: &mut DeviceContext) {
        if channel == FLOPPY_DMA_CHANNEL {
            self.terminal_count(ctx);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Debuggable for FloppyController {
    fn read_state(&self) -> Value {
        serde_json::to_value(self.regs).unwrap_or(Value::Null)
    }

    fn write_state(&mut self, state: &Value) {
        match serde_json::from_value::<FloppyRegisters>(state.clone()) {
            Ok(regs) => self.regs = regs,
            Err(e) => warn!("Error deserializing FDC state: {}", e),
        }
    }
}
