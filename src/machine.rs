//! PC Machine
//!
//! Owns the address space, the port bus, the interrupt router and every
//! device, and drives the run loop. The instruction engine is not part of
//! the machine: anything implementing [`Cpu`] is handed the machine as a
//! [`SystemBus`] for each slice of execution.
//!
//! ## Memory Map
//!
//! | Address Range      | Size    | Description                     |
//! |:-------------------|:--------|:--------------------------------|
//! | 0x000000-0x09FFFF  | 640 KB  | Conventional RAM                |
//! | 0x0A0000-0x0BFFFF  | 128 KB  | VGA aperture                    |
//! | 0x0C0000-0x0FFFFF  | 256 KB  | Option ROMs, system BIOS at top |
//! | 0x100000-0xFFFFFF  | 15 MB   | Extended RAM                    |
//!
//! ## Devices
//!
//! | Ports                     | IRQ | DMA | Device          |
//! |:--------------------------|:----|:----|:----------------|
//! | 0x1F0-0x1F7, 0x3F6        | 14  |     | ATA             |
//! | 0x3F0-0x3F5, 0x3F7        | 6   | 2   | Floppy          |
//! | 0x3B0-0x3BF, 0x3C0-0x3DF  |     |     | VGA             |
//! | 0x201                     |     |     | Game port       |
//! | 0x510-0x511               |     |     | QEMU fw_cfg     |
//!
//! ## Clocks
//!
//! All device timing is in system ticks of the 14.31818 MHz crystal. The
//! CPU runs at a third of that, peripherals at a sixth and the PIT at a
//! twelfth.

use crate::ata::AtaController;
use crate::debugger::Debuggable;
use crate::disk::{DiskChannel, DiskError};
use crate::floppy::{FloppyController, FLOPPY_DMA_CHANNEL};
use crate::game_port::GamePort;
use crate::interrupts::InterruptRouter;
use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice, NO_DEVICE};
use crate::memory::byte_utils;
use crate::memory::{AddressSpace, DirtyBitmap, MemoryRequestHook, MAX_ADDRESS, OPEN_BUS};
use crate::qemu_config::QemuConfig;
use crate::vga::constants::{APERTURE_BASE, APERTURE_END};
use crate::vga::VgaCard;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SYSTEM_CLOCK: u32 = 14_318_180;
pub const CPU_CLOCK_DIV: u32 = 3;
pub const PERIPHERAL_CLOCK_DIV: u32 = 6;
pub const PIT_CLOCK_DIV: u32 = 12;

pub const CONVENTIONAL_MEMORY_END: u32 = 0xA0000;
pub const EXTENDED_MEMORY_BASE: u32 = 0x100000;

/// Number of DMA channels on the two cascaded 8237s.
pub const NUM_DMA_CHANNELS: usize = 8;

/// Longest slice, in CPU cycles, the CPU runs without the machine polling
/// disk completions.
const MAX_RUN_CHUNK: u32 = 4096;

/// CPU clock in Hz.
pub const fn cpu_clock_speed() -> u32 {
    SYSTEM_CLOCK / CPU_CLOCK_DIV
}

/// Display adapter reported to the BIOS through the equipment word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphicsConfig {
    Mda,
    #[default]
    Cga80,
    Cga40,
    Other,
}

impl GraphicsConfig {
    /// Initial video mode bits (equipment word bits 4-5).
    pub fn equipment_bits(self) -> u16 {
        match self {
            GraphicsConfig::Other => 0b00,
            GraphicsConfig::Cga40 => 0b01,
            GraphicsConfig::Cga80 => 0b10,
            GraphicsConfig::Mda => 0b11,
        }
    }
}

/// The machine as seen by the CPU.
pub trait SystemBus {
    fn read_byte(&mut self, address: u32) -> u8;
    fn write_byte(&mut self, address: u32, value: u8);

    fn read_word(&mut self, address: u32) -> u16 {
        let low = self.read_byte(address);
        let high = self.read_byte(address.wrapping_add(1));
        byte_utils::join_u16(low, high)
    }

    fn write_word(&mut self, address: u32, value: u16) {
        let (low, high) = byte_utils::split_u16(value);
        self.write_byte(address, low);
        self.write_byte(address.wrapping_add(1), high);
    }

    fn read_port(&mut self, port: u16) -> u8;
    fn write_port(&mut self, port: u16, value: u8);
    fn read_port16(&mut self, port: u16) -> u16;
    fn write_port16(&mut self, port: u16, value: u16);

    /// Pending IRQ lines, bit n = IRQ n.
    fn pending_interrupts(&self) -> u16;

    /// Take the highest priority pending line.
    fn acknowledge_interrupt(&mut self) -> Option<u8>;

    /// Account for `cycles` CPU cycles of execution.
    fn add_cpu_cycles(&mut self, cycles: u32);

    fn dma_read(&mut self, channel: u8) -> u8;
    fn dma_write(&mut self, channel: u8, value: u8);
    fn dma_complete(&mut self, channel: u8);
}

/// An instruction engine.
pub trait Cpu {
    /// Execute about `cycles` CPU cycles, reporting progress through
    /// [`SystemBus::add_cpu_cycles`].
    fn run(&mut self, bus: &mut dyn SystemBus, cycles: u32);
}

pub struct Machine {
    memory: AddressSpace,
    io: IoBus,
    interrupts: InterruptRouter,
    cycle_count: u64,
    graphics_config: GraphicsConfig,
    ata: DeviceId,
    floppy: DeviceId,
    vga: DeviceId,
    game_port: DeviceId,
    qemu_config: DeviceId,
    dma_channels: [Option<DeviceId>; NUM_DMA_CHANNELS],
    frame: Vec<u32>,
}

impl Machine {
    /// Build a machine with `ram_size` bytes of RAM and every device
    /// attached. Fails only if a disk worker cannot be started.
    pub fn new(ram_size: usize) -> Result<Self, DiskError> {
        let mut memory = AddressSpace::new();
        let conventional = ram_size.min(CONVENTIONAL_MEMORY_END as usize);
        memory.add_memory(0, vec![0; conventional]);
        let extended = (ram_size - conventional).min(MAX_ADDRESS - EXTENDED_MEMORY_BASE as usize);
        if extended > 0 {
            memory.add_memory(EXTENDED_MEMORY_BASE, vec![0; extended]);
        }
        info!(
            "Machine with {}KB conventional, {}KB extended RAM",
            conventional / 1024,
            extended / 1024
        );

        let mut io = IoBus::new();
        let ata = AtaController::new()?.attach_to(&mut io);
        let floppy = FloppyController::new()?.attach_to(&mut io);
        let vga = VgaCard::new().attach_to(&mut io);
        let game_port = GamePort::new().attach_to(&mut io);
        let qemu_config = QemuConfig::new().attach_to(&mut io);

        let mut dma_channels = [None; NUM_DMA_CHANNELS];
        dma_channels[FLOPPY_DMA_CHANNEL as usize] = Some(floppy);

        Ok(Self {
            memory,
            io,
            interrupts: InterruptRouter::new(),
            cycle_count: 0,
            graphics_config: GraphicsConfig::default(),
            ata,
            floppy,
            vga,
            game_port,
            qemu_config,
            dma_channels,
            frame: Vec::new(),
        })
    }

    /// Reset every device. Memory contents and the tick counter survive.
    pub fn reset(&mut self) {
        debug!("Machine reset");
        self.interrupts.reset();
        if let Some(ata) = self.io.get_mut::<AtaController>(self.ata) {
            ata.reset();
        }
        if let Some(fdc) = self.io.get_mut::<FloppyController>(self.floppy) {
            fdc.reset();
        }
        if let Some(vga) = self.io.get_mut::<VgaCard>(self.vga) {
            vga.reset();
        }
    }

    // === Memory ===

    /// Map a system BIOS image so that it ends at the top of the first
    /// megabyte.
    pub fn load_bios(&mut self, image: Arc<[u8]>) {
        let len = image.len().min(EXTENDED_MEMORY_BASE as usize);
        let base = EXTENDED_MEMORY_BASE - len as u32;
        info!("BIOS mapped at {:05X}, {} bytes", base, len);
        self.memory.add_read_only_memory(base, image);
    }

    /// Map an option ROM at `base` (0xC0000 for a VGA BIOS).
    pub fn load_option_rom(&mut self, base: u32, image: Arc<[u8]>) {
        info!("Option ROM mapped at {:05X}, {} bytes", base, image.len());
        self.memory.add_read_only_memory(base, image);
    }

    /// Offer a VGA BIOS to firmware through fw_cfg.
    pub fn set_vga_bios(&mut self, image: Arc<[u8]>) {
        if let Some(cfg) = self.io.get_mut::<QemuConfig>(self.qemu_config) {
            cfg.set_vga_bios(image);
        }
    }

    pub fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.memory
    }

    pub fn map_address(&self, address: u32) -> Option<&[u8]> {
        self.memory.map_address(address)
    }

    pub fn set_memory_request_hook(&mut self, hook: Option<MemoryRequestHook>) {
        self.memory.set_memory_request_hook(hook);
    }

    pub fn dirty_bitmap(&self) -> &DirtyBitmap {
        self.memory.dirty_bitmap()
    }

    fn in_aperture(address: u32) -> bool {
        (APERTURE_BASE..APERTURE_END).contains(&address)
    }

    pub fn read_byte(&mut self, address: u32) -> u8 {
        let address = address & (MAX_ADDRESS as u32 - 1);
        if Self::in_aperture(address) {
            return self
                .io
                .get_mut::<VgaCard>(self.vga)
                .map_or(OPEN_BUS, |vga| vga.read_mem(address));
        }
        self.memory.read_byte(address)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        let address = address & (MAX_ADDRESS as u32 - 1);
        if Self::in_aperture(address) {
            if let Some(vga) = self.io.get_mut::<VgaCard>(self.vga) {
                vga.write_mem(address, value);
            }
            return;
        }
        self.memory.write_byte(address, value);
    }

    // === Ports and interrupts ===

    pub fn read_port(&mut self, port: u16) -> u8 {
        let mut ctx = DeviceContext::new(self.cycle_count);
        let value = self.io.read_port(port, &mut ctx);
        self.interrupts.apply(&mut ctx, &mut self.io);
        value
    }

    pub fn write_port(&mut self, port: u16, value: u8) {
        let mut ctx = DeviceContext::new(self.cycle_count);
        self.io.write_port(port, value, &mut ctx);
        self.interrupts.apply(&mut ctx, &mut self.io);
    }

    pub fn read_port16(&mut self, port: u16) -> u16 {
        let mut ctx = DeviceContext::new(self.cycle_count);
        let value = self.io.read_port16(port, &mut ctx);
        self.interrupts.apply(&mut ctx, &mut self.io);
        value
    }

    pub fn write_port16(&mut self, port: u16, value: u16) {
        let mut ctx = DeviceContext::new(self.cycle_count);
        self.io.write_port16(port, value, &mut ctx);
        self.interrupts.apply(&mut ctx, &mut self.io);
    }

    pub fn io_bus(&self) -> &IoBus {
        &self.io
    }

    pub fn interrupts(&self) -> &InterruptRouter {
        &self.interrupts
    }

    /// Assert an IRQ line from outside the bus (PIT, keyboard glue).
    pub fn flag_interrupt(&mut self, line: u8) {
        self.interrupts
            .flag_interrupt(line, &mut self.io, self.cycle_count);
    }

    pub fn clear_interrupt(&mut self, line: u8) {
        self.interrupts.clear_interrupt(line);
    }

    // === DMA ===

    fn with_dma_device<R>(
        &mut self,
        channel: u8,
        default: R,
        f: impl FnOnce(&mut (dyn IoDevice + 'static), &mut DeviceContext) -> R,
    ) -> R {
        let Some(id) = self.dma_channels.get(channel as usize).copied().flatten() else {
            return default;
        };
        let mut ctx = DeviceContext::new(self.cycle_count);
        let result = match self.io.device_mut(id) {
            Some(dev) => f(dev, &mut ctx),
            None => default,
        };
        self.interrupts.apply(&mut ctx, &mut self.io);
        result
    }

    pub fn dma_read(&mut self, channel: u8) -> u8 {
        self.with_dma_device(channel, NO_DEVICE, |dev, ctx| dev.dma_read(channel, ctx))
    }

    pub fn dma_write(&mut self, channel: u8, value: u8) {
        self.with_dma_device(channel, (), |dev, ctx| dev.dma_write(channel, value, ctx));
    }

    pub fn dma_complete(&mut self, channel: u8) {
        self.with_dma_device(channel, (), |dev, ctx| dev.dma_complete(channel, ctx));
    }

    // === Clock and run loop ===

    /// System ticks since power on.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn add_cpu_cycles(&mut self, cycles: u32) {
        self.cycle_count += u64::from(cycles) * u64::from(CPU_CLOCK_DIV);
    }

    pub fn graphics_config(&self) -> GraphicsConfig {
        self.graphics_config
    }

    pub fn set_graphics_config(&mut self, config: GraphicsConfig) {
        self.graphics_config = config;
    }

    /// Run the CPU for `cycles` CPU cycles.
    ///
    /// Execution is sliced so that no slice runs past the next scheduled
    /// device event. Between slices the machine lets due devices update
    /// and collects finished disk transfers. Repainting is left to the
    /// host: call [`Machine::render_frame`] once per displayed frame.
    pub fn run(&mut self, cpu: &mut dyn Cpu, cycles: u32) {
        let end = self.cycle_count + u64::from(cycles) * u64::from(CPU_CLOCK_DIV);

        while self.cycle_count < end {
            self.poll_devices();
            let target = self
                .interrupts
                .scheduled_cycle()
                .map_or(end, |due| due.min(end));
            let chunk = target
                .saturating_sub(self.cycle_count)
                .div_ceil(u64::from(CPU_CLOCK_DIV))
                .clamp(1, u64::from(MAX_RUN_CHUNK)) as u32;

            let before = self.cycle_count;
            cpu.run(self, chunk);
            if self.cycle_count == before {
                // Halted: time still passes
                self.add_cpu_cycles(chunk);
            }
            self.service_disk_io();
        }
        self.poll_devices();
    }

    /// Update devices whose scheduled event is due, then reschedule.
    fn poll_devices(&mut self) {
        if self
            .interrupts
            .scheduled_cycle()
            .is_some_and(|due| due <= self.cycle_count)
        {
            self.interrupts
                .update_for_interrupts(0xFFFF, &mut self.io, self.cycle_count);
        }
        self.interrupts
            .next_interrupt_cycle(&self.io, self.cycle_count);
    }

    /// Collect any finished storage operations on both channels.
    pub fn service_disk_io(&mut self) {
        let mut ctx = DeviceContext::new(self.cycle_count);
        if let Some(ata) = self.io.get_mut::<AtaController>(self.ata) {
            ata.service_io(&mut ctx);
        }
        if let Some(fdc) = self.io.get_mut::<FloppyController>(self.floppy) {
            fdc.service_io(&mut ctx);
        }
        self.interrupts.apply(&mut ctx, &mut self.io);
    }

    /// Block until outstanding storage operations on both channels have
    /// been collected. Returns true if any were.
    pub fn wait_for_disk_io(&mut self) -> bool {
        let mut ctx = DeviceContext::new(self.cycle_count);
        let mut completed = false;
        if let Some(ata) = self.io.get_mut::<AtaController>(self.ata) {
            while ata.wait_for_io(&mut ctx) {
                completed = true;
            }
        }
        if let Some(fdc) = self.io.get_mut::<FloppyController>(self.floppy) {
            while fdc.wait_for_io(&mut ctx) {
                completed = true;
            }
        }
        self.interrupts.apply(&mut ctx, &mut self.io);
        completed
    }

    // === Display ===

    /// Repaint the frame buffer from VGA state. Returns its dimensions.
    pub fn render_frame(&mut self) -> (usize, usize) {
        match self.io.get::<VgaCard>(self.vga) {
            Some(vga) => vga.render_frame(&mut self.frame),
            None => (0, 0),
        }
    }

    /// Pixels from the last `render_frame`, 0xAABBGGRR.
    pub fn frame_buffer(&self) -> &[u32] {
        &self.frame
    }

    // === Devices ===

    pub fn ata(&self) -> Option<&AtaController> {
        self.io.get(self.ata)
    }

    pub fn ata_mut(&mut self) -> Result<&mut AtaController, DiskError> {
        self.io
            .get_mut(self.ata)
            .ok_or(DiskError::NoController { channel: DiskChannel::Ata })
    }

    pub fn floppy(&self) -> Option<&FloppyController> {
        self.io.get(self.floppy)
    }

    pub fn floppy_mut(&mut self) -> Result<&mut FloppyController, DiskError> {
        self.io
            .get_mut(self.floppy)
            .ok_or(DiskError::NoController { channel: DiskChannel::Floppy })
    }

    pub fn vga(&self) -> Option<&VgaCard> {
        self.io.get(self.vga)
    }

    pub fn vga_mut(&mut self) -> Option<&mut VgaCard> {
        self.io.get_mut(self.vga)
    }

    pub fn game_port_mut(&mut self) -> Option<&mut GamePort> {
        self.io.get_mut(self.game_port)
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if let Some(port) = self.game_port_mut() {
            port.set_button(index, pressed);
        }
    }

    pub fn set_axis(&mut self, index: usize, value: f32) {
        if let Some(port) = self.game_port_mut() {
            port.set_axis(index, value);
        }
    }
}

impl SystemBus for Machine {
    #[inline(always)]
    fn read_byte(&mut self, address: u32) -> u8 {
        self.read_byte(address)
    }
    #[inline(always)]
    fn write_byte(&mut self, address: u32, value: u8) {
        self.write_byte(address, value)
    }
    #[inline(always)]
    fn read_port(&mut self, port: u16) -> u8 {
        self.read_port(port)
    }
    #[inline(always)]
    fn write_port(&mut self, port: u16, value: u8) {
        self.write_port(port, value)
    }
    #[inline(always)]
    fn read_port16(&mut self, port: u16) -> u16 {
        self.read_port16(port)
    }
    #[inline(always)]
    fn write_port16(&mut self, port: u16, value: u16) {
        self.write_port16(port, value)
    }
    fn pending_interrupts(&self) -> u16 {
        self.interrupts.pending()
    }
    fn acknowledge_interrupt(&mut self) -> Option<u8> {
        self.interrupts.acknowledge()
    }
    #[inline(always)]
    fn add_cpu_cycles(&mut self, cycles: u32) {
        self.add_cpu_cycles(cycles)
    }
    fn dma_read(&mut self, channel: u8) -> u8 {
        self.dma_read(channel)
    }
    fn dma_write(&mut self, channel: u8, value: u8) {
        self.dma_write(channel, value)
    }
    fn dma_complete(&mut self, channel: u8) {
        self.dma_complete(channel)
    }
}

impl Debuggable for Machine {
    fn read_state(&self) -> Value {
        json!({
            "cycle_count": self.cycle_count,
            "graphics_config": self.graphics_config,
            "pending_irqs": self.interrupts.pending(),
            "ata": self.ata().map_or(Value::Null, |d| d.read_state()),
            "floppy": self.floppy().map_or(Value::Null, |d| d.read_state()),
            "vga": self.vga().map_or(Value::Null, |d| d.read_state()),
        })
    }

    fn write_state(&mut self, state: &Value) {
        if let Some(config) = state.get("graphics_config") {
            match serde_json::from_value::<GraphicsConfig>(config.clone()) {
                Ok(config) => self.graphics_config = config,
                Err(e) => warn!("Error deserializing graphics config: {}", e),
            }
        }
        if let Some(ata_state) = state.get("ata") {
            if let Ok(ata) = self.ata_mut() {
                ata.write_state(ata_state);
            }
        }
        if let Some(fdc_state) = state.get("floppy") {
            if let Ok(fdc) = self.floppy_mut() {
                fdc.write_state(fdc_state);
            }
        }
        if let Some(vga_state) = state.get("vga") {
            if let Some(vga) = self.vga_mut() {
                vga.write_state(vga_state);
            }
        }
    }
}

#[cfg(test)]
mod tests_machine;
