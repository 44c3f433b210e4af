//! PC Port I/O Bus
//!
//! This module implements port-mapped I/O dispatch. Devices register one or
//! more port ranges described by a mask/value pair; an access to `port` is
//! routed to the first range for which `(port & mask) == value`.
//!
//! ## Standard Port Ranges
//!
//! | Ports        | Mask   | Device                          |
//! |:-------------|:-------|:--------------------------------|
//! | 0x1F0-0x1F7  | 0x3F8  | ATA primary task file           |
//! | 0x201        | 0x3FF  | Game port                       |
//! | 0x3B0-0x3BF  | 0x3F0  | VGA (mono CRTC, input status)   |
//! | 0x3C0-0x3DF  | 0x3E0  | VGA (attribute ... colour CRTC) |
//! | 0x3F0-0x3F5  | 0x3FC+ | Floppy controller               |
//! | 0x3F6        | 0x3FF  | ATA alternate status / control  |
//! | 0x3F7        | 0x3FF  | Floppy DIR / CCR                |
//! | 0x510-0x511  | 0xFFFE | QEMU fw_cfg                     |
//!
//! Legacy ISA devices decode only ten address bits, so their masks are
//! 0x3xx and the ranges alias every 1KB.

use crate::memory::byte_utils;
use log::trace;
use std::any::Any;

/// Value read from a port with no device behind it.
pub const NO_DEVICE: u8 = 0xFF;

/// Per-access context handed to devices.
///
/// Devices never call back into the machine; instead they note interrupt
/// line changes here and the machine applies them once the access returns.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    /// Current system clock tick count.
    pub cycle_count: u64,
    raised: u16,
    lowered: u16,
}

impl DeviceContext {
    pub fn new(cycle_count: u64) -> Self {
        Self {
            cycle_count,
            raised: 0,
            lowered: 0,
        }
    }

    /// Ask for an interrupt on `line`.
    pub fn raise_irq(&mut self, line: u8) {
        let bit = 1u16 << (line & 0xF);
        self.raised |= bit;
        self.lowered &= !bit;
    }

    /// Drop a previously raised request on `line`.
    pub fn lower_irq(&mut self, line: u8) {
        let bit = 1u16 << (line & 0xF);
        self.lowered |= bit;
        self.raised &= !bit;
    }

    pub fn raised(&self) -> u16 {
        self.raised
    }

    pub fn lowered(&self) -> u16 {
        self.lowered
    }

    /// Take the pending line changes, leaving the context clean.
    pub fn take_irq_changes(&mut self) -> (u16, u16) {
        let changes = (self.raised, self.lowered);
        self.raised = 0;
        self.lowered = 0;
        changes
    }
}

/// A device on the port bus.
///
/// Only the byte accessors are required. Everything else has a no-op or
/// sentinel default so devices implement only what they use.
pub trait IoDevice: Any {
    fn read(&mut self, port: u16, ctx: &mut DeviceContext) -> u8;
    fn write(&mut self, port: u16, data: u8, ctx: &mut DeviceContext);

    fn read16(&mut self, port: u16, ctx: &mut DeviceContext) -> u16 {
        let low = self.read(port, ctx);
        let high = self.read(port.wrapping_add(1), ctx);
        byte_utils::join_u16(low, high)
    }

    fn write16(&mut self, port: u16, data: u16, ctx: &mut DeviceContext) {
        let (low, high) = byte_utils::split_u16(data);
        self.write(port, low, ctx);
        self.write(port.wrapping_add(1), high, ctx);
    }

    /// Called when any interrupt line in `mask` may need servicing, or when
    /// the scheduled interrupt cycle has been reached.
    fn update_for_interrupts(&mut self, _mask: u16, _ctx: &mut DeviceContext) {}

    /// System ticks until this device next wants `update_for_interrupts`,
    /// or 0 if nothing is scheduled.
    fn cycles_to_next_interrupt(&self, _cycle_count: u64) -> u32 {
        0
    }

    // These are reversed from the DMA controller's perspective: `dma_read`
    // is the controller reading from the device.
    fn dma_read(&mut self, _channel: u8, _ctx: &mut DeviceContext) -> u8 {
        NO_DEVICE
    }
    fn dma_write(&mut self, _channel: u8, _data: u8, _ctx: &mut DeviceContext) {}
    fn dma_complete(&mut self, _channel: u8, _ctx: &mut DeviceContext) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Handle to a device registered on an [`IoBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

#[derive(Debug, Clone, Copy)]
struct IoRegion {
    mask: u16,
    value: u16,
    irq_mask: u16,
    device: DeviceId,
}

/// Port dispatch table.
#[derive(Default)]
pub struct IoBus {
    devices: Vec<Option<Box<dyn IoDevice>>>,
    regions: Vec<IoRegion>,
}

impl IoBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device for the ports matching `mask`/`value`.
    ///
    /// `irq_mask` holds the interrupt lines the device may assert; it is
    /// used to select which devices see `update_for_interrupts`.
    pub fn add_device(
        &mut self,
        mask: u16,
        value: u16,
        irq_mask: u16,
        device: Box<dyn IoDevice>,
    ) -> DeviceId {
        let id = DeviceId(self.devices.len());
        self.devices.push(Some(device));
        self.add_region(id, mask, value, irq_mask);
        id
    }

    /// Register an extra port range for an existing device.
    pub fn add_region(&mut self, device: DeviceId, mask: u16, value: u16, irq_mask: u16) {
        self.regions.push(IoRegion {
            mask,
            value: value & mask,
            irq_mask,
            device,
        });
    }

    /// Unregister a device and all of its ranges, handing it back.
    pub fn remove_device(&mut self, device: DeviceId) -> Option<Box<dyn IoDevice>> {
        self.regions.retain(|r| r.device != device);
        self.devices.get_mut(device.0).and_then(Option::take)
    }

    /// Find the device that handles `port`.
    pub fn resolve(&self, port: u16) -> Option<DeviceId> {
        self.regions
            .iter()
            .find(|r| (port & r.mask) == r.value)
            .map(|r| r.device)
    }

    /// Interrupt lines registered for a device (union of its ranges).
    pub fn irq_mask(&self, device: DeviceId) -> u16 {
        self.regions
            .iter()
            .filter(|r| r.device == device)
            .fold(0, |mask, r| mask | r.irq_mask)
    }

    pub fn device(&self, device: DeviceId) -> Option<&dyn IoDevice> {
        self.devices.get(device.0)?.as_deref()
    }

    pub fn device_mut(&mut self, device: DeviceId) -> Option<&mut (dyn IoDevice + 'static)> {
        self.devices.get_mut(device.0)?.as_deref_mut()
    }

    /// Typed access to a registered device.
    pub fn get<T: IoDevice>(&self, device: DeviceId) -> Option<&T> {
        self.device(device)?.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access to a registered device.
    pub fn get_mut<T: IoDevice>(&mut self, device: DeviceId) -> Option<&mut T> {
        self.device_mut(device)?.as_any_mut().downcast_mut::<T>()
    }

    /// Ids of all registered devices.
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(i, _)| DeviceId(i))
    }

    pub fn read_port(&mut self, port: u16, ctx: &mut DeviceContext) -> u8 {
        match self.resolve(port).and_then(|id| self.device_mut(id)) {
            Some(dev) => dev.read(port, ctx),
            None => {
                trace!("Unhandled port read {:04X}", port);
                NO_DEVICE
            }
        }
    }

    pub fn write_port(&mut self, port: u16, data: u8, ctx: &mut DeviceContext) {
        match self.resolve(port).and_then(|id| self.device_mut(id)) {
            Some(dev) => dev.write(port, data, ctx),
            None => trace!("Unhandled port write {:04X} = {:02X}", port, data),
        }
    }

    /// Word read; both bytes go to the device that owns `port`.
    pub fn read_port16(&mut self, port: u16, ctx: &mut DeviceContext) -> u16 {
        match self.resolve(port).and_then(|id| self.device_mut(id)) {
            Some(dev) => dev.read16(port, ctx),
            None => {
                trace!("Unhandled port read16 {:04X}", port);
                byte_utils::join_u16(NO_DEVICE, NO_DEVICE)
            }
        }
    }

    pub fn write_port16(&mut self, port: u16, data: u16, ctx: &mut DeviceContext) {
        match self.resolve(port).and_then(|id| self.device_mut(id)) {
            Some(dev) => dev.write16(port, data, ctx),
            None => trace!("Unhandled port write16 {:04X} = {:04X}", port, data),
        }
    }

    /// Call `update_for_interrupts` on every device registered for a line
    /// in `mask`. Each device is visited once.
    pub fn update_for_interrupts(&mut self, mask: u16, ctx: &mut DeviceContext) {
        let mut visited: Vec<DeviceId> = Vec::new();
        for region in &self.regions {
            if region.irq_mask & mask == 0 || visited.contains(&region.device) {
                continue;
            }
            visited.push(region.device);
        }

        for id in visited {
            if let Some(dev) = self.device_mut(id) {
                dev.update_for_interrupts(mask, ctx);
            }
        }
    }

    /// Smallest non-zero `cycles_to_next_interrupt` over all devices.
    pub fn cycles_to_next_interrupt(&self, cycle_count: u64) -> Option<u32> {
        self.devices
            .iter()
            .flatten()
            .map(|d| d.cycles_to_next_interrupt(cycle_count))
            .filter(|&c| c != 0)
            .min()
    }
}


#[cfg(test)]
mod tests_bus;
