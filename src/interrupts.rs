//! Interrupt routing
//!
//! Aggregates the interrupt request lines asserted by devices into a single
//! pending mask for the CPU side, and schedules the next cycle at which some
//! device wants to be polled.

use crate::io::{DeviceContext, IoBus};
use log::trace;

/// Number of ISA interrupt lines (two cascaded PICs).
pub const NUM_IRQ_LINES: u8 = 16;

/// Upper bound on re-broadcast rounds when devices raise lines from inside
/// `update_for_interrupts`.
const MAX_UPDATE_ROUNDS: usize = NUM_IRQ_LINES as usize;

#[derive(Debug, Default)]
pub struct InterruptRouter {
    pending: u16,
    next_interrupt_cycle: Option<u64>,
}

impl InterruptRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.pending = 0;
        self.next_interrupt_cycle = None;
    }

    /// Pending line mask, bit n = IRQ n.
    pub fn pending(&self) -> u16 {
        self.pending
    }

    pub fn is_pending(&self, line: u8) -> bool {
        self.pending & (1 << (line & 0xF)) != 0
    }

    /// Assert `line` and let every device registered for it react.
    pub fn flag_interrupt(&mut self, line: u8, bus: &mut IoBus, cycle_count: u64) {
        self.broadcast(1 << (line & 0xF), bus, cycle_count);
    }

    /// Deassert `line` (device acknowledged or withdrew its request).
    pub fn clear_interrupt(&mut self, line: u8) {
        self.pending &= !(1 << (line & 0xF));
    }

    /// Lowest pending line, cleared as the CPU takes it.
    pub fn acknowledge(&mut self) -> Option<u8> {
        if self.pending == 0 {
            return None;
        }
        let line = self.pending.trailing_zeros() as u8;
        self.pending &= !(1 << line);
        Some(line)
    }

    /// Apply the line changes a device made during a bus access.
    pub fn apply(&mut self, ctx: &mut DeviceContext, bus: &mut IoBus) {
        let (raised, lowered) = ctx.take_irq_changes();
        self.pending &= !lowered;
        if raised != 0 {
            self.broadcast(raised, bus, ctx.cycle_count);
        }
    }

    /// Let devices registered for any line in `mask` update their state.
    /// Lines they raise are latched and broadcast in turn.
    pub fn update_for_interrupts(&mut self, mask: u16, bus: &mut IoBus, cycle_count: u64) {
        let mut ctx = DeviceContext::new(cycle_count);
        bus.update_for_interrupts(mask, &mut ctx);
        let (raised, lowered) = ctx.take_irq_changes();
        self.pending &= !lowered;
        if raised != 0 {
            self.broadcast(raised, bus, cycle_count);
        }
    }

    fn broadcast(&mut self, mut lines: u16, bus: &mut IoBus, cycle_count: u64) {
        let mut notified = 0u16;

        for _ in 0..MAX_UPDATE_ROUNDS {
            lines &= !notified;
            if lines == 0 {
                return;
            }
            trace!("IRQ lines {:04X} flagged", lines);
            self.pending |= lines;
            notified |= lines;

            let mut ctx = DeviceContext::new(cycle_count);
            bus.update_for_interrupts(lines, &mut ctx);
            let (raised, lowered) = ctx.take_irq_changes();
            self.pending &= !lowered;
            lines = raised;
        }
    }

    /// Recompute and return the absolute cycle of the next scheduled device
    /// interrupt, or `None` if no device has anything scheduled.
    pub fn next_interrupt_cycle(&mut self, bus: &IoBus, cycle_count: u64) -> Option<u64> {
        self.next_interrupt_cycle = bus
            .cycles_to_next_interrupt(cycle_count)
            .map(|delta| cycle_count + delta as u64);
        self.next_interrupt_cycle
    }

    /// Last value computed by `next_interrupt_cycle`.
    pub fn scheduled_cycle(&self) -> Option<u64> {
        self.next_interrupt_cycle
    }
}
