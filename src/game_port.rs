//! Analog Game Port (0x201)
//!
//! Writing the port fires the four axis one-shots. Each axis bit reads 1
//! until its timeout, `24 + 1100 * position` microseconds, has elapsed.
//! Buttons are active low in bits 4-7.

use crate::io::{DeviceContext, DeviceId, IoBus, IoDevice};
use std::any::Any;

pub const GAME_PORT: u16 = 0x201;

/// System ticks per microsecond, rounded.
const TICKS_PER_US: f32 = 14.0;

pub struct GamePort {
    timer_start: u64,
    buttons: u8,
    axes: [f32; 4],
}

impl Default for GamePort {
    fn default() -> Self {
        Self::new()
    }
}

impl GamePort {
    pub fn new() -> Self {
        Self {
            timer_start: 0,
            buttons: 0,
            axes: [0.5; 4],
        }
    }

    pub fn attach_to(self, bus: &mut IoBus) -> DeviceId {
        bus.add_device(0x3FF, GAME_PORT, 0, Box::new(self))
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if index >= 4 {
            return;
        }
        if pressed {
            self.buttons |= 1 << index;
        } else {
            self.buttons &= !(1 << index);
        }
    }

    /// Set an axis from a normalised position, 0.0 to 1.0.
    pub fn set_axis(&mut self, index: usize, value: f32) {
        if let Some(axis) = self.axes.get_mut(index) {
            *axis = value.clamp(0.0, 1.0);
        }
    }

    fn axis_ticks(&self, index: usize) -> u64 {
        ((24.0 + self.axes[index] * 1100.0) * TICKS_PER_US) as u64
    }
}

impl IoDevice for GamePort {
    fn read(&mut self, _port: u16, ctx: &mut DeviceContext) -> u8 {
        let elapsed = ctx.cycle_count.saturating_sub(self.timer_start);
        (0..4)
            .filter(|&i| elapsed < self.axis_ticks(i))
            .fold(!self.buttons << 4, |value, i| value | (1 << i))
    }

    fn write(&mut self, _port: u16, _data: u8, ctx: &mut DeviceContext) {
        self.timer_start = ctx.cycle_count;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
