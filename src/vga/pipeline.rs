//! Planar read/write logic, kept free of port and memory state.
//!
//! A write combines the latch (already loaded from the addressed location),
//! the CPU byte and the graphics controller registers into one byte per
//! plane. Planes outside the sequencer map mask are left alone.

/// The registers a planar write depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRegisters {
    pub set_reset: u8,
    pub enable_set_reset: u8,
    /// Rotate count in bits 0-2, function select in bits 3-4
    pub data_rotate: u8,
    /// Graphics mode register; write mode in bits 0-1
    pub mode: u8,
    pub bit_mask: u8,
    pub map_mask: u8,
}

impl Default for WriteRegisters {
    fn default() -> Self {
        Self {
            set_reset: 0,
            enable_set_reset: 0,
            data_rotate: 0,
            mode: 0,
            bit_mask: 0xFF,
            map_mask: 0x0F,
        }
    }
}

impl WriteRegisters {
    pub fn write_mode(&self) -> u8 {
        self.mode & 0x03
    }

    fn rotate_count(&self) -> u32 {
        (self.data_rotate & 0x07) as u32
    }

    fn function(&self) -> u8 {
        (self.data_rotate >> 3) & 0x03
    }
}

/// Result of a planar write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarWrite {
    /// Latch after the write: stored values for written planes
    pub latch: [u8; 4],
    /// Byte to store per plane, `None` where the map mask disables the plane
    pub stored: [Option<u8>; 4],
}

fn expand_bit(value: u8, plane: usize) -> u8 {
    if value & (1 << plane) != 0 {
        0xFF
    } else {
        0x00
    }
}

fn apply_function(function: u8, data: u8, latch: u8) -> u8 {
    match function {
        1 => data & latch,
        2 => data | latch,
        3 => data ^ latch,
        _ => data,
    }
}

/// Run one CPU byte through the write pipeline.
///
/// | Mode | Per-plane data                          | Mask               |
/// |:-----|:----------------------------------------|:-------------------|
/// | 0    | rotated byte, or set/reset where enabled | bit mask           |
/// | 1    | latch (copy)                            | none               |
/// | 2    | CPU bit `plane` expanded to a byte      | bit mask           |
/// | 3    | set/reset expanded                      | bit mask & rotated |
pub fn write(regs: &WriteRegisters, latch: [u8; 4], data: u8) -> PlanarWrite {
    let rotated = data.rotate_right(regs.rotate_count());
    let mut out = PlanarWrite {
        latch,
        stored: [None; 4],
    };

    for plane in 0..4 {
        if regs.map_mask & (1 << plane) == 0 {
            continue;
        }

        let value = match regs.write_mode() {
            1 => latch[plane],
            mode => {
                let (source, mask) = match mode {
                    0 if regs.enable_set_reset & (1 << plane) != 0 => {
                        (expand_bit(regs.set_reset, plane), regs.bit_mask)
                    }
                    0 => (rotated, regs.bit_mask),
                    2 => (expand_bit(data, plane), regs.bit_mask),
                    _ => (expand_bit(regs.set_reset, plane), regs.bit_mask & rotated),
                };
                let combined = apply_function(regs.function(), source, latch[plane]);
                (combined & mask) | (latch[plane] & !mask)
            }
        };

        out.stored[plane] = Some(value);
        out.latch[plane] = value;
    }
    out
}

/// Read mode 1: a bit is set where every plane selected by `dont_care`
/// matches the corresponding bit of `compare`.
pub fn colour_compare(latch: [u8; 4], compare: u8, dont_care: u8) -> u8 {
    let mismatch = (0..4)
        .filter(|plane| dont_care & (1 << plane) != 0)
        .fold(0u8, |acc, plane| acc | (latch[plane] ^ expand_bit(compare, plane)));
    !mismatch
}
