//! Write pipeline and planar memory tests.

use super::pipeline::{colour_compare, write, WriteRegisters};
use super::*;
use proptest::prelude::*;

fn planar_card() -> VgaCard {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();
    // Sequential planar addressing at 0xA0000
    vga.write(PORT_SEQ_INDEX, SEQ_MEMORY_MODE as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, MEM_ODD_EVEN_DISABLE, &mut ctx);
    vga.write(PORT_GC_INDEX, GC_MISC as u8, &mut ctx);
    vga.write(PORT_GC_DATA, 0x05, &mut ctx);
    vga
}

fn set_gc(vga: &mut VgaCard, index: usize, value: u8) {
    let mut ctx = DeviceContext::default();
    vga.write(PORT_GC_INDEX, index as u8, &mut ctx);
    vga.write(PORT_GC_DATA, value, &mut ctx);
}

fn set_map_mask(vga: &mut VgaCard, value: u8) {
    let mut ctx = DeviceContext::default();
    vga.write(PORT_SEQ_INDEX, SEQ_MAP_MASK as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, value, &mut ctx);
}

#[test]
fn test_write_mode0_replaces_enabled_planes() {
    let regs = WriteRegisters {
        map_mask: 0b0101,
        ..Default::default()
    };
    let out = write(&regs, [0x11, 0x22, 0x33, 0x44], 0xA5);
    assert_eq!(out.stored, [Some(0xA5), None, Some(0xA5), None]);
    assert_eq!(out.latch, [0xA5, 0x22, 0xA5, 0x44]);
}

#[test]
fn test_set_reset_overrides_cpu_byte() {
    let regs = WriteRegisters {
        set_reset: 0b0011,
        enable_set_reset: 0b0111,
        ..Default::default()
    };
    let out = write(&regs, [0x5A; 4], 0x0F);
    assert_eq!(
        out.stored,
        [Some(0xFF), Some(0xFF), Some(0x00), Some(0x0F)]
    );
}

#[test]
fn test_logical_functions_against_latch() {
    let latch = [0xF0; 4];
    let cases = [(0u8, 0x3C), (1, 0x30), (2, 0xFC), (3, 0xCC)];
    for (function, expected) in cases {
        let regs = WriteRegisters {
            data_rotate: function << 3,
            map_mask: 1,
            ..Default::default()
        };
        assert_eq!(write(&regs, latch, 0x3C).stored[0], Some(expected));
    }
}

#[test]
fn test_rotate_then_bit_mask() {
    let regs = WriteRegisters {
        data_rotate: 4,
        bit_mask: 0x0F,
        map_mask: 1,
        ..Default::default()
    };
    // 0x12 rotated right by 4 is 0x21; only the low nibble comes from it
    let out = write(&regs, [0xC0, 0, 0, 0], 0x12);
    assert_eq!(out.stored[0], Some(0xC1));
}

#[test]
fn test_write_mode1_copies_latch() {
    let regs = WriteRegisters {
        mode: 1,
        bit_mask: 0x00,
        ..Default::default()
    };
    let latch = [1, 2, 3, 4];
    let out = write(&regs, latch, 0xFF);
    assert_eq!(out.stored, [Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn test_write_mode2_expands_cpu_bits() {
    let regs = WriteRegisters {
        mode: 2,
        bit_mask: 0x81,
        ..Default::default()
    };
    let out = write(&regs, [0x00, 0x00, 0xFF, 0xFF], 0b0101);
    assert_eq!(
        out.stored,
        [Some(0x81), Some(0x00), Some(0xFF), Some(0x7E)]
    );
}

#[test]
fn test_write_mode3_masks_with_rotated_byte() {
    let regs = WriteRegisters {
        mode: 3,
        set_reset: 0b0001,
        bit_mask: 0xF0,
        map_mask: 0b0011,
        ..Default::default()
    };
    let out = write(&regs, [0x00, 0xFF, 0, 0], 0x3C);
    // Effective mask 0xF0 & 0x3C = 0x30
    assert_eq!(out.stored[0], Some(0x30));
    assert_eq!(out.stored[1], Some(0xCF));
}

#[test]
fn test_colour_compare() {
    let latch = [0xFF, 0x0F, 0x00, 0xAA];
    // Colour 0b0011: plane 0 set, plane 1 set, plane 2 clear
    assert_eq!(colour_compare(latch, 0b0011, 0b0111), 0x0F);
    // Nothing cared about: all match
    assert_eq!(colour_compare(latch, 0b0000, 0b0000), 0xFF);
}

#[test]
fn test_planar_write_goes_through_pipeline() {
    let mut vga = planar_card();
    set_gc(&mut vga, GC_ENABLE_SET_RESET, 0x0F);
    set_gc(&mut vga, GC_SET_RESET, 0b1010);

    vga.write_mem(0xA0010, 0x00);
    assert_eq!(
        [0, 1, 2, 3].map(|p| vga.plane(p)[0x10]),
        [0x00, 0xFF, 0x00, 0xFF]
    );
    assert_eq!(vga.latch(), [0x00, 0xFF, 0x00, 0xFF]);
}

#[test]
fn test_latched_copy_with_write_mode1() {
    let mut vga = planar_card();
    for plane in 0..4 {
        vga.write_plane(plane, 0x20, 0x10 + plane as u8);
    }

    vga.read_mem(0xA0020);
    set_gc(&mut vga, GC_MODE, 1);
    vga.write_mem(0xA0030, 0x00);
    assert_eq!(
        [0, 1, 2, 3].map(|p| vga.plane(p)[0x30]),
        [0x10, 0x11, 0x12, 0x13]
    );
}

#[test]
fn test_read_map_and_colour_compare_reads() {
    let mut vga = planar_card();
    vga.write_plane(0, 0x40, 0xF0);
    vga.write_plane(2, 0x40, 0x3C);

    set_gc(&mut vga, GC_READ_MAP, 2);
    assert_eq!(vga.read_mem(0xA0040), 0x3C);

    set_gc(&mut vga, GC_MODE, GC_MODE_READ1);
    set_gc(&mut vga, GC_COLOUR_COMPARE, 0b0101);
    set_gc(&mut vga, GC_COLOUR_DONT_CARE, 0b0101);
    assert_eq!(vga.read_mem(0xA0040), 0x30);
}

#[test]
fn test_map_mask_gates_planar_write() {
    let mut vga = planar_card();
    set_map_mask(&mut vga, 0b0100);
    vga.write_mem(0xA0000, 0x77);
    assert_eq!(
        [0, 1, 2, 3].map(|p| vga.plane(p)[0]),
        [0x00, 0x00, 0x77, 0x00]
    );
}

#[test]
fn test_odd_even_addressing() {
    let mut vga = VgaCard::new();
    set_gc(&mut vga, GC_MISC, 0x0E);
    set_map_mask(&mut vga, 0x03);

    vga.write_mem(0xB8000, b'A');
    vga.write_mem(0xB8001, 0x1F);
    assert_eq!(vga.plane(0)[0], b'A');
    assert_eq!(vga.plane(1)[0], 0x1F);
    assert_eq!(vga.read_mem(0xB8001), 0x1F);

    // Outside the B8000 window
    assert_eq!(vga.read_mem(0xA0000), OPEN_BUS);
    vga.write_mem(0xB0000, 0x55);
    assert_eq!(vga.plane(0)[0], b'A');
}

#[test]
fn test_chain4_addressing() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();
    vga.write(PORT_SEQ_INDEX, SEQ_MEMORY_MODE as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, MEM_CHAIN4 | MEM_ODD_EVEN_DISABLE, &mut ctx);
    set_gc(&mut vga, GC_MISC, 0x05);

    for i in 0..8u32 {
        vga.write_mem(0xA0000 + i, i as u8 + 1);
    }
    assert_eq!(vga.plane(0)[0], 1);
    assert_eq!(vga.plane(3)[0], 4);
    assert_eq!(vga.plane(1)[1], 6);
    assert_eq!(vga.read_mem(0xA0006), 7);
}

proptest! {
    // Planes with set/reset enabled latch the set/reset value whatever the
    // CPU writes
    #[test]
    fn prop_set_reset_drives_latch(
        set_reset in 0u8..16,
        enable in 0u8..16,
        data in any::<u8>(),
        latch in any::<[u8; 4]>(),
        function in 0u8..4,
    ) {
        let regs = WriteRegisters {
            set_reset,
            enable_set_reset: enable,
            data_rotate: function << 3,
            ..Default::default()
        };
        let out = write(&regs, latch, data);
        let other = write(&regs, latch, !data);

        for plane in 0..4 {
            if enable & (1 << plane) != 0 {
                prop_assert_eq!(out.latch[plane], other.latch[plane]);
                if function == 0 {
                    let expected = if set_reset & (1 << plane) != 0 { 0xFF } else { 0x00 };
                    prop_assert_eq!(out.latch[plane], expected);
                }
            }
        }
    }

    // Bits outside the bit mask always keep the latched value
    #[test]
    fn prop_bit_mask_preserves_latch(
        mode in 0u8..4,
        bit_mask in any::<u8>(),
        data in any::<u8>(),
        latch in any::<[u8; 4]>(),
        data_rotate in any::<u8>(),
    ) {
        let regs = WriteRegisters {
            mode,
            bit_mask,
            data_rotate,
            set_reset: 0x05,
            ..Default::default()
        };
        let out = write(&regs, latch, data);
        for plane in 0..4 {
            let stored = out.stored[plane].unwrap_or(latch[plane]);
            prop_assert_eq!(stored & !bit_mask, latch[plane] & !bit_mask);
        }
    }

    // Disabled planes are never stored and keep their latch
    #[test]
    fn prop_map_mask_gates_planes(
        map_mask in 0u8..16,
        mode in 0u8..4,
        data in any::<u8>(),
        latch in any::<[u8; 4]>(),
    ) {
        let regs = WriteRegisters { map_mask, mode, ..Default::default() };
        let out = write(&regs, latch, data);
        for plane in 0..4 {
            let enabled = map_mask & (1 << plane) != 0;
            prop_assert_eq!(out.stored[plane].is_some(), enabled);
            if !enabled {
                prop_assert_eq!(out.latch[plane], latch[plane]);
            }
        }
    }
}
