use super::*;

#[test]
fn test_crtc_follows_misc_output_base() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_CRTC_INDEX_COLOUR, CRTC_OFFSET as u8, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, 0x28, &mut ctx);
    assert_eq!(vga.read(PORT_CRTC_DATA_COLOUR, &mut ctx), 0x28);
    assert_eq!(vga.read(PORT_CRTC_DATA_MONO, &mut ctx), NO_DEVICE);

    // Switch to mono addressing
    vga.write(PORT_MISC_WRITE, 0x00, &mut ctx);
    assert_eq!(vga.read(PORT_MISC_READ, &mut ctx), 0x00);
    assert_eq!(vga.read(PORT_CRTC_DATA_COLOUR, &mut ctx), NO_DEVICE);
    vga.write(PORT_CRTC_INDEX_MONO, CRTC_OFFSET as u8, &mut ctx);
    assert_eq!(vga.read(PORT_CRTC_DATA_MONO, &mut ctx), 0x28);
}

#[test]
fn test_crtc_write_protect() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_CRTC_INDEX_COLOUR, CRTC_HORIZ_DISPLAY_END as u8, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, 0x4F, &mut ctx);

    vga.write(PORT_CRTC_INDEX_COLOUR, CRTC_VRETRACE_END as u8, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, CRTC_PROTECT, &mut ctx);

    vga.write(PORT_CRTC_INDEX_COLOUR, CRTC_HORIZ_DISPLAY_END as u8, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, 0x27, &mut ctx);
    assert_eq!(vga.registers().crtc[CRTC_HORIZ_DISPLAY_END], 0x4F);

    // Registers past 7 stay writable
    vga.write(PORT_CRTC_INDEX_COLOUR, CRTC_OFFSET as u8, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, 0x14, &mut ctx);
    assert_eq!(vga.registers().crtc[CRTC_OFFSET], 0x14);

    // Out of range index is ignored
    vga.write(PORT_CRTC_INDEX_COLOUR, 0x40, &mut ctx);
    vga.write(PORT_CRTC_DATA_COLOUR, 0x99, &mut ctx);
    assert_eq!(vga.read(PORT_CRTC_DATA_COLOUR, &mut ctx), 0);
}

#[test]
fn test_attribute_flip_flop() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_ATTR_INDEX, 0x03, &mut ctx);
    vga.write(PORT_ATTR_INDEX, 0x3B, &mut ctx);
    assert_eq!(vga.registers().palette[3], 0x3B);

    // Index phase again
    vga.write(PORT_ATTR_INDEX, ATTR_MODE, &mut ctx);
    assert!(vga.registers().attr_is_data);

    // Status read resets the flip-flop to index
    vga.read(PORT_STATUS1_COLOUR, &mut ctx);
    assert!(!vga.registers().attr_is_data);
    vga.write(PORT_ATTR_INDEX, ATTR_PLANE_ENABLE | 0x20, &mut ctx);
    vga.write(PORT_ATTR_INDEX, 0xFF, &mut ctx);

    assert_eq!(vga.registers().attr_plane_enable, 0x0F);
    assert_eq!(vga.read(PORT_ATTR_INDEX, &mut ctx), ATTR_PLANE_ENABLE | 0x20);
    assert_eq!(vga.read(PORT_ATTR_DATA_READ, &mut ctx), 0x0F);
}

#[test]
fn test_dac_read_and_write_cursors() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_DAC_WRITE_INDEX, 0x10, &mut ctx);
    for component in [0x3F, 0x20, 0xFF, 0x01, 0x02, 0x03] {
        vga.write(PORT_DAC_DATA, component, &mut ctx);
    }
    assert_eq!(vga.read(PORT_DAC_WRITE_INDEX, &mut ctx), 0x12);
    assert_eq!(vga.read(PORT_DAC_READ_INDEX, &mut ctx), 0x00);

    vga.write(PORT_DAC_READ_INDEX, 0x11, &mut ctx);
    assert_eq!(vga.read(PORT_DAC_READ_INDEX, &mut ctx), 0x03);
    let colour: Vec<u8> = (0..3).map(|_| vga.read(PORT_DAC_DATA, &mut ctx)).collect();
    assert_eq!(colour, vec![0x01, 0x02, 0x03]);

    // Components are 6 bits
    assert_eq!(&vga.registers().dac[0x30..0x33], &[0x3F, 0x20, 0x3F]);
    // The write cursor did not move while reading
    assert_eq!(vga.read(PORT_DAC_WRITE_INDEX, &mut ctx), 0x12);
}

#[test]
fn test_dac_cursor_wraps() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_DAC_WRITE_INDEX, 0xFF, &mut ctx);
    for _ in 0..4 {
        vga.write(PORT_DAC_DATA, 0x15, &mut ctx);
    }
    assert_eq!(vga.registers().dac[0], 0x15);
    assert_eq!(vga.read(PORT_DAC_WRITE_INDEX, &mut ctx), 0);
}

#[test]
fn test_sequencer_and_graphics_index_data() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    vga.write(PORT_SEQ_INDEX, SEQ_CLOCKING_MODE as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, CLOCK_DOT8, &mut ctx);
    assert_eq!(vga.read(PORT_SEQ_DATA, &mut ctx), CLOCK_DOT8);
    vga.write(PORT_SEQ_INDEX, 0x07, &mut ctx);
    assert_eq!(vga.read(PORT_SEQ_DATA, &mut ctx), NO_DEVICE);

    vga.write(PORT_GC_INDEX, GC_BIT_MASK as u8, &mut ctx);
    vga.write(PORT_GC_DATA, 0x81, &mut ctx);
    assert_eq!(vga.read(PORT_GC_INDEX, &mut ctx), GC_BIT_MASK as u8);
    assert_eq!(vga.registers().write_registers().bit_mask, 0x81);

    vga.write(PORT_PEL_MASK, 0x0F, &mut ctx);
    assert_eq!(vga.read(PORT_PEL_MASK, &mut ctx), 0x0F);
}

#[test]
fn test_input_status_tracks_retrace() {
    let mut vga = VgaCard::new();

    let mut active = DeviceContext::new(0);
    assert_eq!(vga.read(PORT_STATUS1_COLOUR, &mut active), 0);

    let mut hblank = DeviceContext::new(LINE_TICKS - 1);
    assert_eq!(
        vga.read(PORT_STATUS1_COLOUR, &mut hblank),
        STATUS_DISPLAY_DISABLED
    );

    let mut vblank = DeviceContext::new(VISIBLE_LINES * LINE_TICKS + 1);
    assert_eq!(
        vga.read(PORT_STATUS1_COLOUR, &mut vblank),
        STATUS_VRETRACE | STATUS_DISPLAY_DISABLED
    );
}

#[test]
fn test_ports_through_bus() {
    let mut bus = IoBus::new();
    let id = VgaCard::new().attach_to(&mut bus);
    let mut ctx = DeviceContext::default();

    assert_eq!(bus.resolve(0x3C9), Some(id));
    assert_eq!(bus.resolve(0x3D5), Some(id));
    assert_eq!(bus.resolve(0x3B4), Some(id));
    assert_eq!(bus.resolve(0x3A0), None);

    // Word write to an index/data pair
    bus.write_port16(PORT_GC_INDEX, 0x0F05, &mut ctx);
    let vga = bus.get::<VgaCard>(id).unwrap();
    assert_eq!(vga.registers().gc[GC_MODE], 0x0F);
}

#[test]
fn test_debug_state_round_trip() {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();
    vga.write(PORT_MISC_WRITE, 0x63, &mut ctx);
    vga.write(PORT_DAC_WRITE_INDEX, 1, &mut ctx);
    vga.write(PORT_DAC_DATA, 0x2A, &mut ctx);

    let state = vga.read_state();
    assert_eq!(state["misc_output"], 0x63);

    let mut other = VgaCard::new();
    other.write_state(&state);
    assert_eq!(other.registers(), vga.registers());

    other.write_state(&serde_json::json!({ "misc_output": [] }));
    assert_eq!(other.registers(), vga.registers());

    other.reset();
    assert_eq!(other.registers(), &VgaRegisters::default());
}
