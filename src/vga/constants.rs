// Ports (colour addresses; mono CRTC and status live 0x20 lower)
pub const PORT_ATTR_INDEX: u16 = 0x3C0;
pub const PORT_ATTR_DATA_READ: u16 = 0x3C1;
pub const PORT_MISC_WRITE: u16 = 0x3C2;
pub const PORT_SEQ_INDEX: u16 = 0x3C4;
pub const PORT_SEQ_DATA: u16 = 0x3C5;
pub const PORT_PEL_MASK: u16 = 0x3C6;
pub const PORT_DAC_READ_INDEX: u16 = 0x3C7;
pub const PORT_DAC_WRITE_INDEX: u16 = 0x3C8;
pub const PORT_DAC_DATA: u16 = 0x3C9;
pub const PORT_MISC_READ: u16 = 0x3CC;
pub const PORT_GC_INDEX: u16 = 0x3CE;
pub const PORT_GC_DATA: u16 = 0x3CF;
pub const PORT_CRTC_INDEX_COLOUR: u16 = 0x3D4;
pub const PORT_CRTC_DATA_COLOUR: u16 = 0x3D5;
pub const PORT_STATUS1_COLOUR: u16 = 0x3DA;
pub const PORT_CRTC_INDEX_MONO: u16 = 0x3B4;
pub const PORT_CRTC_DATA_MONO: u16 = 0x3B5;
pub const PORT_STATUS1_MONO: u16 = 0x3BA;

// CRTC register indices
pub const NUM_CRTC_REGS: usize = 25;
pub const CRTC_HORIZ_DISPLAY_END: usize = 0x01;
pub const CRTC_OVERFLOW: usize = 0x07;
pub const CRTC_MAX_SCAN_LINE: usize = 0x09;
pub const CRTC_CURSOR_START: usize = 0x0A;
pub const CRTC_CURSOR_END: usize = 0x0B;
pub const CRTC_START_HIGH: usize = 0x0C;
pub const CRTC_START_LOW: usize = 0x0D;
pub const CRTC_CURSOR_HIGH: usize = 0x0E;
pub const CRTC_CURSOR_LOW: usize = 0x0F;
pub const CRTC_VRETRACE_END: usize = 0x11;
pub const CRTC_VERT_DISPLAY_END: usize = 0x12;
pub const CRTC_OFFSET: usize = 0x13;

pub const CRTC_PROTECT: u8 = 0x80;
pub const CURSOR_DISABLE: u8 = 0x20;
pub const MAX_SCAN_DOUBLE: u8 = 0x80;

// Sequencer register indices
pub const NUM_SEQ_REGS: usize = 5;
pub const SEQ_CLOCKING_MODE: usize = 0x01;
pub const SEQ_MAP_MASK: usize = 0x02;
pub const SEQ_MEMORY_MODE: usize = 0x04;

pub const CLOCK_DOT8: u8 = 0x01;
pub const CLOCK_HALF_DOT: u8 = 0x08;
pub const MEM_ODD_EVEN_DISABLE: u8 = 0x04;
pub const MEM_CHAIN4: u8 = 0x08;

// Graphics controller register indices
pub const NUM_GC_REGS: usize = 9;
pub const GC_SET_RESET: usize = 0x00;
pub const GC_ENABLE_SET_RESET: usize = 0x01;
pub const GC_COLOUR_COMPARE: usize = 0x02;
pub const GC_DATA_ROTATE: usize = 0x03;
pub const GC_READ_MAP: usize = 0x04;
pub const GC_MODE: usize = 0x05;
pub const GC_MISC: usize = 0x06;
pub const GC_COLOUR_DONT_CARE: usize = 0x07;
pub const GC_BIT_MASK: usize = 0x08;

pub const GC_MODE_READ1: u8 = 0x08;
pub const GC_MISC_GRAPHICS: u8 = 0x01;

// Attribute controller
pub const NUM_PALETTE: usize = 16;
pub const ATTR_MODE: u8 = 0x10;
pub const ATTR_PLANE_ENABLE: u8 = 0x12;
pub const ATTR_INDEX_MASK: u8 = 0x1F;

pub const ATTR_MODE_LINE_GRAPHICS: u8 = 0x04;
pub const ATTR_MODE_BLINK: u8 = 0x08;
pub const ATTR_MODE_8BIT: u8 = 0x40;

pub const MISC_COLOUR: u8 = 0x01;

// Input status 1
pub const STATUS_DISPLAY_DISABLED: u8 = 0x01;
pub const STATUS_VRETRACE: u8 = 0x08;

// Memory
pub const PLANE_SIZE: usize = 64 * 1024;
pub const VRAM_SIZE: usize = 4 * PLANE_SIZE;
pub const APERTURE_BASE: u32 = 0xA0000;
pub const APERTURE_END: u32 = 0xC0000;
pub const DAC_SIZE: usize = 256 * 3;

/// Font glyphs in plane 2 are 32 bytes apart.
pub const GLYPH_STRIDE: usize = 32;
