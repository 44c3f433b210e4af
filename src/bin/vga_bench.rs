use picopc::io::{DeviceContext, IoDevice};
use picopc::vga::constants::*;
use picopc::vga::VgaCard;
use std::time::Instant;

fn main() {
    env_logger::init();

    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    // Mode 13h style: 320x200, 256 colours, chain-4
    let crtc = [
        (CRTC_HORIZ_DISPLAY_END, 0x4F),
        (CRTC_VERT_DISPLAY_END, 0x8F),
        (CRTC_OVERFLOW, 0x1F),
        (CRTC_MAX_SCAN_LINE, 0x41),
        (CRTC_OFFSET, 0x28),
    ];
    for (index, value) in crtc {
        vga.write(PORT_CRTC_INDEX_COLOUR, index as u8, &mut ctx);
        vga.write(PORT_CRTC_DATA_COLOUR, value, &mut ctx);
    }
    vga.write(PORT_SEQ_INDEX, SEQ_CLOCKING_MODE as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, CLOCK_DOT8, &mut ctx);
    vga.write(PORT_SEQ_INDEX, SEQ_MEMORY_MODE as u8, &mut ctx);
    vga.write(PORT_SEQ_DATA, MEM_CHAIN4 | MEM_ODD_EVEN_DISABLE, &mut ctx);
    vga.write(PORT_GC_INDEX, GC_MISC as u8, &mut ctx);
    vga.write(PORT_GC_DATA, 0x05, &mut ctx);
    vga.read(PORT_STATUS1_COLOUR, &mut ctx);
    vga.write(PORT_ATTR_INDEX, ATTR_MODE | 0x20, &mut ctx);
    vga.write(PORT_ATTR_INDEX, 0x41, &mut ctx);

    // Gradient palette and a test pattern
    vga.write(PORT_DAC_WRITE_INDEX, 0, &mut ctx);
    for i in 0..256u32 {
        for shift in [0, 2, 4] {
            vga.write(PORT_DAC_DATA, ((i >> shift) & 0x3F) as u8, &mut ctx);
        }
    }
    for offset in 0..320 * 200u32 {
        vga.write_mem(APERTURE_BASE + offset, (offset % 251) as u8);
    }

    let mut frame = Vec::new();
    let start = Instant::now();
    let iterations = 1000;

    for _ in 0..iterations {
        vga.render_frame(&mut frame);
    }

    let duration = start.elapsed();
    println!("Time for {} frames: {:?}", iterations, duration);
    println!("FPS: {}", iterations as f64 / duration.as_secs_f64());

    if let Some(path) = std::env::args().nth(1) {
        match vga.save_screenshot(&path) {
            Ok(()) => println!("Screenshot saved to {}", path),
            Err(e) => eprintln!("Failed to save screenshot: {}", e),
        }
    }
}
