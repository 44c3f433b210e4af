#![no_main]
use libfuzzer_sys::fuzz_target;
use picopc::io::{DeviceContext, IoDevice};
use picopc::vga::VgaCard;

fuzz_target!(|data: &[u8]| {
    let mut vga = VgaCard::new();
    let mut ctx = DeviceContext::default();

    // Pairs of (port offset from 0x3B0, value); odd tails write VRAM
    for chunk in data.chunks(2) {
        match chunk {
            [port, value] => vga.write(0x3B0 + (*port as u16 % 0x30), *value, &mut ctx),
            [value] => vga.write_mem(0xA0000 + *value as u32 * 257, *value),
            _ => unreachable!(),
        }
    }

    let mut frame = Vec::new();
    let (w, h) = vga.render_frame(&mut frame);
    assert_eq!(frame.len(), w * h);
});
