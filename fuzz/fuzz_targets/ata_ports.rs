#![no_main]
use libfuzzer_sys::fuzz_target;
use picopc::ata::AtaController;
use picopc::disk::DiskImage;
use picopc::io::{DeviceContext, IoDevice};
use std::io::Cursor;

fuzz_target!(|ops: Vec<(u8, u16)>| {
    let Ok(mut ata) = AtaController::new() else {
        return;
    };
    let Ok(image) = DiskImage::from_backend(Box::new(Cursor::new(vec![0u8; 64 * 512])), false) else {
        return;
    };
    if ata.attach_image(0, image).is_err() {
        return;
    }
    let mut ctx = DeviceContext::default();

    for (op, value) in ops {
        let reg = (op & 7) as u16;
        match op >> 3 {
            0 => { ata.read(0x1F0 + reg, &mut ctx); },
            1 => ata.write(0x1F0 + reg, value as u8, &mut ctx),
            2 => { ata.read16(0x1F0, &mut ctx); },
            3 => ata.write16(0x1F0, value, &mut ctx),
            4 => ata.write(0x3F6, value as u8, &mut ctx),
            5 => { ata.wait_for_io(&mut ctx); },
            _ => ata.service_io(&mut ctx),
        }
    }
});
