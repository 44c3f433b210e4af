#![no_main]
use libfuzzer_sys::fuzz_target;
use picopc::disk::DiskImage;
use picopc::floppy::{FloppyController, FLOPPY_DMA_CHANNEL};
use picopc::io::{DeviceContext, IoDevice};
use std::io::Cursor;

fuzz_target!(|ops: Vec<(u8, u8)>| {
    let Ok(mut fdc) = FloppyController::new() else {
        return;
    };
    let Ok(image) = DiskImage::from_backend(Box::new(Cursor::new(vec![0u8; 368_640])), false) else {
        return;
    };
    if fdc.attach_image(0, image).is_err() {
        return;
    }
    let mut ctx = DeviceContext::new(0);

    for (op, value) in ops {
        ctx.cycle_count += value as u64 * 1000;
        match op % 9 {
            0 => fdc.write(0x3F5, value, &mut ctx),
            1 => { fdc.read(0x3F5, &mut ctx); },
            2 => { fdc.read(0x3F4, &mut ctx); },
            3 => fdc.write(0x3F2, value, &mut ctx),
            4 => fdc.write(0x3F4, value, &mut ctx),
            5 => { fdc.dma_read(FLOPPY_DMA_CHANNEL, &mut ctx); },
            6 => fdc.dma_write(FLOPPY_DMA_CHANNEL, value, &mut ctx),
            7 => fdc.dma_complete(FLOPPY_DMA_CHANNEL, &mut ctx),
            _ => {
                fdc.wait_for_io(&mut ctx);
                fdc.update_for_interrupts(1 << 6, &mut ctx);
            }
        }
    }
});
