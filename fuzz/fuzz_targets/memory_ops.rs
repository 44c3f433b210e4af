#![no_main]
use libfuzzer_sys::fuzz_target;
use picopc::{Machine, SystemBus};
use std::sync::Arc;

fuzz_target!(|ops: Vec<(u8, u32, u16)>| {
    let Ok(mut machine) = Machine::new(1 << 20) else {
        return;
    };
    machine.load_bios(Arc::from(vec![0xF4; 0x10000]));

    for (op_type, addr, val) in ops {
        match op_type % 6 {
            0 => { machine.read_byte(addr); },
            1 => { machine.write_byte(addr, val as u8); },
            2 => { SystemBus::read_word(&mut machine, addr); },
            3 => { SystemBus::write_word(&mut machine, addr, val); },
            // Reprogram the aperture window and memory mode
            4 => machine.write_port16(0x3CE, (val & 0xFF00) | 0x06),
            5 => machine.write_port16(0x3C4, (val & 0xFF00) | 0x04),
            _ => unreachable!(),
        }
    }
});
