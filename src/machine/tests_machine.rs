use super::*;
use crate::disk::{DiskImage, SECTOR_SIZE};
use crate::floppy::FLOPPY_IRQ;
use crate::memory::BLOCK_SIZE;
use crate::qemu_config::{FW_CFG_PORT, KEY_VGA_BIOS};
use std::io::Cursor;

/// Runs every slice in full and records its length.
#[derive(Default)]
struct SliceCpu {
    slices: Vec<u32>,
}

impl Cpu for SliceCpu {
    fn run(&mut self, bus: &mut dyn SystemBus, cycles: u32) {
        self.slices.push(cycles);
        bus.add_cpu_cycles(cycles);
    }
}

/// Never reports progress, like a CPU sitting in HLT.
struct HaltedCpu;

impl Cpu for HaltedCpu {
    fn run(&mut self, _bus: &mut dyn SystemBus, _cycles: u32) {}
}

fn machine() -> Machine {
    Machine::new(1 << 20).unwrap()
}

/// Image whose bytes hold the low byte of their sector number.
fn sector_numbered_image(size: usize) -> DiskImage {
    let data: Vec<u8> = (0..size).map(|i| (i / SECTOR_SIZE) as u8).collect();
    DiskImage::from_backend(Box::new(Cursor::new(data)), false).unwrap()
}

/// Take the FDC out of reset with DMA and IRQ enabled, and drain the
/// post-reset interrupt statuses.
fn floppy_power_up(m: &mut Machine) {
    m.write_port(0x3F2, 0x1C);
    assert!(m.interrupts().is_pending(FLOPPY_IRQ));
    for _ in 0..4 {
        m.write_port(0x3F5, 0x08);
        m.read_port(0x3F5);
        m.read_port(0x3F5);
    }
    assert!(!m.interrupts().is_pending(FLOPPY_IRQ));
}

#[test]
fn test_clock_constants() {
    assert_eq!(cpu_clock_speed(), 4_772_726);
    assert_eq!(SYSTEM_CLOCK / PIT_CLOCK_DIV, 1_193_181);

    let mut m = machine();
    m.add_cpu_cycles(10);
    assert_eq!(m.cycle_count(), 30);
}

#[test]
fn test_ram_layout() {
    let mut m = machine();

    m.write_byte(0x9FFFF, 0x12);
    assert_eq!(m.read_byte(0x9FFFF), 0x12);

    // 384KB of extended memory at 1MB
    m.write_byte(0x15FFFF, 0x34);
    assert_eq!(m.read_byte(0x15FFFF), 0x34);
    assert_eq!(m.read_byte(0x160000), OPEN_BUS);

    // Option ROM space is empty
    assert_eq!(m.read_byte(0xC0000), OPEN_BUS);

    // 24-bit address bus
    m.write_byte(0x100_0010, 0x56);
    assert_eq!(m.read_byte(0x10), 0x56);
}

#[test]
fn test_small_ram_has_no_extended_memory() {
    let mut m = Machine::new(256 * 1024).unwrap();
    assert_eq!(m.read_byte(0x40000), OPEN_BUS);
    assert!(!m.memory().is_block_mapped(EXTENDED_MEMORY_BASE as usize / BLOCK_SIZE));
}

#[test]
fn test_word_access_is_little_endian() {
    let mut m = machine();
    SystemBus::write_word(&mut m, 0x500, 0xBEEF);
    assert_eq!(m.read_byte(0x500), 0xEF);
    assert_eq!(m.read_byte(0x501), 0xBE);
    assert_eq!(SystemBus::read_word(&mut m, 0x500), 0xBEEF);
}

#[test]
fn test_vga_aperture_routes_to_card() {
    let mut m = machine();
    // Graphics misc: odd/even text at B8000
    m.write_port16(0x3CE, 0x0E06);

    m.write_byte(0xB8000, b'A');
    m.write_byte(0xB8001, 0x1F);
    assert_eq!(m.read_byte(0xB8000), b'A');

    let vga = m.vga().unwrap();
    assert_eq!(vga.plane(0)[0], b'A');
    assert_eq!(vga.plane(1)[0], 0x1F);
    assert!(!m.memory().is_block_mapped(0xB8000 / BLOCK_SIZE));

    // Outside the selected window
    assert_eq!(m.read_byte(0xA0000), OPEN_BUS);
}

#[test]
fn test_bios_maps_below_one_megabyte() {
    let mut m = machine();
    let mut bios = vec![0u8; 0x10000];
    bios[0xFFF0] = 0xEA;
    m.load_bios(Arc::from(bios));

    assert_eq!(m.read_byte(0xFFFF0), 0xEA);
    m.write_byte(0xFFFF0, 0x90);
    assert_eq!(m.read_byte(0xFFFF0), 0xEA);

    let block = m.map_address(0xF0000).unwrap();
    assert_eq!(block.len(), BLOCK_SIZE);
    assert!(m.memory().is_block_read_only(0xF0000 / BLOCK_SIZE));
}

#[test]
fn test_halted_cpu_still_advances_time() {
    let mut m = machine();
    m.run(&mut HaltedCpu, 100);
    assert_eq!(m.cycle_count(), 300);
}

#[test]
fn test_run_slices_are_bounded() {
    let mut m = machine();
    let mut cpu = SliceCpu::default();
    m.run(&mut cpu, 10_000);

    assert_eq!(cpu.slices.iter().sum::<u32>(), 10_000);
    assert!(cpu.slices.iter().all(|&s| s <= MAX_RUN_CHUNK));
    assert_eq!(m.cycle_count(), 30_000);
}

#[test]
fn test_run_loop_completes_floppy_seek_on_time() {
    let mut m = machine();
    floppy_power_up(&mut m);

    // SEEK unit 0 to cylinder 10: ten 3ms steps
    for b in [0x0F, 0x00, 10] {
        m.write_port(0x3F5, b);
    }
    let due_ticks = 10 * (SYSTEM_CLOCK as u64 * 3 / 1000);
    let due_cpu = (due_ticks / CPU_CLOCK_DIV as u64) as u32;

    let mut cpu = SliceCpu::default();
    m.run(&mut cpu, due_cpu - 1);
    assert!(!m.interrupts().is_pending(FLOPPY_IRQ));
    assert_eq!(m.floppy().unwrap().registers().cylinders[0], 0);

    m.run(&mut cpu, 1);
    assert_eq!(m.cycle_count(), due_ticks);
    assert!(m.interrupts().is_pending(FLOPPY_IRQ));
    assert_eq!(m.floppy().unwrap().registers().cylinders[0], 10);

    // SENSE INTERRUPT STATUS reports the seek end and drops the line
    m.write_port(0x3F5, 0x08);
    assert_eq!(m.read_port(0x3F5), 0x20);
    assert_eq!(m.read_port(0x3F5), 10);
    assert!(!m.interrupts().is_pending(FLOPPY_IRQ));
}

#[test]
fn test_floppy_dma_through_machine() {
    let mut m = machine();
    m.floppy_mut()
        .unwrap()
        .attach_image(0, sector_numbered_image(1_474_560))
        .unwrap();
    floppy_power_up(&mut m);

    // READ DATA C0 H0 S3, EOT 18
    for b in [0x46, 0x00, 0, 0, 3, 2, 18, 0x1B, 0xFF] {
        m.write_port(0x3F5, b);
    }
    assert!(m.wait_for_disk_io());

    let sector: Vec<u8> = (0..SECTOR_SIZE).map(|_| m.dma_read(2)).collect();
    assert!(sector.iter().all(|&b| b == 2));
    m.dma_complete(2);
    assert!(m.interrupts().is_pending(FLOPPY_IRQ));

    // Channels with nothing attached float
    assert_eq!(m.dma_read(1), NO_DEVICE);
    assert_eq!(m.dma_read(200), NO_DEVICE);
}

#[test]
fn test_ata_read_through_machine() {
    let mut m = machine();
    m.ata_mut()
        .unwrap()
        .attach_image(0, sector_numbered_image(64 * SECTOR_SIZE))
        .unwrap();

    // READ SECTORS, LBA 5, count 1
    m.write_port(0x1F6, 0xE0);
    m.write_port(0x1F2, 1);
    m.write_port(0x1F3, 5);
    m.write_port(0x1F4, 0);
    m.write_port(0x1F5, 0);
    m.write_port(0x1F7, 0x20);

    assert!(!m.interrupts().is_pending(14));
    assert!(m.wait_for_disk_io());
    assert!(m.interrupts().is_pending(14));

    let words: Vec<u16> = (0..SECTOR_SIZE / 2).map(|_| m.read_port16(0x1F0)).collect();
    assert!(words.iter().all(|&w| w == 0x0505));
    m.read_port(0x1F7);
    assert!(!m.interrupts().is_pending(14));
}

#[test]
fn test_port_3f7_belongs_to_floppy() {
    let mut m = machine();
    m.floppy_mut()
        .unwrap()
        .attach_image(0, sector_numbered_image(1_474_560))
        .unwrap();
    m.write_port(0x3F2, 0x1C);

    // DIR disk change, not the ATA drive address register
    assert_eq!(m.io_bus().resolve(0x3F7), Some(m.floppy));
    assert_eq!(m.io_bus().resolve(0x3F6), Some(m.ata));
    assert_eq!(m.read_port(0x3F7) & 0x80, 0x80);
}

#[test]
fn test_game_port_and_fw_cfg_forwarding() {
    let mut m = machine();
    m.set_button(0, true);
    assert_eq!(m.read_port(0x201) & 0x10, 0);

    m.set_vga_bios(Arc::from(vec![0x55, 0xAA]));
    m.write_port16(FW_CFG_PORT, KEY_VGA_BIOS);
    assert_eq!(m.read_port(FW_CFG_PORT + 1), 0x55);
    assert_eq!(m.read_port(FW_CFG_PORT + 1), 0xAA);
}

#[test]
fn test_external_interrupts_and_acknowledge() {
    let mut m = machine();
    m.flag_interrupt(1);
    m.flag_interrupt(0);
    assert_eq!(m.pending_interrupts(), 0b11);
    assert_eq!(m.acknowledge_interrupt(), Some(0));
    m.clear_interrupt(1);
    assert_eq!(m.acknowledge_interrupt(), None);
}

#[test]
fn test_render_frame_matches_resolution() {
    let mut m = machine();
    let (w, h) = m.render_frame();
    assert_eq!((w, h), m.vga().unwrap().get_output_resolution());
    assert_eq!(m.frame_buffer().len(), w * h);
}

#[test]
fn test_graphics_config_and_state_round_trip() {
    let mut m = machine();
    assert_eq!(m.graphics_config(), GraphicsConfig::Cga80);
    assert_eq!(GraphicsConfig::Mda.equipment_bits(), 0b11);

    m.set_graphics_config(GraphicsConfig::Mda);
    m.write_port(0x3C2, 0x67);
    let state = m.read_state();
    assert_eq!(state["vga"]["misc_output"], 0x67);

    let mut other = machine();
    other.write_state(&state);
    assert_eq!(other.graphics_config(), GraphicsConfig::Mda);
    assert_eq!(other.vga().unwrap().registers().misc_output, 0x67);
}

#[test]
fn test_reset_clears_pending_lines() {
    let mut m = machine();
    floppy_power_up(&mut m);
    m.flag_interrupt(14);
    m.write_port(0x3C2, 0x00);

    m.reset();
    assert_eq!(m.pending_interrupts(), 0);
    assert_eq!(m.vga().unwrap().registers().misc_output, crate::vga::constants::MISC_COLOUR);
}
