use super::test_utils::TestDevice;
use super::{DeviceContext, IoBus, NO_DEVICE};

#[test]
fn test_dispatch_by_mask_and_value() {
    let mut bus = IoBus::new();
    let ata = bus.add_device(0x3F8, 0x1F0, 1 << 14, Box::new(TestDevice::new(0xA1)));
    let game = bus.add_device(0x3FF, 0x201, 0, Box::new(TestDevice::new(0x6A)));
    let mut ctx = DeviceContext::new(0);

    assert_eq!(bus.read_port(0x1F7, &mut ctx), 0xA1);
    assert_eq!(bus.read_port(0x201, &mut ctx), 0x6A);
    assert_eq!(bus.resolve(0x1F0), Some(ata));
    assert_eq!(bus.resolve(0x201), Some(game));

    // Ten bit decode aliases
    assert_eq!(bus.resolve(0x5F3), Some(ata));
    assert_eq!(bus.resolve(0x601), Some(game));
}

#[test]
fn test_unhandled_port_reads_sentinel() {
    let mut bus = IoBus::new();
    let mut ctx = DeviceContext::new(0);
    assert_eq!(bus.read_port(0x80, &mut ctx), NO_DEVICE);
    assert_eq!(bus.read_port16(0x80, &mut ctx), 0xFFFF);

    // Dropped quietly
    bus.write_port(0x80, 0x12, &mut ctx);
    bus.write_port16(0x80, 0x1234, &mut ctx);
}

#[test]
fn test_first_registered_region_wins() {
    let mut bus = IoBus::new();
    let first = bus.add_device(0x3FF, 0x3F7, 0, Box::new(TestDevice::new(1)));
    let _second = bus.add_device(0x3FE, 0x3F6, 0, Box::new(TestDevice::new(2)));

    assert_eq!(bus.resolve(0x3F7), Some(first));
    let mut ctx = DeviceContext::new(0);
    assert_eq!(bus.read_port(0x3F6, &mut ctx), 2);
    assert_eq!(bus.read_port(0x3F7, &mut ctx), 1);
}

#[test]
fn test_word_access_composes_little_endian_bytes() {
    let mut bus = IoBus::new();
    let id = bus.add_device(0x3FE, 0x510, 0, Box::new(TestDevice::new(0)));
    let mut ctx = DeviceContext::new(0);

    bus.write_port16(0x510, 0xBEEF, &mut ctx);

    let dev = bus.get::<TestDevice>(id).unwrap();
    assert_eq!(dev.writes, vec![(0x510, 0xEF), (0x511, 0xBE)]);
}

#[test]
fn test_word_read_goes_to_same_device() {
    let mut bus = IoBus::new();
    let id = bus.add_device(0x3FF, 0x100, 0, Box::new(TestDevice::new(0x12)));
    bus.add_device(0x3FF, 0x101, 0, Box::new(TestDevice::new(0x34)));
    let mut ctx = DeviceContext::new(0);

    // The high byte comes from the first device even though 0x101 belongs
    // to another one
    assert_eq!(bus.read_port16(0x100, &mut ctx), 0x1212);
    assert_eq!(bus.get::<TestDevice>(id).unwrap().reads, vec![0x100, 0x101]);
}

#[test]
fn test_remove_device() {
    let mut bus = IoBus::new();
    let id = bus.add_device(0x3FF, 0x201, 0, Box::new(TestDevice::new(9)));
    bus.add_region(id, 0x3FF, 0x209, 0);

    let removed = bus.remove_device(id);
    assert!(removed.is_some());
    assert_eq!(bus.resolve(0x201), None);
    assert_eq!(bus.resolve(0x209), None);
    assert!(bus.device(id).is_none());
    assert!(bus.remove_device(id).is_none());
}

#[test]
fn test_typed_access_wrong_type_is_none() {
    struct Other;
    impl super::IoDevice for Other {
        fn read(&mut self, _: u16, _: &mut DeviceContext) -> u8 {
            0
        }
        fn write(&mut self, _: u16, _: u8, _: &mut DeviceContext) {}
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    let mut bus = IoBus::new();
    let id = bus.add_device(0x3FF, 0x300, 0, Box::new(Other));
    assert!(bus.get::<TestDevice>(id).is_none());
    assert!(bus.get::<Other>(id).is_some());

    // Defaults of the capability set
    let dev = bus.device_mut(id).unwrap();
    let mut ctx = DeviceContext::new(0);
    assert_eq!(dev.dma_read(2, &mut ctx), NO_DEVICE);
    assert_eq!(dev.cycles_to_next_interrupt(0), 0);
    dev.dma_write(2, 0, &mut ctx);
    dev.dma_complete(2, &mut ctx);
    dev.update_for_interrupts(0xFFFF, &mut ctx);
    assert_eq!(ctx.raised(), 0);
}

#[test]
fn test_update_for_interrupts_visits_overlapping_devices_once() {
    let mut bus = IoBus::new();
    let a = bus.add_device(0x3FF, 0x100, 1 << 6, Box::new(TestDevice::new(0)));
    bus.add_region(a, 0x3FF, 0x101, 1 << 6);
    let b = bus.add_device(0x3FF, 0x200, 1 << 14, Box::new(TestDevice::new(0)));
    let mut ctx = DeviceContext::new(0);

    bus.update_for_interrupts(1 << 6, &mut ctx);

    assert_eq!(bus.get::<TestDevice>(a).unwrap().updates, vec![1 << 6]);
    assert!(bus.get::<TestDevice>(b).unwrap().updates.is_empty());
    assert_eq!(bus.irq_mask(a), 1 << 6);
}

#[test]
fn test_cycles_to_next_interrupt_ignores_zero() {
    let mut bus = IoBus::new();
    let mut idle = TestDevice::new(0);
    idle.next_interrupt = 0;
    let mut soon = TestDevice::new(0);
    soon.next_interrupt = 50;
    let mut later = TestDevice::new(0);
    later.next_interrupt = 400;

    bus.add_device(0x3FF, 0x100, 0, Box::new(idle));
    assert_eq!(bus.cycles_to_next_interrupt(0), None);

    bus.add_device(0x3FF, 0x101, 0, Box::new(later));
    bus.add_device(0x3FF, 0x102, 0, Box::new(soon));
    assert_eq!(bus.cycles_to_next_interrupt(0), Some(50));
}

#[test]
fn test_context_irq_changes() {
    let mut ctx = DeviceContext::new(10);
    ctx.raise_irq(14);
    ctx.lower_irq(6);
    assert_eq!(ctx.raised(), 1 << 14);
    assert_eq!(ctx.lowered(), 1 << 6);

    ctx.lower_irq(14);
    assert_eq!(ctx.raised(), 0);

    let (raised, lowered) = ctx.take_irq_changes();
    assert_eq!((raised, lowered), (0, (1 << 6) | (1 << 14)));
    assert_eq!(ctx.take_irq_changes(), (0, 0));
}
