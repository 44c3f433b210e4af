use super::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::Cursor;

/// Store that fills read buffers with the low byte of the LBA, and holds
/// each operation until the test releases it.
struct GatedStore {
    gate: Receiver<()>,
    writes: Sender<(u8, u32, Vec<u8>)>,
}

impl BlockStore for GatedStore {
    fn read(&mut self, _unit: u8, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        self.gate.recv().map_err(|_| io::Error::other("gate closed"))?;
        buf.fill(lba as u8);
        Ok(())
    }

    fn write(&mut self, unit: u8, lba: u32, buf: &[u8]) -> io::Result<()> {
        self.gate.recv().map_err(|_| io::Error::other("gate closed"))?;
        let _ = self.writes.send((unit, lba, buf.to_vec()));
        Ok(())
    }
}

fn gated_bridge(channel: DiskChannel) -> (DiskIoBridge, Sender<()>, Receiver<(u8, u32, Vec<u8>)>) {
    let (gate_tx, gate_rx) = bounded(4);
    let (writes_tx, writes_rx) = bounded(4);
    let store = GatedStore {
        gate: gate_rx,
        writes: writes_tx,
    };
    let bridge = DiskIoBridge::spawn(channel, store).unwrap();
    (bridge, gate_tx, writes_rx)
}

#[test]
fn test_second_request_rejected_until_first_completes() {
    let (mut bridge, gate, _writes) = gated_bridge(DiskChannel::Floppy);

    bridge.submit(DiskAccessRequest::read(0, 5, SECTOR_SIZE)).unwrap();
    assert!(bridge.is_pending());

    let err = bridge
        .submit(DiskAccessRequest::read(1, 9, SECTOR_SIZE))
        .unwrap_err();
    assert!(matches!(err, DiskError::ChannelBusy { channel: DiskChannel::Floppy, .. }));
    let retry = err.into_request().unwrap();
    assert_eq!((retry.unit, retry.lba), (1, 9));

    // Worker finishes the first request
    gate.send(()).unwrap();
    let done = bridge.wait().unwrap();
    assert_eq!((done.unit, done.lba), (0, 5));
    assert!(done.success);
    assert!(!done.was_write());
    assert!(done.buffer.iter().all(|&b| b == 5));
    assert!(!bridge.is_pending());

    // Slot is free again
    bridge.submit(retry).unwrap();
    gate.send(()).unwrap();
    let done = bridge.wait().unwrap();
    assert_eq!((done.unit, done.lba), (1, 9));
    assert!(done.buffer.iter().all(|&b| b == 9));
}

#[test]
fn test_poll_does_not_block() {
    let (mut bridge, gate, _writes) = gated_bridge(DiskChannel::Ata);

    assert!(bridge.poll().is_none());
    bridge.submit(DiskAccessRequest::read(0, 1, SECTOR_SIZE)).unwrap();
    assert!(bridge.poll().is_none());
    assert!(bridge.is_pending());

    gate.send(()).unwrap();
    let completion = loop {
        if let Some(c) = bridge.poll() {
            break c;
        }
        std::thread::yield_now();
    };
    assert!(completion.success);
    assert!(bridge.poll().is_none());
}

#[test]
fn test_write_hands_buffer_to_worker() {
    let (mut bridge, gate, writes) = gated_bridge(DiskChannel::Ata);

    let data = vec![0xA5; SECTOR_SIZE];
    bridge.submit(DiskAccessRequest::write(1, 42, data.clone())).unwrap();
    gate.send(()).unwrap();

    let done = bridge.wait().unwrap();
    assert!(done.was_write());
    assert_eq!(done.buffer, data);
    assert_eq!(writes.recv().unwrap(), (1, 42, data));
}

#[test]
fn test_failed_operation_reports_failure() {
    let disks = DiskSet::new();
    let image = DiskImage::from_backend(Box::new(Cursor::new(vec![0u8; 4 * SECTOR_SIZE])), false).unwrap();
    disks.attach(0, image).unwrap();
    let mut bridge = DiskIoBridge::spawn(DiskChannel::Floppy, disks).unwrap();

    // Beyond the end of the image
    bridge.submit(DiskAccessRequest::read(0, 4, SECTOR_SIZE)).unwrap();
    assert!(!bridge.wait().unwrap().success);

    // No image on unit 1
    bridge.submit(DiskAccessRequest::read(1, 0, SECTOR_SIZE)).unwrap();
    assert!(!bridge.wait().unwrap().success);

    bridge.submit(DiskAccessRequest::read(0, 3, SECTOR_SIZE)).unwrap();
    assert!(bridge.wait().unwrap().success);
}

#[test]
fn test_wait_without_request_returns_none() {
    let (mut bridge, _gate, _writes) = gated_bridge(DiskChannel::Floppy);
    assert!(bridge.wait().is_none());
    assert_eq!(bridge.channel(), DiskChannel::Floppy);
}

#[test]
fn test_drop_with_pending_request_joins_worker() {
    let (mut bridge, gate, _writes) = gated_bridge(DiskChannel::Ata);
    bridge.submit(DiskAccessRequest::read(0, 0, SECTOR_SIZE)).unwrap();
    gate.send(()).unwrap();
    drop(bridge);
}
