use super::*;
use std::io::{Cursor, Write};
use tempfile::{Builder, NamedTempFile};

fn image_file(suffix: &str, len: usize) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    let data: Vec<u8> = (0..len).map(|i| (i / SECTOR_SIZE) as u8).collect();
    file.write_all(&data).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_open_floppy_image_guesses_geometry() {
    let file = image_file(".img", 1_474_560);
    let image = DiskImage::open(file.path()).unwrap();
    let info = image.info();

    assert_eq!(info.sector_size, SECTOR_SIZE);
    assert_eq!(info.num_sectors, 2880);
    assert!(!info.is_cd);
    assert_eq!(info.floppy_geometry.sectors_per_track, 18);
}

#[test]
fn test_iso_extension_selects_cd_sectors() {
    let file = image_file(".ISO", 8 * CD_SECTOR_SIZE);
    let info = DiskImage::open(file.path()).unwrap().info();
    assert!(info.is_cd);
    assert_eq!(info.sector_size, CD_SECTOR_SIZE);
    assert_eq!(info.num_sectors, 8);
}

#[test]
fn test_open_missing_and_empty_images_fail() {
    let missing = DiskImage::open("/nonexistent/disk.img").unwrap_err();
    assert!(matches!(missing, DiskError::Open { .. }));

    let empty = Builder::new().suffix(".img").tempfile().unwrap();
    let err = DiskImage::open(empty.path()).unwrap_err();
    assert!(matches!(err, DiskError::EmptyImage { .. }));
}

#[test]
fn test_sector_read_write_on_file() {
    let file = image_file(".img", 16 * SECTOR_SIZE);
    let mut image = DiskImage::open(file.path()).unwrap();

    let mut buf = vec![0; SECTOR_SIZE];
    image.read_sector(3, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 3));

    image.write_sector(3, &vec![0xEE; SECTOR_SIZE]).unwrap();
    drop(image);

    let contents = std::fs::read(file.path()).unwrap();
    assert!(contents[3 * SECTOR_SIZE..4 * SECTOR_SIZE].iter().all(|&b| b == 0xEE));
    assert!(contents[4 * SECTOR_SIZE..5 * SECTOR_SIZE].iter().all(|&b| b == 4));
}

#[test]
fn test_out_of_range_and_wrong_buffer_size() {
    let backend = Box::new(Cursor::new(vec![0u8; 2 * SECTOR_SIZE]));
    let mut image = DiskImage::from_backend(backend, false).unwrap();

    let mut buf = vec![0; SECTOR_SIZE];
    assert!(image.read_sector(2, &mut buf).is_err());

    let mut short = vec![0; 100];
    assert!(image.read_sector(0, &mut short).is_err());
}

#[test]
fn test_disk_set_attach_and_units() {
    let disks = DiskSet::new();
    assert!(disks.info(0).is_none());

    let file = image_file(".img", 737_280);
    let info = disks.open(1, file.path()).unwrap();
    assert_eq!(info.floppy_geometry.sectors_per_track, 9);
    assert_eq!(disks.info(1), Some(info));

    let bad = DiskImage::from_backend(Box::new(Cursor::new(vec![0u8; SECTOR_SIZE])), false).unwrap();
    assert!(matches!(disks.attach(2, bad), Err(DiskError::InvalidUnit { unit: 2 })));

    let info = disks.override_sectors_per_track(1, 18).unwrap();
    assert_eq!(info.floppy_geometry.sectors_per_track, 18);
    assert!(disks.override_sectors_per_track(0, 18).is_err());

    assert!(disks.detach(1).unwrap().is_some());
    assert!(disks.info(1).is_none());
}

#[test]
fn test_disk_set_as_block_store() {
    let mut disks = DiskSet::new();
    let data: Vec<u8> = (0..4 * SECTOR_SIZE).map(|i| (i / SECTOR_SIZE) as u8 + 1).collect();
    let image = DiskImage::from_backend(Box::new(Cursor::new(data)), false).unwrap();
    disks.attach(0, image).unwrap();

    let mut buf = vec![0; SECTOR_SIZE];
    BlockStore::read(&mut disks, 0, 2, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 3));

    BlockStore::write(&mut disks, 0, 1, &[0x55; SECTOR_SIZE]).unwrap();
    BlockStore::read(&mut disks, 0, 1, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0x55));

    assert!(BlockStore::read(&mut disks, 1, 0, &mut buf).is_err());
}
