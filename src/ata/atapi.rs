//! ATAPI packet commands for CD images.

use crate::disk::{DriveInfo, CD_SECTOR_SIZE};
use crate::memory::byte_utils::write_ata_string;

pub const SENSE_NO_SENSE: u8 = 0x00;
pub const SENSE_NOT_READY: u8 = 0x02;
pub const SENSE_ILLEGAL_REQUEST: u8 = 0x05;

const ASC_INVALID_COMMAND: u8 = 0x20;
const ASC_LBA_OUT_OF_RANGE: u8 = 0x21;
const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

/// Interrupt reason values, reported through the sector count register.
pub const REASON_COMMAND: u8 = 0x01;
pub const REASON_DATA_IN: u8 = 0x02;
pub const REASON_STATUS: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
}

/// What the controller should do after a packet.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketResult {
    /// Transfer this data to the host
    DataIn(Vec<u8>),
    /// Read `blocks` 2048-byte sectors starting at `lba` from the image
    Read { lba: u32, blocks: u32 },
    NoData,
    Error(Sense),
}

/// Execute one 12-byte packet. `info` is the attached medium, if any.
pub fn handle_packet(
    sense: &mut Sense,
    packet: &[u8; 12],
    info: Option<DriveInfo>,
) -> PacketResult {
    match packet[0] {
        // TEST UNIT READY
        0x00 => match info {
            Some(_) => {
                *sense = Sense::default();
                PacketResult::NoData
            }
            None => fail(sense, SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT),
        },
        // REQUEST SENSE
        0x03 => {
            let mut data = vec![0u8; 18];
            data[0] = 0x70;
            data[2] = sense.key & 0x0F;
            data[7] = 10;
            data[12] = sense.asc;
            *sense = Sense::default();
            data.truncate((packet[4] as usize).min(18));
            PacketResult::DataIn(data)
        }
        // INQUIRY
        0x12 => {
            let mut data = inquiry_data();
            data.truncate((packet[4] as usize).min(data.len()));
            PacketResult::DataIn(data)
        }
        // READ CAPACITY(10)
        0x25 => match info {
            Some(info) => {
                let mut data = Vec::with_capacity(8);
                data.extend_from_slice(&info.num_sectors.saturating_sub(1).to_be_bytes());
                data.extend_from_slice(&(CD_SECTOR_SIZE as u32).to_be_bytes());
                PacketResult::DataIn(data)
            }
            None => fail(sense, SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT),
        },
        // READ(10)
        0x28 => {
            let Some(info) = info else {
                return fail(sense, SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT);
            };
            let lba = u32::from_be_bytes([packet[2], packet[3], packet[4], packet[5]]);
            let blocks = u16::from_be_bytes([packet[7], packet[8]]) as u32;
            if blocks == 0 {
                return PacketResult::NoData;
            }
            if lba as u64 + blocks as u64 > info.num_sectors as u64 {
                return fail(sense, SENSE_ILLEGAL_REQUEST, ASC_LBA_OUT_OF_RANGE);
            }
            PacketResult::Read { lba, blocks }
        }
        _ => fail(sense, SENSE_ILLEGAL_REQUEST, ASC_INVALID_COMMAND),
    }
}

fn fail(sense: &mut Sense, key: u8, asc: u8) -> PacketResult {
    *sense = Sense { key, asc };
    PacketResult::Error(*sense)
}

fn inquiry_data() -> Vec<u8> {
    let mut data = vec![b' '; 36];
    data[..8].copy_from_slice(&[0x05, 0x80, 0x05, 0x02, 31, 0, 0, 0]);
    copy_padded(&mut data[8..16], b"PICOPC");
    copy_padded(&mut data[16..32], b"ATAPI CD-ROM");
    copy_padded(&mut data[32..36], b"1.0");
    data
}

fn copy_padded(dst: &mut [u8], src: &[u8]) {
    dst.fill(b' ');
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

/// IDENTIFY PACKET DEVICE response.
pub fn identify_packet_data() -> Vec<u8> {
    let mut words = [0u16; 256];

    // ATAPI, CD-ROM, removable, 12 byte packets
    words[0] = 0x8580;
    write_ata_string(&mut words[10..20], "PICOPC-CD-0001");
    write_ata_string(&mut words[23..27], "1.0");
    write_ata_string(&mut words[27..47], "PICOPC ATAPI CD-ROM");
    // LBA
    words[49] = 1 << 9;

    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
