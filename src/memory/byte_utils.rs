//! Helper functions for byte manipulation.
//!
//! PC port and memory accesses wider than a byte are composed from
//! little-endian byte pairs: the low byte lives at the lower address.

/// Join two bytes into a 16-bit word (Little Endian)
#[inline(always)]
pub fn join_u16(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Split a 16-bit word into two bytes (Little Endian)
#[inline(always)]
pub fn split_u16(word: u16) -> (u8, u8) {
    let bytes = word.to_le_bytes();
    (bytes[0], bytes[1])
}

/// Copy an ASCII string into ATA identify words, space padded.
///
/// ATA strings store the first character of each pair in the high byte.
pub fn write_ata_string(words: &mut [u16], text: &str) {
    let mut bytes = text.bytes().chain(std::iter::repeat(b' '));
    for word in words.iter_mut() {
        let first = bytes.next().unwrap_or(b' ');
        let second = bytes.next().unwrap_or(b' ');
        *word = ((first as u16) << 8) | second as u16;
    }
}
