//! Dallas/Maxim CRC-8 used by 1-Wire ROM codes.
//!
//! Reflected polynomial `0x8C` (x^8 + x^5 + x^4 + 1), initial value 0, no final XOR.

const POLY_REFLECTED: u8 = 0x8C;

/// Compute the 1-Wire CRC-8 over `bytes`.
pub fn checksum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |crc, &byte| {
        let mut crc = crc ^ byte;
        for _ in 0..8 {
            crc = if crc & 0x01 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
        }
        crc
    })
}
