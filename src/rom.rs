//! 1-Wire ROM code (identifier block) parsing and validation.
//!
//! The bridge answers the `rom` command with free text; one line carries the
//! listing, e.g. `ROM Code: 14 A1 5C 33 00 00 00 10`. The label may also be
//! followed directly by the bytes without a colon.

use crate::crc::checksum8;
use std::fmt;

/// Label that introduces the ROM code listing.
pub const ROM_LABEL: &str = "ROM Code";

/// Exactly eight bytes: family code, 48-bit serial, CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierBlock([u8; 8]);

impl IdentifierBlock {
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Collect the hex tokens of every `ROM Code` line.
    ///
    /// Returns `None` unless exactly 8 bytes were found. Tokens that are not a
    /// valid byte in hex are skipped.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        let bytes: Vec<u8> = lines
            .iter()
            .map(|line| AsRef::<str>::as_ref(line))
            .filter(|line| line.starts_with(ROM_LABEL))
            .flat_map(|line| {
                let listing = match line.split_once(':') {
                    Some((_, rest)) => rest,
                    None => &line[ROM_LABEL.len()..],
                };
                listing
                    .split_whitespace()
                    .filter_map(|token| u8::from_str_radix(token, 16).ok())
                    .collect::<Vec<_>>()
            })
            .collect();

        <[u8; 8]>::try_from(bytes.as_slice()).ok().map(Self)
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn family_code(&self) -> u8 {
        self.0[0]
    }

    pub fn stored_crc(&self) -> u8 {
        self.0[7]
    }

    pub fn computed_crc(&self) -> u8 {
        checksum8(&self.0[..7])
    }

    /// Validate the stored CRC. A mismatch is reported, never raised.
    pub fn check(&self) -> RomCheck {
        let computed_crc = self.computed_crc();
        RomCheck {
            block: *self,
            computed_crc,
            crc_ok: computed_crc == self.stored_crc(),
        }
    }
}

impl fmt::Display for IdentifierBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        f.write_str(&hex.join(" "))
    }
}

/// Outcome of validating an [`IdentifierBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomCheck {
    pub block: IdentifierBlock,
    pub computed_crc: u8,
    pub crc_ok: bool,
}

impl RomCheck {
    pub fn family_code(&self) -> u8 {
        self.block.family_code()
    }

    pub fn stored_crc(&self) -> u8 {
        self.block.stored_crc()
    }

    /// Human-readable summary, one item per line.
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("ROM Bytes: {}", self.block),
            format!("Family Code: 0x{:02X}", self.family_code()),
            format!("CRC (chip):     0x{:02X}", self.stored_crc()),
            format!("CRC (computed): 0x{:02X}", self.computed_crc),
            format!("CRC Status: {}", if self.crc_ok { "OK" } else { "MISMATCH" }),
        ]
    }
}
