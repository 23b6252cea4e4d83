//! File name prefix for a batch export.
//!
//! `<device>_<tag>_<authorization>`, where device and authorization come from
//! fixed offsets in the data memory and the tag is supplied by the user.
//! Undecidable parts fall back to [`UNKNOWN_DEVICE`] / [`UNKNOWN_AUTHORIZATION`].

use std::fmt;
use std::ops::Range;

/// Device identifier bytes.
pub const DEVICE_ID_BYTES: Range<usize> = 0x07EC..0x07F0;
/// Authorization number, big-endian `u32`.
pub const AUTHORIZATION_BYTES: Range<usize> = 0x07F2..0x07F6;

pub const UNKNOWN_DEVICE: &str = "UNKDEV";
pub const UNKNOWN_AUTHORIZATION: &str = "UNKZUL";

/// Leading byte dropped from the device identifier.
const DEVICE_LEAD: u8 = b'G';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePrefix {
    pub device: String,
    pub tag: String,
    pub authorization: String,
}

impl fmt::Display for FilePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.device, self.tag, self.authorization)
    }
}

impl FilePrefix {
    /// `<prefix>_<suffix>`
    pub fn file_name(&self, suffix: &str) -> String {
        format!("{}_{}", self, suffix)
    }
}

/// Derive the prefix. Never fails; data shorter than the authorization field
/// yields both sentinels.
pub fn build_prefix(data: &[u8], tag: &str) -> FilePrefix {
    let (device, authorization) = if data.len() < AUTHORIZATION_BYTES.end {
        tracing::warn!(
            len = data.len(),
            "Dump too small to derive the device and authorization fields"
        );
        (
            UNKNOWN_DEVICE.to_string(),
            UNKNOWN_AUTHORIZATION.to_string(),
        )
    } else {
        (
            device_id(&data[DEVICE_ID_BYTES]),
            authorization_number(&data[AUTHORIZATION_BYTES]),
        )
    };

    FilePrefix {
        device,
        tag: sanitize_tag(tag),
        authorization,
    }
}

/// Decode the device identifier field.
pub fn device_id(raw: &[u8]) -> String {
    let relevant = match raw.split_first() {
        Some((&DEVICE_LEAD, rest)) => rest,
        _ => raw,
    };

    let decoded: String = relevant
        .iter()
        .filter(|&&b| b != 0x00 && b != 0xFF)
        .map(|&b| {
            if (32..=126).contains(&b) {
                b as char
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        UNKNOWN_DEVICE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decode the authorization field as a decimal number.
pub fn authorization_number(raw: &[u8]) -> String {
    let Ok(bytes) = <[u8; 4]>::try_from(raw) else {
        return UNKNOWN_AUTHORIZATION.to_string();
    };
    if bytes.iter().all(|&b| b == 0x00) || bytes.iter().all(|&b| b == 0xFF) {
        return UNKNOWN_AUTHORIZATION.to_string();
    }
    u32::from_be_bytes(bytes).to_string()
}

/// Keep alphanumerics and `-_.`, replace everything else with `_`.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
