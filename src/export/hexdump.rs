//! Hex dump rendering and reading.
//!
//! One line per 16 bytes:
//!
//! ```text
//! 0000: 44 53 32 35 30 36 00 ff ff ff ff ff ff ff ff ff  DS2506..........
//! ```
//!
//! The offset is four hex digits, the byte column is padded to a fixed width
//! and the ASCII column shows printable bytes (0x20..=0x7E) and `.` otherwise.

use crate::error::{AppResult, ReaderError};

pub const BYTES_PER_LINE: usize = 16;
/// Width of the byte column, enough for 16 space-separated pairs.
pub const HEX_COLUMN_WIDTH: usize = BYTES_PER_LINE * 3;

/// Letter case of the hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexCase {
    Lower,
    Upper,
}

/// Printable ASCII or `.`.
pub fn ascii_char(byte: u8) -> char {
    if (32..=126).contains(&byte) {
        byte as char
    } else {
        '.'
    }
}

/// Render one line of up to 16 bytes starting at `offset`.
pub fn format_line(offset: usize, chunk: &[u8], case: HexCase) -> String {
    let hex: Vec<String> = chunk
        .iter()
        .map(|b| match case {
            HexCase::Lower => format!("{:02x}", b),
            HexCase::Upper => format!("{:02X}", b),
        })
        .collect();
    let ascii: String = chunk.iter().copied().map(ascii_char).collect();
    let hex = hex.join(" ");

    match case {
        HexCase::Lower => format!("{:04x}: {:<width$} {}", offset, hex, ascii, width = HEX_COLUMN_WIDTH),
        HexCase::Upper => format!("{:04X}: {:<width$} {}", offset, hex, ascii, width = HEX_COLUMN_WIDTH),
    }
}

/// Render `data` as lines whose offsets start at `start_offset`.
pub fn render_lines(data: &[u8], start_offset: usize, case: HexCase) -> Vec<String> {
    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| format_line(start_offset + i * BYTES_PER_LINE, chunk, case))
        .collect()
}

/// Render `data` as a complete dump, one `\n`-terminated line per 16 bytes.
pub fn render(data: &[u8], case: HexCase) -> String {
    let mut out = String::with_capacity(data.len() / BYTES_PER_LINE * 72 + 72);
    for line in render_lines(data, 0, case) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Read a dump produced by [`render`] back into bytes.
///
/// Blank lines and leading indentation are ignored. Offsets must be contiguous
/// from zero, in either letter case.
pub fn parse(text: &str) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let invalid = |reason: String| ReaderError::InvalidHexDump {
            line: line_no,
            reason,
        };

        let line = raw.trim_start();
        if line.trim().is_empty() {
            continue;
        }

        let (offset, rest) = line
            .split_once(": ")
            .ok_or_else(|| invalid("missing offset separator".to_string()))?;
        let offset = usize::from_str_radix(offset.trim(), 16)
            .map_err(|_| invalid(format!("bad offset '{}'", offset)))?;
        if offset != bytes.len() {
            return Err(invalid(format!(
                "offset {:04X} does not follow {:04X}",
                offset,
                bytes.len()
            )));
        }

        let column = rest.get(..HEX_COLUMN_WIDTH).unwrap_or(rest);
        let before = bytes.len();
        for token in column.split_whitespace() {
            let byte = u8::from_str_radix(token, 16)
                .map_err(|_| invalid(format!("bad byte '{}'", token)))?;
            bytes.push(byte);
        }
        if bytes.len() - before > BYTES_PER_LINE {
            return Err(invalid("more than 16 bytes on one line".to_string()));
        }
    }

    Ok(bytes)
}
