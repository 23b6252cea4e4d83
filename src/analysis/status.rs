//! Status memory analyzer
//!
//! Layout of the 256-byte status memory as far as this reader interprets it:
//!
//! | Bytes       | Meaning                                                  |
//! |-------------|----------------------------------------------------------|
//! | 0x00..0x1F  | write-protect bits, one per page, bit 0 = page `8*byte`  |
//! | 0x20..0x3F  | redirection / EPROM bytes, 0xFF = not set                |
//!
//! Protection bits are active low: a cleared bit marks the page.
//!
//! The copy-protect scan looks at bytes `0x100 + page/8`, past the end of a
//! 256-byte image, so it always reports no pages. It is kept as is because the
//! intended location of those bits is not known.

use crate::memory::{StatusImage, PAGE_COUNT};
use std::fmt;
use std::ops::Range;

/// Bytes holding the write-protect bits.
pub const WRITE_PROTECT_BYTES: Range<usize> = 0x00..0x20;
/// Redirection / EPROM bytes.
pub const REDIRECTION_BYTES: Range<usize> = 0x20..0x40;
/// First byte of the (heuristic) copy-protect bits.
pub const COPY_PROTECT_BASE: usize = 0x100;

/// Findings from one status image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAnalysis {
    /// Pages whose write-protect bit is cleared
    pub write_protected: Vec<usize>,
    /// Raw redirection / EPROM bytes
    pub redirection_bytes: Vec<u8>,
    /// Redirection bytes that differ from 0xFF
    pub redirection_set: usize,
    /// Pages whose copy-protect bit is cleared
    pub copy_protected: Vec<usize>,
}

/// Analyze a status image.
pub fn analyze_status(status: &StatusImage) -> StatusAnalysis {
    analyze_status_bytes(status.as_bytes())
}

/// Analyze raw status bytes; lookups past the end of `status` are skipped.
pub fn analyze_status_bytes(status: &[u8]) -> StatusAnalysis {
    let write_protected = cleared_page_bits(status, WRITE_PROTECT_BYTES.start, |byte| {
        WRITE_PROTECT_BYTES.contains(&byte)
    });

    let redirection_bytes = status
        .get(REDIRECTION_BYTES.start..REDIRECTION_BYTES.end.min(status.len()))
        .unwrap_or_default()
        .to_vec();
    let redirection_set = redirection_bytes.iter().filter(|&&b| b != 0xFF).count();

    let copy_protected = cleared_page_bits(status, COPY_PROTECT_BASE, |_| true);

    StatusAnalysis {
        write_protected,
        redirection_bytes,
        redirection_set,
        copy_protected,
    }
}

/// Pages whose bit at `base + page/8`, bit `page%8`, is 0.
fn cleared_page_bits(status: &[u8], base: usize, in_region: impl Fn(usize) -> bool) -> Vec<usize> {
    (0..PAGE_COUNT)
        .filter(|page| {
            let byte_index = base + page / 8;
            let bit = page % 8;
            in_region(byte_index)
                && status
                    .get(byte_index)
                    .is_some_and(|byte| byte & (1 << bit) == 0)
        })
        .collect()
}

/// Compress sorted page numbers into `a-b` runs, e.g. `0-3,17,40-41`.
///
/// An empty list renders as `(none)`.
pub fn format_page_ranges(pages: &[usize]) -> String {
    let mut sorted = pages.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs: Vec<(usize, usize)> = Vec::new();
    for page in sorted {
        match runs.last_mut() {
            Some((_, last)) if *last + 1 == page => *last = page,
            _ => runs.push((page, page)),
        }
    }

    if runs.is_empty() {
        return "(none)".to_string();
    }

    runs.iter()
        .map(|&(first, last)| {
            if first == last {
                first.to_string()
            } else {
                format!("{}-{}", first, last)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl StatusAnalysis {
    pub fn lines(&self) -> Vec<String> {
        let redirection_hex: Vec<String> = self
            .redirection_bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();

        vec![
            "=== Status Memory Analysis ===".to_string(),
            format!(
                "Write-Protected Pages: {}/{}",
                self.write_protected.len(),
                PAGE_COUNT
            ),
            format!(
                "  Locked pages: {}",
                format_page_ranges(&self.write_protected)
            ),
            format!(
                "EPROM/Redirection set (bytes 0x20-0x3F != FF): {}/{}",
                self.redirection_set,
                REDIRECTION_BYTES.len()
            ),
            "  Redirection/EPROM bytes:".to_string(),
            format!("   {}", redirection_hex.join(" ")),
            format!(
                "Copy-Protected Pages: {}/{}",
                self.copy_protected.len(),
                PAGE_COUNT
            ),
            format!(
                "  Copy-protected: {}",
                format_page_ranges(&self.copy_protected)
            ),
            "=== End Status Analysis ===".to_string(),
        ]
    }
}

impl fmt::Display for StatusAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
