//! Consolidated dump report.
//!
//! Sections appear in a fixed order. A section whose input is missing is
//! replaced by a one-line notice, so the report always has the same shape.

use crate::analysis::{analyze_status, scan_pages};
use crate::export::hexdump::{render_lines, HexCase};
use crate::memory::{DataImage, StatusImage};
use crate::rom::RomCheck;

pub const REPORT_TITLE: &str = "DS2506 Dump Report";

pub const NO_ROM_NOTICE: &str = "ROM code could not be determined.";
pub const NO_PAGES_NOTICE: &str = "Page usage unavailable (no data memory image).";
pub const NO_DATA_NOTICE: &str = "No data memory data available.";
pub const NO_STATUS_NOTICE: &str = "No status memory data available.";
pub const NO_ANALYSIS_NOTICE: &str = "Status analysis unavailable (no status memory image).";

/// Whatever the workflow managed to collect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportInputs<'a> {
    pub rom: Option<&'a RomCheck>,
    pub data: Option<&'a DataImage>,
    pub status: Option<&'a StatusImage>,
}

/// Compose the report text. `created` is printed verbatim in the header.
pub fn compose_report(inputs: &ReportInputs<'_>, created: &str) -> String {
    let mut lines: Vec<String> = vec![
        REPORT_TITLE.to_string(),
        format!("Created: {}", created),
        String::new(),
    ];

    lines.push("=== ROM Code ===".to_string());
    match inputs.rom {
        Some(rom) => lines.extend(rom.summary_lines()),
        None => lines.push(NO_ROM_NOTICE.to_string()),
    }
    lines.push(String::new());

    match inputs.data {
        Some(data) => {
            let usage = scan_pages(data.as_bytes());
            lines.push("=== Used Pages (at least one byte != FF) ===".to_string());
            for page in &usage.used {
                lines.push(page.heading());
                lines.extend(page.hex_lines.iter().cloned());
                lines.push(String::new());
            }
            lines.push(usage.total_line());
        }
        None => lines.push(NO_PAGES_NOTICE.to_string()),
    }
    lines.push(String::new());

    match inputs.data {
        Some(data) => {
            lines.push(format!(
                "=== DATA MEMORY HEXDUMP ({} Bytes) ===",
                DataImage::SIZE
            ));
            lines.extend(render_lines(data.as_bytes(), 0, HexCase::Upper));
        }
        None => lines.push(NO_DATA_NOTICE.to_string()),
    }
    lines.push(String::new());

    match inputs.status {
        Some(status) => {
            lines.push(format!(
                "=== STATUS MEMORY HEXDUMP ({} Bytes) ===",
                StatusImage::SIZE
            ));
            lines.extend(render_lines(status.as_bytes(), 0, HexCase::Upper));
        }
        None => lines.push(NO_STATUS_NOTICE.to_string()),
    }
    lines.push(String::new());

    match inputs.status {
        Some(status) => lines.extend(analyze_status(status).lines()),
        None => lines.push(NO_ANALYSIS_NOTICE.to_string()),
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
