//! Page usage scanner
//!
//! A page counts as used when any of its 32 bytes differs from the erased
//! value 0xFF.

use crate::export::hexdump::{render_lines, HexCase};
use crate::memory::PAGE_SIZE;
use std::fmt;

const ERASED: u8 = 0xFF;

/// A page holding at least one programmed byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedPage {
    pub index: usize,
    /// Two 16-byte hex lines, indented by two spaces
    pub hex_lines: Vec<String>,
}

impl UsedPage {
    /// First byte offset of the page.
    pub fn start(&self) -> usize {
        self.index * PAGE_SIZE
    }

    /// Last byte offset of the page (inclusive).
    pub fn end(&self) -> usize {
        self.start() + PAGE_SIZE - 1
    }

    /// `Page 017 (0x0220 - 0x023F) used`
    pub fn heading(&self) -> String {
        format!(
            "Page {:03} (0x{:04X} - 0x{:04X}) used",
            self.index,
            self.start(),
            self.end()
        )
    }
}

/// Result of scanning a data image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUsage {
    pub total_pages: usize,
    pub used: Vec<UsedPage>,
}

impl PageUsage {
    pub fn used_indices(&self) -> Vec<usize> {
        self.used.iter().map(|page| page.index).collect()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn is_used(&self, index: usize) -> bool {
        self.used.iter().any(|page| page.index == index)
    }

    /// Headings and hex lines of every used page plus a total line.
    pub fn listing(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.used.len() * 3 + 1);
        for page in &self.used {
            lines.push(page.heading());
            lines.extend(page.hex_lines.iter().cloned());
        }
        lines.push(self.total_line());
        lines
    }

    pub fn total_line(&self) -> String {
        format!(
            "Total: {} used pages of {}",
            self.used.len(),
            self.total_pages
        )
    }
}

impl fmt::Display for PageUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.listing() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Whether `chunk` contains a programmed byte.
pub fn is_page_used(chunk: &[u8]) -> bool {
    chunk.iter().any(|&b| b != ERASED)
}

/// Scan `data` page by page. A trailing partial page is ignored.
pub fn scan_pages(data: &[u8]) -> PageUsage {
    let used = data
        .chunks_exact(PAGE_SIZE)
        .enumerate()
        .filter(|(_, chunk)| is_page_used(chunk))
        .map(|(index, chunk)| UsedPage {
            index,
            hex_lines: render_lines(chunk, index * PAGE_SIZE, HexCase::Upper)
                .into_iter()
                .map(|line| format!("  {}", line))
                .collect(),
        })
        .collect();

    PageUsage {
        total_pages: data.len() / PAGE_SIZE,
        used,
    }
}
