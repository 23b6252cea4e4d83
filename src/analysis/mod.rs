//! Pure analyzers over the memory images.

pub mod pages;
pub mod status;

pub use pages::{scan_pages, PageUsage, UsedPage};
pub use status::{analyze_status, analyze_status_bytes, format_page_ranges, StatusAnalysis};
