//! Text artifacts produced from the memory images.
//!
//! - [`hexdump`]: offset / hex / ASCII dumps and the matching reader
//! - [`report`]: the consolidated dump report
//! - [`source_array`]: a C header holding the used pages and the status memory

pub mod hexdump;
pub mod report;
pub mod source_array;

pub use hexdump::HexCase;
pub use report::{compose_report, ReportInputs};
pub use source_array::generate_source_array;
