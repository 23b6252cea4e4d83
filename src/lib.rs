//! # DS2506 Reader Library
//!
//! This crate reads the memory of a DS2506 EPROM through a bridge microcontroller on a
//! serial line, validates what arrives and turns it into files. The library holds all
//! of the logic; the `ds2506-reader` binary (`main.rs`) is a thin CLI on top.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: the `ByteChannel` trait plus the serial implementation and an
//!   in-memory scripted channel for tests.
//! - **`protocol`**: command tokens, frame markers, the line tokenizer and the framed
//!   transfer receiver (`protocol::receiver`).
//! - **`crc`** / **`rom`**: the CRC-8 checksum and the 8-byte identifier block.
//! - **`memory`**: fixed-size data and status images.
//! - **`analysis`**: page usage scanner and status bitfield analyzer.
//! - **`prefix`**: file name prefix for batch exports.
//! - **`export`**: hex dump, report and C header formatters.
//! - **`sink`**: where finished artifacts are written.
//! - **`session`**: `DumpSession`, the workflows tying everything together.
//! - **`config`** / **`logging`** / **`error`**: figment configuration, tracing setup and
//!   the `ReaderError` type.
//!
//! ## Example
//!
//! ```
//! use ds2506_reader::adapters::{framed_response, ScriptedChannel};
//! use ds2506_reader::config::TransferSettings;
//! use ds2506_reader::session::DumpSession;
//!
//! let channel = ScriptedChannel::new()
//!     .respond_to("sendstatus", framed_response("STATUS_START", &[0xFF; 256], Some("STATUS_END")));
//! let mut session = DumpSession::new(channel, &TransferSettings::default());
//! let status = session.read_status_image().unwrap();
//! assert_eq!(status.as_bytes().len(), 256);
//! ```

pub mod adapters;
pub mod analysis;
pub mod config;
pub mod crc;
pub mod error;
pub mod export;
pub mod logging;
pub mod memory;
pub mod prefix;
pub mod protocol;
pub mod rom;
pub mod session;
pub mod sink;

pub use error::{AppResult, ReaderError};
