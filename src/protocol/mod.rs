//! Bridge command vocabulary and line tokenizer.
//!
//! ## Protocol Reference
//!
//! Commands are plain text terminated by `\n`:
//! - `rom`: print the ROM code as a labeled hex listing (`ROM Code: 14 A1 ...`)
//! - `binary`: send the 8192-byte data memory as a binary frame
//! - `sendstatus`: send the 256-byte status memory as a binary frame
//! - anything else is passed through and answered with free text
//!
//! A binary frame is a start-marker line, the raw payload with no delimiters,
//! and an optional end-marker line:
//!
//! | Frame  | Start          | End          | Payload |
//! |--------|----------------|--------------|---------|
//! | data   | `BINARY_START` | `BINARY_END` | 8192    |
//! | data   | `BIN_START`    | `BIN_END`    | 8192    |
//! | status | `STATUS_START` | `STATUS_END` | 256     |
//! | status | `STATUS_BEGIN` | `STATUS_END` | 256     |
//!
//! Any line containing `ERROR` before the start marker aborts the request.

pub mod receiver;

pub use receiver::{CancelToken, Frame, FrameReceiver, ReceiverConfig, ReceiverState};

use crate::memory::{DATA_MEMORY_SIZE, STATUS_MEMORY_SIZE};
use crate::rom::ROM_LABEL;
use std::fmt;

/// Substring that marks a bridge-side failure.
pub const ERROR_TOKEN: &str = "ERROR";

/// A command line sent to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rom,
    Binary,
    SendStatus,
    /// Passed through verbatim
    Raw(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Rom => "rom",
            Command::Binary => "binary",
            Command::SendStatus => "sendstatus",
            Command::Raw(text) => text,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start marker together with the end marker it announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPair {
    pub start: &'static str,
    pub end: &'static str,
}

const DATA_MARKERS: [MarkerPair; 2] = [
    MarkerPair {
        start: "BINARY_START",
        end: "BINARY_END",
    },
    MarkerPair {
        start: "BIN_START",
        end: "BIN_END",
    },
];

const STATUS_MARKERS: [MarkerPair; 2] = [
    MarkerPair {
        start: "STATUS_START",
        end: "STATUS_END",
    },
    MarkerPair {
        start: "STATUS_BEGIN",
        end: "STATUS_END",
    },
];

/// The two binary frames the bridge can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    DataMemory,
    StatusMemory,
}

impl FrameKind {
    /// Command that requests this frame.
    pub fn command(self) -> Command {
        match self {
            FrameKind::DataMemory => Command::Binary,
            FrameKind::StatusMemory => Command::SendStatus,
        }
    }

    /// Exact payload length.
    pub fn payload_len(self) -> usize {
        match self {
            FrameKind::DataMemory => DATA_MEMORY_SIZE,
            FrameKind::StatusMemory => STATUS_MEMORY_SIZE,
        }
    }

    /// Accepted marker pairs, primary spelling first.
    pub fn markers(self) -> &'static [MarkerPair] {
        match self {
            FrameKind::DataMemory => &DATA_MARKERS,
            FrameKind::StatusMemory => &STATUS_MARKERS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::DataMemory => "data memory",
            FrameKind::StatusMemory => "status memory",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a received text line means for a transfer of a given [`FrameKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// One of the accepted start markers
    StartMarker(MarkerPair),
    /// One of the end markers of this frame kind
    EndMarker(&'static str),
    /// The bridge reported a failure
    DeviceError(String),
    /// A `ROM Code` listing
    RomListing(String),
    Blank,
    Other(String),
}

/// Classify `line` (already stripped of its terminator).
///
/// Markers must match the whole trimmed line; `ERROR` matches anywhere.
pub fn classify_line(line: &str, kind: FrameKind) -> LineKind {
    let line = line.trim();
    if line.is_empty() {
        return LineKind::Blank;
    }
    if let Some(pair) = kind.markers().iter().find(|pair| pair.start == line) {
        return LineKind::StartMarker(*pair);
    }
    if let Some(pair) = kind.markers().iter().find(|pair| pair.end == line) {
        return LineKind::EndMarker(pair.end);
    }
    if line.contains(ERROR_TOKEN) {
        return LineKind::DeviceError(line.to_string());
    }
    if line.starts_with(ROM_LABEL) {
        return LineKind::RomListing(line.to_string());
    }
    LineKind::Other(line.to_string())
}
