//! Custom error types for the reader.
//!
//! `ReaderError` is the single error type of the library. It groups the failure
//! classes a dump workflow can run into:
//!
//! - **Channel**: the serial bridge is not open, or serial support was compiled out.
//! - **Protocol**: no start marker within the deadline, an `ERROR` line from the bridge,
//!   a stalled payload, or a transfer cancelled by the user.
//! - **Length**: a payload or image whose size differs from the fixed chip geometry.
//!   Such buffers are discarded and never handed to the analyzers.
//! - **Configuration / I/O**: figment extraction errors, semantic validation errors and
//!   plain `std::io::Error`s from the channel or the artifact sink, and hex dumps
//!   that cannot be read back.
//!
//! Nothing in the library terminates the process; every variant is reported at the
//! point of detection and the workflow decides whether to continue.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the reader error type.
pub type AppResult<T> = std::result::Result<T, ReaderError>;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port not connected")]
    ChannelUnavailable,

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("No {kind} start marker received within {timeout:?}")]
    MarkerTimeout {
        kind: &'static str,
        timeout: Duration,
    },

    #[error("Bridge reported an error: {0}")]
    DeviceError(String),

    #[error("Payload stalled after {received}/{expected} bytes (no data for {idle:?})")]
    PayloadStalled {
        received: usize,
        expected: usize,
        idle: Duration,
    },

    #[error("Wrong {kind} length ({actual} instead of {expected}), payload discarded")]
    LengthMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid hex dump at line {line}: {reason}")]
    InvalidHexDump { line: usize, reason: String },
}

impl From<figment::Error> for ReaderError {
    fn from(err: figment::Error) -> Self {
        ReaderError::Config(Box::new(err))
    }
}

impl ReaderError {
    /// True for failures of a single framed transfer.
    ///
    /// These abandon the transfer but leave the channel usable, so a workflow may go on
    /// with its remaining steps.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(
            self,
            ReaderError::MarkerTimeout { .. }
                | ReaderError::DeviceError(_)
                | ReaderError::PayloadStalled { .. }
                | ReaderError::LengthMismatch { .. }
        )
    }
}
