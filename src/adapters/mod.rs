// src/adapters/mod.rs

//! Byte-stream channels to the bridge microcontroller.
//!
//! The bridge speaks newline-terminated text with raw binary frames mixed in,
//! so a channel must hand out whole lines and raw bytes from the same stream
//! without one reader consuming data meant for the other.

use std::io;

pub mod serial_adapter;
pub use serial_adapter::{list_ports, SerialChannel};

pub mod mock_adapter;
pub use mock_adapter::{framed_response, ScriptedChannel};

/// Synchronous, single-owner access to the bridge stream.
///
/// Reads never block longer than the channel's own short read timeout; the
/// framed receiver builds its wall-clock deadlines on top of that.
pub trait ByteChannel {
    /// Whether the underlying port is open.
    fn is_open(&self) -> bool;

    /// Send `line` followed by the line delimiter.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Bytes that can be read right now without waiting.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one line without its terminator.
    ///
    /// `Ok(None)` means nothing arrived within the read timeout. If the timeout hits
    /// mid-line, the partial line is returned.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Read raw bytes into `buf`.
    ///
    /// `Ok(0)` means nothing arrived within the read timeout. A closed stream is
    /// reported as [`io::ErrorKind::UnexpectedEof`].
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        (**self).read_line()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_bytes(buf)
    }
}

/// Decode a received line: lossy UTF-8, terminator and surrounding whitespace removed.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}
