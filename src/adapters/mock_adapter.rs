//! Scripted channel for testing
//!
//! Stands in for the bridge without hardware. It provides:
//! - inbound bytes queued up front or released when a command line is written
//! - a log of every line written, for test verification
//! - end-of-stream and closed-port simulation

use super::{decode_line, ByteChannel};
use std::collections::{HashMap, VecDeque};
use std::io;

/// In-memory bridge double
///
/// # Example
///
/// ```
/// use ds2506_reader::adapters::{ByteChannel, ScriptedChannel};
///
/// let mut channel = ScriptedChannel::new().respond_to("rom", b"ROM Code: 14 A1\n".to_vec());
/// channel.write_line("rom").unwrap();
/// assert_eq!(channel.read_line().unwrap().as_deref(), Some("ROM Code: 14 A1"));
/// assert_eq!(channel.written_lines(), &["rom".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    inbound: VecDeque<u8>,
    responses: HashMap<String, VecDeque<Vec<u8>>>,
    written: Vec<String>,
    eof_when_drained: bool,
    closed: bool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text line (a `\n` is appended).
    pub fn with_line(mut self, line: &str) -> Self {
        self.push_line(line);
        self
    }

    /// Queue raw bytes.
    pub fn with_bytes(mut self, bytes: &[u8]) -> Self {
        self.push_bytes(bytes);
        self
    }

    /// Release `response` the next time `command` is written.
    ///
    /// Registering the same command again queues another response for the
    /// following write.
    pub fn respond_to(mut self, command: &str, response: Vec<u8>) -> Self {
        self.responses
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Report end of stream once the queued bytes are consumed.
    pub fn eof_when_drained(mut self) -> Self {
        self.eof_when_drained = true;
        self
    }

    /// Start out with the port closed.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn push_line(&mut self, line: &str) {
        self.push_bytes(line.as_bytes());
        self.inbound.push_back(b'\n');
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Every line written so far, in order.
    pub fn written_lines(&self) -> &[String] {
        &self.written
    }

    /// Bytes queued but not yet read.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "scripted channel closed",
            ));
        }
        Ok(())
    }

    fn nothing_available(&self) -> io::Result<()> {
        if self.eof_when_drained {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
}

impl ByteChannel for ScriptedChannel {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.written.push(line.to_string());
        if let Some(response) = self
            .responses
            .get_mut(line)
            .and_then(|queue| queue.pop_front())
        {
            self.push_bytes(&response);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.ensure_open()?;
        Ok(self.inbound.len())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.ensure_open()?;
        if self.inbound.is_empty() {
            self.nothing_available()?;
            return Ok(None);
        }

        let mut raw = Vec::new();
        while let Some(byte) = self.inbound.pop_front() {
            if byte == b'\n' {
                break;
            }
            raw.push(byte);
        }
        Ok(Some(decode_line(&raw)))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        if self.inbound.is_empty() {
            self.nothing_available()?;
            return Ok(0);
        }

        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Bytes of a framed response: start line, payload, optional end line.
pub fn framed_response(start: &str, payload: &[u8], end: Option<&str>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(start.len() + payload.len() + 16);
    bytes.extend_from_slice(start.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(payload);
    if let Some(end) = end {
        bytes.extend_from_slice(end.as_bytes());
        bytes.push(b'\n');
    }
    bytes
}
