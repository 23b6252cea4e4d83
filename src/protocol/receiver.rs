//! Framed transfer receiver
//!
//! Pulls one binary frame out of the mixed text/binary stream:
//!
//! ```text
//! AwaitingMarker ──start marker──▶ ReceivingPayload ──N bytes──▶ DrainingTrailer ──▶ Done
//!       │                                 │                            (quiet or
//!       └── ERROR line / deadline ──▶ Failed ◀── stall / I/O / cancel   deadline)
//! ```
//!
//! Each call to [`FrameReceiver::step`] is one polling point. The state value
//! carries everything the transfer needs, so a receiver can be driven step by
//! step in tests or run to completion with [`FrameReceiver::run`].
//!
//! Deadlines are wall-clock and re-armed per state: the marker deadline on
//! entry to `AwaitingMarker`, the trailer deadline on entry to
//! `DrainingTrailer`. The payload state has an optional stall timeout that
//! fires when no byte arrives for the configured time.

use super::{classify_line, FrameKind, LineKind, MarkerPair};
use crate::adapters::ByteChannel;
use crate::config::TransferSettings;
use crate::error::{AppResult, ReaderError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest single read while receiving the payload.
const READ_CHUNK: usize = 1024;
/// Progress is logged every time this many bytes have arrived.
const PROGRESS_STEP: usize = 1024;

/// Timing of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub marker_timeout: Duration,
    pub trailer_timeout: Duration,
    pub poll_interval: Duration,
    /// `None` waits for the payload indefinitely
    pub payload_stall_timeout: Option<Duration>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::from(&TransferSettings::default())
    }
}

impl From<&TransferSettings> for ReceiverConfig {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            marker_timeout: settings.marker_timeout(),
            trailer_timeout: settings.trailer_timeout(),
            poll_interval: settings.poll_interval(),
            payload_stall_timeout: settings.payload_stall_timeout(),
        }
    }
}

/// Shared abort flag, checked at every polling point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next transfer.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A finished frame. `payload` may be short if the channel closed early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub markers: MarkerPair,
    pub payload: Vec<u8>,
    pub end_marker_seen: bool,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.payload.len() == self.kind.payload_len()
    }
}

/// Receiver state machine
#[derive(Debug)]
pub enum ReceiverState {
    AwaitingMarker {
        deadline: Instant,
    },
    ReceivingPayload {
        markers: MarkerPair,
        buffer: Vec<u8>,
        started: Instant,
        last_data: Instant,
    },
    DrainingTrailer {
        markers: MarkerPair,
        buffer: Vec<u8>,
        deadline: Instant,
        /// Trailer bytes have started to arrive
        receiving: bool,
        end_marker_seen: bool,
    },
    Done(Frame),
    Failed(ReaderError),
}

impl ReceiverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiverState::Done(_) | ReceiverState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReceiverState::AwaitingMarker { .. } => "AwaitingMarker",
            ReceiverState::ReceivingPayload { .. } => "ReceivingPayload",
            ReceiverState::DrainingTrailer { .. } => "DrainingTrailer",
            ReceiverState::Done(_) => "Done",
            ReceiverState::Failed(_) => "Failed",
        }
    }
}

/// Drives one framed transfer of a given kind.
#[derive(Debug, Clone, Copy)]
pub struct FrameReceiver {
    kind: FrameKind,
    config: ReceiverConfig,
}

impl FrameReceiver {
    pub fn new(kind: FrameKind, config: ReceiverConfig) -> Self {
        Self { kind, config }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Entry state, with the marker deadline armed from now.
    pub fn initial_state(&self) -> ReceiverState {
        ReceiverState::AwaitingMarker {
            deadline: Instant::now() + self.config.marker_timeout,
        }
    }

    /// Advance by one polling point.
    pub fn step<C: ByteChannel + ?Sized>(
        &self,
        state: ReceiverState,
        channel: &mut C,
    ) -> ReceiverState {
        match state {
            ReceiverState::AwaitingMarker { deadline } => self.await_marker(deadline, channel),
            ReceiverState::ReceivingPayload {
                markers,
                buffer,
                started,
                last_data,
            } => self.receive_payload(markers, buffer, started, last_data, channel),
            ReceiverState::DrainingTrailer {
                markers,
                buffer,
                deadline,
                receiving,
                end_marker_seen,
            } => self.drain_trailer(markers, buffer, deadline, receiving, end_marker_seen, channel),
            terminal => terminal,
        }
    }

    /// Run until `Done` or `Failed`.
    ///
    /// A short payload is still returned here; see [`FrameReceiver::receive`]
    /// for the length-checked variant.
    pub fn run<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        cancel: &CancelToken,
    ) -> AppResult<Frame> {
        if !channel.is_open() {
            return Err(ReaderError::ChannelUnavailable);
        }

        let mut state = self.initial_state();
        loop {
            if cancel.is_cancelled() {
                debug!(state = state.name(), "Transfer cancelled, dropping partial buffer");
                return Err(ReaderError::Cancelled);
            }
            state = match self.step(state, channel) {
                ReceiverState::Done(frame) => return Ok(frame),
                ReceiverState::Failed(err) => return Err(err),
                next => next,
            };
        }
    }

    /// Run the transfer and insist on the exact payload length.
    ///
    /// A short or long payload is discarded and reported as
    /// [`ReaderError::LengthMismatch`].
    pub fn receive<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        cancel: &CancelToken,
    ) -> AppResult<Vec<u8>> {
        let frame = self.run(channel, cancel)?;
        if !frame.is_complete() {
            return Err(ReaderError::LengthMismatch {
                kind: self.kind.name(),
                expected: self.kind.payload_len(),
                actual: frame.len(),
            });
        }
        Ok(frame.payload)
    }

    fn await_marker<C: ByteChannel + ?Sized>(
        &self,
        deadline: Instant,
        channel: &mut C,
    ) -> ReceiverState {
        if Instant::now() >= deadline {
            return ReceiverState::Failed(ReaderError::MarkerTimeout {
                kind: self.kind.name(),
                timeout: self.config.marker_timeout,
            });
        }

        let available = match channel.bytes_available() {
            Ok(n) => n,
            Err(err) => return ReceiverState::Failed(err.into()),
        };
        if available == 0 {
            std::thread::sleep(self.config.poll_interval);
            return ReceiverState::AwaitingMarker { deadline };
        }

        let line = match channel.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => return ReceiverState::AwaitingMarker { deadline },
            Err(err) => return ReceiverState::Failed(err.into()),
        };
        if !line.is_empty() {
            debug!("< {}", line);
        }

        match classify_line(&line, self.kind) {
            LineKind::StartMarker(markers) => {
                info!(
                    kind = %self.kind,
                    marker = markers.start,
                    "Receiving {} ({} bytes)",
                    self.kind,
                    self.kind.payload_len()
                );
                let now = Instant::now();
                ReceiverState::ReceivingPayload {
                    markers,
                    buffer: Vec::with_capacity(self.kind.payload_len()),
                    started: now,
                    last_data: now,
                }
            }
            LineKind::DeviceError(line) => ReceiverState::Failed(ReaderError::DeviceError(line)),
            _ => ReceiverState::AwaitingMarker { deadline },
        }
    }

    fn receive_payload<C: ByteChannel + ?Sized>(
        &self,
        markers: MarkerPair,
        mut buffer: Vec<u8>,
        started: Instant,
        last_data: Instant,
        channel: &mut C,
    ) -> ReceiverState {
        let expected = self.kind.payload_len();
        let mut chunk = [0u8; READ_CHUNK];
        let wanted = (expected - buffer.len()).min(READ_CHUNK);

        match channel.read_bytes(&mut chunk[..wanted]) {
            Ok(0) => {
                if let Some(limit) = self.config.payload_stall_timeout {
                    let idle = last_data.elapsed();
                    if idle >= limit {
                        return ReceiverState::Failed(ReaderError::PayloadStalled {
                            received: buffer.len(),
                            expected,
                            idle,
                        });
                    }
                }
                std::thread::sleep(self.config.poll_interval);
                ReceiverState::ReceivingPayload {
                    markers,
                    buffer,
                    started,
                    last_data,
                }
            }
            Ok(n) => {
                let before = buffer.len();
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() / PROGRESS_STEP > before / PROGRESS_STEP {
                    debug!(
                        "Progress: {}% ({}/{}) - {:.1}s",
                        buffer.len() * 100 / expected,
                        buffer.len(),
                        expected,
                        started.elapsed().as_secs_f32()
                    );
                }

                if buffer.len() < expected {
                    return ReceiverState::ReceivingPayload {
                        markers,
                        buffer,
                        started,
                        last_data: Instant::now(),
                    };
                }

                info!(
                    "Done, received {} bytes in {:.1}s",
                    buffer.len(),
                    started.elapsed().as_secs_f32()
                );
                ReceiverState::DrainingTrailer {
                    markers,
                    buffer,
                    deadline: Instant::now() + self.config.trailer_timeout,
                    receiving: false,
                    end_marker_seen: false,
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(
                    received = buffer.len(),
                    expected, "Channel closed during payload"
                );
                ReceiverState::Done(Frame {
                    kind: self.kind,
                    markers,
                    payload: buffer,
                    end_marker_seen: false,
                })
            }
            Err(err) => ReceiverState::Failed(err.into()),
        }
    }

    fn drain_trailer<C: ByteChannel + ?Sized>(
        &self,
        markers: MarkerPair,
        buffer: Vec<u8>,
        deadline: Instant,
        receiving: bool,
        mut end_marker_seen: bool,
        channel: &mut C,
    ) -> ReceiverState {
        let done = |buffer: Vec<u8>, end_marker_seen: bool| {
            ReceiverState::Done(Frame {
                kind: self.kind,
                markers,
                payload: buffer,
                end_marker_seen,
            })
        };

        // The trailer is advisory: channel trouble here ends the transfer, not fails it.
        let available = match channel.bytes_available() {
            Ok(n) => n,
            Err(err) => {
                debug!("Trailer drain stopped: {}", err);
                return done(buffer, end_marker_seen);
            }
        };

        if available == 0 {
            if receiving || Instant::now() >= deadline {
                if !end_marker_seen {
                    debug!(expected = markers.end, "No end marker received");
                }
                return done(buffer, end_marker_seen);
            }
            std::thread::sleep(self.config.poll_interval);
            return ReceiverState::DrainingTrailer {
                markers,
                buffer,
                deadline,
                receiving,
                end_marker_seen,
            };
        }

        match channel.read_line() {
            Ok(Some(line)) => {
                if !line.is_empty() {
                    debug!("< {}", line);
                }
                if line == markers.end {
                    info!("End marker received: {}", markers.end);
                    end_marker_seen = true;
                }
            }
            Ok(None) => {}
            Err(err) => {
                debug!("Trailer drain stopped: {}", err);
                return done(buffer, end_marker_seen);
            }
        }

        ReceiverState::DrainingTrailer {
            markers,
            buffer,
            deadline,
            receiving: true,
            end_marker_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{framed_response, ScriptedChannel};
    use tracing_test::traced_test;

    fn fast_config() -> ReceiverConfig {
        ReceiverConfig {
            marker_timeout: Duration::from_millis(150),
            trailer_timeout: Duration::from_millis(60),
            poll_interval: Duration::from_millis(5),
            payload_stall_timeout: Some(Duration::from_millis(80)),
        }
    }

    fn status_payload() -> Vec<u8> {
        (0..=255u8).collect()
    }

    #[test]
    fn test_status_frame_round_trip() {
        let mut channel = ScriptedChannel::new()
            .with_line("sendstatus ok")
            .with_bytes(&framed_response(
                "STATUS_START",
                &status_payload(),
                Some("STATUS_END"),
            ));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());

        let frame = receiver.run(&mut channel, &CancelToken::new()).unwrap();
        assert_eq!(frame.payload, status_payload());
        assert!(frame.is_complete());
        assert!(frame.end_marker_seen);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_payload_containing_newlines_and_marker_text() {
        let mut payload = vec![b'\n'; 256];
        payload[..10].copy_from_slice(b"STATUS_END");
        let mut channel = ScriptedChannel::new().with_bytes(&framed_response(
            "STATUS_BEGIN",
            &payload,
            None,
        ));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());

        let bytes = receiver.receive(&mut channel, &CancelToken::new()).unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    #[traced_test]
    fn test_legacy_start_marker_expects_legacy_end_marker() {
        let payload = vec![0x5A; 8192];
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("BIN_START", &payload, None))
            .with_line("BINARY_END");
        let receiver = FrameReceiver::new(FrameKind::DataMemory, fast_config());

        let frame = receiver.run(&mut channel, &CancelToken::new()).unwrap();
        assert_eq!(frame.markers.end, "BIN_END");
        assert!(!frame.end_marker_seen);
        assert!(!logs_contain("End marker received"));

        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("BIN_START", &payload, Some("BIN_END")));
        let frame = receiver.run(&mut channel, &CancelToken::new()).unwrap();
        assert!(frame.end_marker_seen);
        assert!(logs_contain("End marker received: BIN_END"));
    }

    #[test]
    fn test_error_line_fails_in_the_step_that_reads_it() {
        let mut channel = ScriptedChannel::new().with_line("ERROR: no DS2506 found");
        let receiver = FrameReceiver::new(
            FrameKind::DataMemory,
            ReceiverConfig {
                marker_timeout: Duration::from_secs(5),
                ..fast_config()
            },
        );

        let start = Instant::now();
        let state = receiver.step(receiver.initial_state(), &mut channel);
        assert!(start.elapsed() < Duration::from_secs(1));
        match state {
            ReceiverState::Failed(ReaderError::DeviceError(line)) => {
                assert_eq!(line, "ERROR: no DS2506 found")
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_noise_lines_before_marker_are_skipped() {
        let mut channel = ScriptedChannel::new()
            .with_line("Reading data memory...")
            .with_line("")
            .with_bytes(&framed_response("STATUS_START", &status_payload(), None));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());

        let mut state = receiver.initial_state();
        state = receiver.step(state, &mut channel);
        assert_eq!(state.name(), "AwaitingMarker");
        state = receiver.step(state, &mut channel);
        assert_eq!(state.name(), "AwaitingMarker");
        state = receiver.step(state, &mut channel);
        assert_eq!(state.name(), "ReceivingPayload");
        state = receiver.step(state, &mut channel);
        assert_eq!(state.name(), "DrainingTrailer");
    }

    #[test]
    fn test_marker_timeout() {
        let mut channel = ScriptedChannel::new();
        let receiver = FrameReceiver::new(FrameKind::DataMemory, fast_config());

        let start = Instant::now();
        let err = receiver.run(&mut channel, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ReaderError::MarkerTimeout { .. }));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_short_payload_on_closed_channel_is_discarded() {
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("BINARY_START", &[0u8; 100], None))
            .eof_when_drained();
        let receiver = FrameReceiver::new(FrameKind::DataMemory, fast_config());

        let frame = receiver.run(&mut channel, &CancelToken::new()).unwrap();
        assert_eq!(frame.len(), 100);
        assert!(!frame.is_complete());

        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("BINARY_START", &[0u8; 100], None))
            .eof_when_drained();
        match receiver.receive(&mut channel, &CancelToken::new()) {
            Err(ReaderError::LengthMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 8192);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_stalled_payload_times_out() {
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("STATUS_START", &[0u8; 10], None));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());

        match receiver.run(&mut channel, &CancelToken::new()) {
            Err(ReaderError::PayloadStalled {
                received, expected, ..
            }) => {
                assert_eq!(received, 10);
                assert_eq!(expected, 256);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_unbounded_payload_wait_keeps_receiving() {
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("STATUS_START", &[0u8; 10], None));
        let receiver = FrameReceiver::new(
            FrameKind::StatusMemory,
            ReceiverConfig {
                payload_stall_timeout: None,
                ..fast_config()
            },
        );

        let mut state = receiver.initial_state();
        for _ in 0..40 {
            state = receiver.step(state, &mut channel);
        }
        assert_eq!(state.name(), "ReceivingPayload");

        channel.push_bytes(&[1u8; 246]);
        state = receiver.step(state, &mut channel);
        assert_eq!(state.name(), "DrainingTrailer");
    }

    #[test]
    fn test_missing_trailer_still_succeeds() {
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("STATUS_START", &status_payload(), None));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());

        let start = Instant::now();
        let frame = receiver.run(&mut channel, &CancelToken::new()).unwrap();
        assert!(!frame.end_marker_seen);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_cancelled_transfer_discards_buffer() {
        let mut channel = ScriptedChannel::new()
            .with_bytes(&framed_response("STATUS_START", &status_payload(), None));
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = receiver.run(&mut channel, &cancel).unwrap_err();
        assert!(matches!(err, ReaderError::Cancelled));
    }

    #[test]
    fn test_closed_channel_is_unavailable() {
        let mut channel = ScriptedChannel::new().closed();
        let receiver = FrameReceiver::new(FrameKind::StatusMemory, fast_config());
        let err = receiver.run(&mut channel, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ReaderError::ChannelUnavailable));
    }

    #[test]
    fn test_config_from_settings() {
        let config = ReceiverConfig::default();
        assert_eq!(config.marker_timeout, Duration::from_secs(5));
        assert_eq!(config.trailer_timeout, Duration::from_secs(2));
        assert_eq!(config.payload_stall_timeout, Some(Duration::from_secs(10)));
    }
}
