//! Dump session: drives the bridge over one channel and runs the workflows.
//!
//! `DumpSession` owns the channel for its whole lifetime, so only one transfer
//! can be in flight at a time. Every workflow follows the same pattern:
//! fetch what it needs through the framed receiver, hand the immutable images
//! to the analyzers and formatters, and pass the finished buffers to an
//! [`ArtifactSink`].
//!
//! ## Workflows
//!
//! | Method               | Fetches               | Writes                                   |
//! |----------------------|-----------------------|------------------------------------------|
//! | `save_binary`        | data                  | `binary.bin`                             |
//! | `save_hexdump`       | data                  | `hexdump.hex`                            |
//! | `save_status`        | status                | `status.bin`                             |
//! | `show_pages`         | data                  | nothing, logs the page listing           |
//! | `save_full_report`   | rom, data, status     | whatever is available + `dump_report.txt`|
//! | `save_source_array`  | rom, data, status     | `ds2506_image.h`                         |
//! | `export_all`         | rom, data, status     | all five files, prefixed                 |
//!
//! A failed transfer is reported once and never retried.

use crate::adapters::ByteChannel;
use crate::analysis::{analyze_status, scan_pages, PageUsage, StatusAnalysis};
use crate::config::TransferSettings;
use crate::error::{AppResult, ReaderError};
use crate::export::hexdump::{self, HexCase};
use crate::export::report::{compose_report, ReportInputs};
use crate::export::source_array::generate_source_array;
use crate::memory::{DataImage, StatusImage};
use crate::prefix::{build_prefix, FilePrefix};
use crate::protocol::{CancelToken, Command, FrameKind, FrameReceiver, ReceiverConfig};
use crate::rom::{IdentifierBlock, RomCheck};
use crate::sink::ArtifactSink;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const BINARY_FILE: &str = "binary.bin";
pub const HEXDUMP_FILE: &str = "hexdump.hex";
pub const STATUS_FILE: &str = "status.bin";
pub const REPORT_FILE: &str = "dump_report.txt";
pub const HEADER_FILE: &str = "ds2506_image.h";

/// Local timestamp used in report headers.
pub fn report_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// An artifact that could not be written.
#[derive(Debug)]
pub struct ArtifactFailure {
    pub name: String,
    pub error: io::Error,
}

/// Outcome of a multi-artifact workflow.
#[derive(Debug, Default)]
pub struct ExportSummary {
    /// Set by `export_all` only
    pub prefix: Option<FilePrefix>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<ArtifactFailure>,
}

impl ExportSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, name: &str, result: io::Result<PathBuf>) {
        match result {
            Ok(path) => self.written.push(path),
            Err(error) => {
                warn!(artifact = name, %error, "Failed to write artifact");
                self.failed.push(ArtifactFailure {
                    name: name.to_string(),
                    error,
                });
            }
        }
    }
}

/// Keep going after a failed transfer, but not after cancellation or a lost channel.
fn tolerate<T>(result: AppResult<T>) -> AppResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_transfer_failure() => Ok(None),
        Err(err) => Err(err),
    }
}

pub struct DumpSession<C: ByteChannel> {
    channel: C,
    receiver: ReceiverConfig,
    command_settle: Duration,
    cancel: CancelToken,
}

impl<C: ByteChannel> DumpSession<C> {
    pub fn new(channel: C, settings: &TransferSettings) -> Self {
        Self {
            channel,
            receiver: ReceiverConfig::from(settings),
            command_settle: settings.command_settle(),
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally controlled cancel flag (e.g. wired to Ctrl-C).
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    fn ensure_open(&self) -> AppResult<()> {
        if !self.channel.is_open() {
            warn!("Serial port not connected");
            return Err(ReaderError::ChannelUnavailable);
        }
        Ok(())
    }

    /// Send a command line and collect the text that comes back.
    ///
    /// Collection stops after one poll interval without new data.
    pub fn send_raw(&mut self, command: &str) -> AppResult<Vec<String>> {
        self.ensure_open()?;
        debug!("> {}", command);
        self.channel.write_line(command)?;
        thread::sleep(self.command_settle);

        let mut lines = Vec::new();
        loop {
            if self.cancel.is_cancelled() {
                return Err(ReaderError::Cancelled);
            }
            if self.channel.bytes_available()? == 0 {
                thread::sleep(self.receiver.poll_interval);
                if self.channel.bytes_available()? == 0 {
                    break;
                }
            }
            match self.channel.read_line()? {
                Some(line) => {
                    debug!("< {}", line);
                    lines.push(line);
                }
                None => break,
            }
        }
        Ok(lines)
    }

    /// Ask the bridge for the identifier block and validate its checksum.
    ///
    /// Returns `None` when the listing cannot be parsed or the channel fails.
    pub fn read_identifier(&mut self) -> Option<RomCheck> {
        let lines = match self.send_raw(Command::Rom.as_str()) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(error = %err, "Could not query the ROM code");
                return None;
            }
        };

        let Some(block) = IdentifierBlock::parse_lines(&lines) else {
            warn!("Could not parse the ROM code (not exactly 8 bytes)");
            return None;
        };

        let check = block.check();
        for line in check.summary_lines() {
            info!("{}", line);
        }
        Some(check)
    }

    fn transfer(&mut self, kind: FrameKind) -> AppResult<Vec<u8>> {
        self.ensure_open()?;
        info!(%kind, "Sending '{}' command", kind.command());
        self.channel.write_line(kind.command().as_str())?;

        let receiver = FrameReceiver::new(kind, self.receiver);
        receiver
            .receive(&mut self.channel, &self.cancel)
            .inspect_err(|err| warn!(%kind, error = %err, "Transfer failed"))
    }

    /// Fetch the 8192-byte data memory.
    pub fn read_data_image(&mut self) -> AppResult<DataImage> {
        DataImage::new(self.transfer(FrameKind::DataMemory)?)
    }

    /// Fetch the 256-byte status memory.
    pub fn read_status_image(&mut self) -> AppResult<StatusImage> {
        StatusImage::new(self.transfer(FrameKind::StatusMemory)?)
    }

    pub fn save_binary<S: ArtifactSink>(&mut self, sink: &mut S) -> AppResult<PathBuf> {
        let data = self.read_data_image()?;
        Ok(sink.write_bytes(BINARY_FILE, data.as_bytes())?)
    }

    pub fn save_hexdump<S: ArtifactSink>(&mut self, sink: &mut S) -> AppResult<PathBuf> {
        let data = self.read_data_image()?;
        let text = hexdump::render(data.as_bytes(), HexCase::Lower);
        Ok(sink.write_text(HEXDUMP_FILE, &text)?)
    }

    /// Save the status memory and return its analysis alongside the path.
    pub fn save_status<S: ArtifactSink>(
        &mut self,
        sink: &mut S,
    ) -> AppResult<(PathBuf, StatusAnalysis)> {
        let status = self.read_status_image()?;
        let path = sink.write_bytes(STATUS_FILE, status.as_bytes())?;
        let analysis = analyze_status(&status);
        for line in analysis.lines() {
            info!("{}", line);
        }
        Ok((path, analysis))
    }

    /// Fetch the data memory and log which pages hold data.
    pub fn show_pages(&mut self) -> AppResult<PageUsage> {
        let data = self.read_data_image()?;
        let usage = scan_pages(data.as_bytes());
        for line in usage.listing() {
            info!("{}", line);
        }
        Ok(usage)
    }

    /// Full backup: everything that can be fetched is saved, plus the report.
    ///
    /// Failed transfers only remove their sections from the report.
    pub fn save_full_report<S: ArtifactSink>(&mut self, sink: &mut S) -> AppResult<ExportSummary> {
        let rom = self.read_identifier();
        let data = tolerate(self.read_data_image())?;
        let status = tolerate(self.read_status_image())?;

        let mut summary = ExportSummary::default();
        if let Some(data) = &data {
            summary.record(BINARY_FILE, sink.write_bytes(BINARY_FILE, data.as_bytes()));
            let text = hexdump::render(data.as_bytes(), HexCase::Lower);
            summary.record(HEXDUMP_FILE, sink.write_text(HEXDUMP_FILE, &text));
        }
        if let Some(status) = &status {
            summary.record(STATUS_FILE, sink.write_bytes(STATUS_FILE, status.as_bytes()));
        }

        let report = compose_report(
            &ReportInputs {
                rom: rom.as_ref(),
                data: data.as_ref(),
                status: status.as_ref(),
            },
            &report_timestamp(),
        );
        summary.record(REPORT_FILE, sink.write_text(REPORT_FILE, &report));
        Ok(summary)
    }

    /// Write the emulator header. Both images are required.
    pub fn save_source_array<S: ArtifactSink>(&mut self, sink: &mut S) -> AppResult<PathBuf> {
        let rom = self.read_identifier();
        let data = self.read_data_image()?;
        let status = self.read_status_image()?;

        let text = generate_source_array(rom.as_ref(), &data, &status);
        let path = sink.write_text(HEADER_FILE, &text)?;

        let usage = scan_pages(data.as_bytes());
        info!(
            used = usage.used_count(),
            total = usage.total_pages,
            "Header written with {} used pages",
            usage.used_count()
        );
        Ok(path)
    }

    /// Fetch everything and write all artifacts under a derived prefix.
    ///
    /// Nothing is written unless both images arrived intact. A failed write does
    /// not stop the remaining ones; it is listed in the summary instead.
    pub fn export_all<S: ArtifactSink>(&mut self, tag: &str, sink: &mut S) -> AppResult<ExportSummary> {
        let rom = self.read_identifier();
        let data = match self.read_data_image() {
            Err(err) if !err.is_transfer_failure() => return Err(err),
            other => other,
        };
        let status = self.read_status_image();

        let data = data.inspect_err(|_| warn!("Export aborted: data memory dump invalid or incomplete"))?;
        let status = status.inspect_err(|_| warn!("Export aborted: status dump invalid or incomplete"))?;

        let prefix = build_prefix(data.as_bytes(), tag);
        info!(%prefix, "File prefix");

        let mut summary = ExportSummary {
            prefix: Some(prefix.clone()),
            ..Default::default()
        };

        let name = prefix.file_name(BINARY_FILE);
        summary.record(&name, sink.write_bytes(&name, data.as_bytes()));

        let name = prefix.file_name(HEXDUMP_FILE);
        let text = hexdump::render(data.as_bytes(), HexCase::Lower);
        summary.record(&name, sink.write_text(&name, &text));

        let name = prefix.file_name(STATUS_FILE);
        summary.record(&name, sink.write_bytes(&name, status.as_bytes()));

        let name = prefix.file_name(REPORT_FILE);
        let report = compose_report(
            &ReportInputs {
                rom: rom.as_ref(),
                data: Some(&data),
                status: Some(&status),
            },
            &report_timestamp(),
        );
        summary.record(&name, sink.write_text(&name, &report));

        let name = prefix.file_name(HEADER_FILE);
        let header = generate_source_array(rom.as_ref(), &data, &status);
        summary.record(&name, sink.write_text(&name, &header));

        info!(
            written = summary.written.len(),
            failed = summary.failed.len(),
            "Export finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{framed_response, ScriptedChannel};
    use crate::sink::MemorySink;

    fn fast_settings() -> TransferSettings {
        TransferSettings {
            marker_timeout_ms: 100,
            trailer_timeout_ms: 20,
            poll_interval_ms: 2,
            payload_stall_timeout_ms: 100,
            command_settle_ms: 0,
        }
    }

    fn data_response() -> Vec<u8> {
        let mut data = vec![0xFF; DataImage::SIZE];
        data[0x07EC..0x07F0].copy_from_slice(b"G123");
        data[0x07F2..0x07F6].copy_from_slice(&[0x00, 0x00, 0x03, 0xE8]);
        framed_response("BINARY_START", &data, Some("BINARY_END"))
    }

    fn status_response() -> Vec<u8> {
        framed_response("STATUS_START", &[0xFF; 256], Some("STATUS_END"))
    }

    #[test]
    fn test_send_raw_collects_lines() {
        let channel = ScriptedChannel::new().respond_to("help", b"line one\nline two\n".to_vec());
        let mut session = DumpSession::new(channel, &fast_settings());
        let lines = session.send_raw("help").unwrap();
        assert_eq!(lines, vec!["line one", "line two"]);
        assert_eq!(session.channel().written_lines(), ["help"]);
    }

    #[test]
    fn test_read_identifier() {
        let channel = ScriptedChannel::new()
            .respond_to("rom", b"ROM Code: 14 A1 5C 33 00 00 00 10\n".to_vec());
        let mut session = DumpSession::new(channel, &fast_settings());
        let rom = session.read_identifier().unwrap();
        assert!(rom.crc_ok);
        assert_eq!(rom.family_code(), 0x14);
    }

    #[test]
    fn test_read_identifier_unparsable_is_none() {
        let channel = ScriptedChannel::new().respond_to("rom", b"ROM Code: 14 A1\n".to_vec());
        let mut session = DumpSession::new(channel, &fast_settings());
        assert!(session.read_identifier().is_none());

        let mut closed = DumpSession::new(ScriptedChannel::new().closed(), &fast_settings());
        assert!(closed.read_identifier().is_none());
    }

    #[test]
    fn test_closed_channel_is_reported() {
        let mut session = DumpSession::new(ScriptedChannel::new().closed(), &fast_settings());
        assert!(matches!(
            session.read_data_image(),
            Err(ReaderError::ChannelUnavailable)
        ));
        assert!(session.channel().written_lines().is_empty());
    }

    #[test]
    fn test_save_status_returns_analysis() {
        let mut status = vec![0xFF; 256];
        status[0] = 0xFE;
        let channel = ScriptedChannel::new()
            .respond_to("sendstatus", framed_response("STATUS_BEGIN", &status, Some("STATUS_END")));
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new();

        let (path, analysis) = session.save_status(&mut sink).unwrap();
        assert_eq!(path, PathBuf::from(STATUS_FILE));
        assert_eq!(analysis.write_protected, vec![0]);
        assert_eq!(sink.get(STATUS_FILE).map(<[u8]>::len), Some(256));
    }

    #[test]
    fn test_short_payload_is_not_saved() {
        let channel = ScriptedChannel::new()
            .respond_to("binary", framed_response("BIN_START", &[0u8; 100], None))
            .eof_when_drained();
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new();

        let err = session.save_binary(&mut sink).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::LengthMismatch {
                expected: 8192,
                actual: 100,
                ..
            }
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_export_all_writes_prefixed_artifacts() {
        let channel = ScriptedChannel::new()
            .respond_to("rom", b"ROM Code: 14 A1 5C 33 00 00 00 10\n".to_vec())
            .respond_to("binary", data_response())
            .respond_to("sendstatus", status_response());
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new();

        let summary = session.export_all("lab 2", &mut sink).unwrap();
        assert!(summary.is_complete());
        assert_eq!(summary.written.len(), 5);
        assert_eq!(summary.prefix.unwrap().to_string(), "123_lab_2_1000");
        assert_eq!(
            sink.names(),
            vec![
                "123_lab_2_1000_binary.bin",
                "123_lab_2_1000_ds2506_image.h",
                "123_lab_2_1000_dump_report.txt",
                "123_lab_2_1000_hexdump.hex",
                "123_lab_2_1000_status.bin",
            ]
        );
        let report = sink.text("123_lab_2_1000_dump_report.txt").unwrap();
        assert!(report.contains("CRC Status: OK"));
    }

    #[test]
    fn test_export_all_aborts_without_status() {
        let channel = ScriptedChannel::new()
            .respond_to("binary", data_response())
            .respond_to("sendstatus", b"ERROR: no device\n".to_vec());
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new();

        let err = session.export_all("x", &mut sink).unwrap_err();
        assert!(matches!(err, ReaderError::DeviceError(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_export_all_continues_after_write_failure() {
        let channel = ScriptedChannel::new()
            .respond_to("binary", data_response())
            .respond_to("sendstatus", status_response());
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new().fail_on("123_t_1000_status.bin");

        let summary = session.export_all("t", &mut sink).unwrap();
        assert!(!summary.is_complete());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "123_t_1000_status.bin");
        assert_eq!(summary.written.len(), 4);
        assert!(sink.get("123_t_1000_ds2506_image.h").is_some());
    }

    #[test]
    fn test_full_report_without_data() {
        let channel = ScriptedChannel::new()
            .respond_to("binary", b"ERROR: read failed\n".to_vec())
            .respond_to("sendstatus", status_response());
        let mut session = DumpSession::new(channel, &fast_settings());
        let mut sink = MemorySink::new();

        let summary = session.save_full_report(&mut sink).unwrap();
        assert!(summary.is_complete());
        assert_eq!(sink.names(), vec![REPORT_FILE, STATUS_FILE]);
        let report = sink.text(REPORT_FILE).unwrap();
        assert!(report.contains("ROM code could not be determined."));
        assert!(report.contains("No data memory data available."));
        assert!(report.contains("=== STATUS MEMORY HEXDUMP (256 Bytes) ==="));
    }

    #[test]
    fn test_cancelled_session() {
        let channel = ScriptedChannel::new().respond_to("binary", data_response());
        let mut session = DumpSession::new(channel, &fast_settings());
        session.cancel_token().cancel();

        let mut sink = MemorySink::new();
        assert!(matches!(
            session.save_full_report(&mut sink),
            Err(ReaderError::Cancelled)
        ));
        assert!(sink.is_empty());
    }
}
