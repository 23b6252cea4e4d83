//! End-to-end workflows over a scripted bridge, writing into a temp directory.

use ds2506_reader::adapters::{framed_response, ScriptedChannel};
use ds2506_reader::config::TransferSettings;
use ds2506_reader::export::hexdump;
use ds2506_reader::memory::{DataImage, StatusImage};
use ds2506_reader::session::{
    DumpSession, BINARY_FILE, HEADER_FILE, HEXDUMP_FILE, REPORT_FILE, STATUS_FILE,
};
use ds2506_reader::sink::DirectorySink;
use ds2506_reader::ReaderError;
use std::fs;

const ROM_LISTING: &[u8] = b"ROM Code: 14 A1 5C 33 00 00 00 10\r\n";

fn settings() -> TransferSettings {
    TransferSettings {
        marker_timeout_ms: 200,
        trailer_timeout_ms: 30,
        poll_interval_ms: 2,
        payload_stall_timeout_ms: 200,
        command_settle_ms: 0,
    }
}

fn data_bytes() -> Vec<u8> {
    let mut data = vec![0xFF; DataImage::SIZE];
    data[0x0000..0x0006].copy_from_slice(b"DS2506");
    data[0x0220] = 0x00;
    data[0x07EC..0x07F0].copy_from_slice(b"GA7\x01");
    data[0x07F2..0x07F6].copy_from_slice(&[0x00, 0x01, 0x86, 0xA0]);
    // newline bytes inside the payload must not end the frame
    data[0x1000..0x1004].copy_from_slice(b"\n\r\n\n");
    data
}

fn status_bytes() -> Vec<u8> {
    let mut status = vec![0xFF; StatusImage::SIZE];
    status[0x00] = 0xFC;
    status[0x21] = 0x05;
    status
}

fn bridge() -> ScriptedChannel {
    ScriptedChannel::new()
        .with_line("DS2506 bridge ready")
        .respond_to("rom", ROM_LISTING.to_vec())
        .respond_to(
            "binary",
            framed_response("BINARY_START", &data_bytes(), Some("BINARY_END")),
        )
        .respond_to(
            "sendstatus",
            framed_response("STATUS_BEGIN", &status_bytes(), Some("STATUS_END")),
        )
}

#[test]
fn test_export_all_writes_five_prefixed_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path());
    let mut session = DumpSession::new(bridge(), &settings());

    let summary = session.export_all("Lab/3", &mut sink).unwrap();
    assert!(summary.is_complete());

    let prefix = "A7__Lab_3_100000";
    assert_eq!(summary.prefix.as_ref().unwrap().to_string(), prefix);

    let bin = fs::read(dir.path().join(format!("{}_{}", prefix, BINARY_FILE))).unwrap();
    assert_eq!(bin, data_bytes());

    let status = fs::read(dir.path().join(format!("{}_{}", prefix, STATUS_FILE))).unwrap();
    assert_eq!(status, status_bytes());

    let hex = fs::read_to_string(dir.path().join(format!("{}_{}", prefix, HEXDUMP_FILE))).unwrap();
    assert_eq!(hexdump::parse(&hex).unwrap(), data_bytes());
    assert!(hex.starts_with("0000: 44 53 32 35 30 36 ff"));

    let report = fs::read_to_string(dir.path().join(format!("{}_{}", prefix, REPORT_FILE))).unwrap();
    assert!(report.starts_with("DS2506 Dump Report\nCreated: "));
    assert!(report.contains("CRC Status: OK"));
    assert!(report.contains("Page 000 (0x0000 - 0x001F) used"));
    assert!(report.contains("Page 017 (0x0220 - 0x023F) used"));
    assert!(report.contains("  Locked pages: 0-1"));
    assert!(report.contains("EPROM/Redirection set (bytes 0x20-0x3F != FF): 1/32"));

    let header = fs::read_to_string(dir.path().join(format!("{}_{}", prefix, HEADER_FILE))).unwrap();
    assert!(header.contains("const uint8_t page_0000[32] PROGMEM = {"));
    assert!(header.contains("const uint8_t page_0220[32] PROGMEM = {"));
    assert!(header.contains("const uint8_t status_mem[256] PROGMEM = {"));

    assert_eq!(
        session.channel().written_lines(),
        ["rom", "binary", "sendstatus"]
    );
}

#[test]
fn test_single_artifact_workflows() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path().join("out"));

    let channel = bridge().respond_to(
        "binary",
        framed_response("BIN_START", &data_bytes(), Some("BIN_END")),
    );
    let mut session = DumpSession::new(channel, &settings());

    let path = session.save_binary(&mut sink).unwrap();
    assert_eq!(path, dir.path().join("out").join(BINARY_FILE));
    assert_eq!(fs::read(path).unwrap().len(), 8192);

    let path = session.save_hexdump(&mut sink).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert_eq!(text.lines().count(), 512);
}

#[test]
fn test_failed_status_does_not_remove_written_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path());

    let channel = ScriptedChannel::new()
        .respond_to(
            "binary",
            framed_response("BINARY_START", &data_bytes(), Some("BINARY_END")),
        )
        .respond_to("sendstatus", b"ERROR: status read failed\n".to_vec());
    let mut session = DumpSession::new(channel, &settings());

    session.save_binary(&mut sink).unwrap();
    let err = session.save_status(&mut sink).unwrap_err();
    assert!(matches!(err, ReaderError::DeviceError(_)));

    assert!(dir.path().join(BINARY_FILE).exists());
    assert!(!dir.path().join(STATUS_FILE).exists());
}

#[test]
fn test_marker_timeout_aborts_export_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path().join("never"));

    let channel = ScriptedChannel::new().respond_to("binary", b"busy\n".to_vec());
    let mut session = DumpSession::new(channel, &settings());

    let err = session.export_all("t", &mut sink).unwrap_err();
    assert!(matches!(err, ReaderError::MarkerTimeout { .. }));
    assert!(!dir.path().join("never").exists());
}

#[test]
fn test_full_report_with_everything_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path());
    let mut session = DumpSession::new(ScriptedChannel::new(), &settings());

    let summary = session.save_full_report(&mut sink).unwrap();
    assert_eq!(summary.written, vec![dir.path().join(REPORT_FILE)]);

    let report = fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap();
    assert!(report.contains("ROM code could not be determined."));
    assert!(report.contains("No data memory data available."));
    assert!(report.contains("No status memory data available."));
}

#[test]
fn test_pass_through_command() {
    let channel = ScriptedChannel::new()
        .respond_to("help", b"Commands:\r\n  rom\r\n  binary\r\n".to_vec());
    let mut session = DumpSession::new(channel, &settings());
    let lines = session.send_raw("help").unwrap();
    assert_eq!(lines, vec!["Commands:", "rom", "binary"]);
}
