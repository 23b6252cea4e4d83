//! CLI Entry Point for ds2506-reader
//!
//! Every subcommand except `list-ports` and `decode-hex` opens the serial bridge,
//! runs one workflow of [`DumpSession`] and closes the port again.
//!
//! # Usage
//!
//! ```bash
//! ds2506-reader --port /dev/ttyUSB0 report
//! ds2506-reader --port COM7 --output dumps export-all --tag bench1
//! ds2506-reader decode-hex dumps/hexdump.hex
//! ```
//!
//! The session runs on a blocking thread; Ctrl-C sets the shared cancel token,
//! which ends the current transfer at its next polling point.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ds2506_reader::adapters::{list_ports, SerialChannel};
use ds2506_reader::config::ReaderConfig;
use ds2506_reader::export::hexdump;
use ds2506_reader::logging;
use ds2506_reader::protocol::CancelToken;
use ds2506_reader::session::{DumpSession, ExportSummary};
use ds2506_reader::sink::{ArtifactSink, DirectorySink};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ds2506-reader")]
#[command(about = "Read, validate and export DS2506 memory dumps", long_about = None)]
struct Cli {
    /// Configuration file (default: config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of the bridge, overrides [serial] port
    #[arg(long, global = true)]
    port: Option<String>,

    /// Output directory, overrides [output] directory
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Read the ROM code and check its CRC
    Rom,

    /// Fetch the 8 KB data memory and write binary.bin
    SaveBin,

    /// Fetch the 8 KB data memory and write hexdump.hex
    SaveHex,

    /// Fetch the status memory, write status.bin and print its analysis
    SaveStatus,

    /// Fetch the data memory and list the used pages
    Pages,

    /// Fetch everything and write the full backup with dump_report.txt
    Report,

    /// Fetch everything and write the emulator header ds2506_image.h
    Header,

    /// Fetch everything and write all artifacts with a derived prefix
    ExportAll {
        /// Free-text tag placed in the file prefix
        #[arg(long)]
        tag: String,
    },

    /// Pass a command through to the bridge and print its reply
    Send {
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Convert a hex dump back to binary (offline)
    DecodeHex {
        /// Hex dump produced by save-hex
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load_from(path),
        None => ReaderConfig::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.serial.port = Some(port);
    }
    if let Some(output) = cli.output {
        config.output.directory = output;
    }
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config).context("Failed to initialize logging")?;

    match cli.command {
        Commands::ListPorts => print_ports(),
        Commands::DecodeHex { file } => decode_hex(&file, &config),
        command => run_session(command, config).await,
    }
}

fn print_ports() -> Result<()> {
    let ports = list_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for (name, description) in ports {
        println!("{}  {}", name, description);
    }
    Ok(())
}

fn decode_hex(file: &Path, config: &ReaderConfig) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let bytes = hexdump::parse(&text).with_context(|| format!("Failed to decode {}", file.display()))?;

    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("decoded");
    let mut sink = DirectorySink::new(&config.output.directory);
    let path = sink.write_bytes(&format!("{}.bin", stem), &bytes)?;
    println!("Saved: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

async fn run_session(command: Commands, config: ReaderConfig) -> Result<()> {
    let cancel = CancelToken::new();

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the current transfer");
            interrupt.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || execute(command, &config, cancel))
        .await
        .context("Session task failed")?;

    watcher.abort();
    result
}

fn execute(command: Commands, config: &ReaderConfig, cancel: CancelToken) -> Result<()> {
    let channel = SerialChannel::open(&config.serial).context("Failed to open serial port")?;
    info!("{}", channel.info());

    let mut session = DumpSession::new(channel, &config.transfer).with_cancel_token(cancel);
    let mut sink = DirectorySink::new(&config.output.directory);

    let outcome = run_command(command, &mut session, &mut sink);
    session.channel_mut().close();
    outcome
}

fn run_command(
    command: Commands,
    session: &mut DumpSession<SerialChannel>,
    sink: &mut DirectorySink,
) -> Result<()> {
    match command {
        Commands::Rom => {
            let rom = session
                .read_identifier()
                .ok_or_else(|| anyhow!("ROM code could not be determined"))?;
            for line in rom.summary_lines() {
                println!("{}", line);
            }
        }
        Commands::SaveBin => {
            let path = session.save_binary(sink)?;
            println!("Saved: {}", path.display());
        }
        Commands::SaveHex => {
            let path = session.save_hexdump(sink)?;
            println!("Saved: {}", path.display());
        }
        Commands::SaveStatus => {
            let (path, analysis) = session.save_status(sink)?;
            println!("Saved: {}", path.display());
            print!("{}", analysis);
        }
        Commands::Pages => {
            let usage = session.show_pages()?;
            print!("{}", usage);
        }
        Commands::Report => {
            let summary = session.save_full_report(sink)?;
            print_summary(&summary)?;
        }
        Commands::Header => {
            let path = session.save_source_array(sink)?;
            println!("Saved: {}", path.display());
        }
        Commands::ExportAll { tag } => {
            let summary = session.export_all(&tag, sink)?;
            print_summary(&summary)?;
        }
        Commands::Send { command } => {
            for line in session.send_raw(&command.join(" "))? {
                println!("{}", line);
            }
        }
        Commands::ListPorts | Commands::DecodeHex { .. } => {
            bail!("this command does not use the serial bridge")
        }
    }
    Ok(())
}

fn print_summary(summary: &ExportSummary) -> Result<()> {
    if let Some(prefix) = &summary.prefix {
        println!("File prefix: {}", prefix);
    }
    for path in &summary.written {
        println!("Saved: {}", path.display());
    }
    for failure in &summary.failed {
        eprintln!("Failed: {} ({})", failure.name, failure.error);
    }
    if !summary.is_complete() {
        bail!("{} artifact(s) could not be written", summary.failed.len());
    }
    Ok(())
}
