//! Serial channel for the USB bridge microcontroller
//!
//! Wraps the serialport crate. Lines are read one byte at a time so that the
//! raw payload following a start marker is never swallowed by a line read.

use super::{decode_line, ByteChannel};
use crate::config::SerialSettings;
use crate::error::{AppResult, ReaderError};
use std::io;
use tracing::{debug, info};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::io::{Read, Write};
#[cfg(feature = "instrument_serial")]
use std::time::Duration;

/// Serial channel to the bridge (8N1, no flow control)
pub struct SerialChannel {
    /// Port name (e.g., "/dev/ttyUSB0", "COM7")
    port_name: String,

    /// Baud rate (e.g., 115200)
    baud_rate: u32,

    /// The open port; `None` after [`SerialChannel::close`]
    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Open the port and wait for the bridge to come out of reset.
    ///
    /// Opening the port resets most USB bridges, which then print a greeting.
    /// After `settle_ms` + `greeting_drain_ms` the greeting lines are read and
    /// logged so they cannot be mistaken for command output.
    #[cfg(feature = "instrument_serial")]
    pub fn open(settings: &SerialSettings) -> AppResult<Self> {
        let port_name = settings
            .port
            .clone()
            .ok_or_else(|| ReaderError::Configuration("No serial port configured".to_string()))?;

        let port = serialport::new(&port_name, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(io::Error::from)?;

        info!(port = %port_name, baud = settings.baud_rate, "Serial port opened");

        let mut channel = Self {
            port_name,
            baud_rate: settings.baud_rate,
            port: Some(port),
        };

        std::thread::sleep(Duration::from_millis(
            settings.settle_ms + settings.greeting_drain_ms,
        ));
        channel.drain_greeting()?;

        Ok(channel)
    }

    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(_settings: &SerialSettings) -> AppResult<Self> {
        Err(ReaderError::SerialFeatureDisabled)
    }

    /// Read and log whatever the bridge printed since it was opened.
    pub fn drain_greeting(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while self.bytes_available()? > 0 {
            match self.read_line()? {
                Some(line) if !line.is_empty() => {
                    info!("{}", line);
                    lines.push(line);
                }
                Some(_) => {}
                None => break,
            }
        }
        Ok(lines)
    }

    /// Close the port. Further operations fail with `NotConnected`.
    pub fn close(&mut self) {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                info!(port = %self.port_name, "Serial port closed");
            }
        }
    }

    pub fn info(&self) -> String {
        format!("SerialChannel({} @ {} baud)", self.port_name, self.baud_rate)
    }

    #[cfg(feature = "instrument_serial")]
    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

#[cfg(feature = "instrument_serial")]
impl ByteChannel for SerialChannel {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(format!("{}\n", line).as_bytes())?;
        port.flush()?;
        debug!("Sent serial command: {}", line);
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let pending = self.port_mut()?.bytes_to_read().map_err(io::Error::from)?;
        Ok(pending as usize)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let port = self.port_mut()?;
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    raw.push(byte[0]);
                }
                Ok(_) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if raw.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(decode_line(&raw)))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.port_mut()?.read(buf) {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl ByteChannel for SerialChannel {
    fn is_open(&self) -> bool {
        false
    }

    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Err(io::ErrorKind::NotConnected.into())
    }

    fn read_bytes(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::NotConnected.into())
    }
}

/// Serial ports present on this machine, as `(name, description)` pairs.
#[cfg(feature = "instrument_serial")]
pub fn list_ports() -> AppResult<Vec<(String, String)>> {
    let ports = serialport::available_ports().map_err(io::Error::from)?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let description = match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => format!(
                    "USB {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                _ => "unknown".to_string(),
            };
            (port.port_name, description.trim().to_string())
        })
        .collect())
}

#[cfg(not(feature = "instrument_serial"))]
pub fn list_ports() -> AppResult<Vec<(String, String)>> {
    Err(ReaderError::SerialFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_without_port_is_configuration_error() {
        let settings = SerialSettings::default();
        let result = SerialChannel::open(&settings);

        #[cfg(feature = "instrument_serial")]
        assert!(matches!(result, Err(ReaderError::Configuration(_))));
        #[cfg(not(feature = "instrument_serial"))]
        assert!(matches!(result, Err(ReaderError::SerialFeatureDisabled)));
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_open_missing_device_fails() {
        let settings = SerialSettings {
            port: Some("/dev/ds2506-reader-no-such-port".to_string()),
            settle_ms: 0,
            greeting_drain_ms: 0,
            ..Default::default()
        };
        assert!(SerialChannel::open(&settings).is_err());
    }
}
