//! # Anemometer Serial Port
//!
//! Opens the anemometer's USB serial port and splits its output into lines.
//!
//! This module handles:
//! - Opening the port (8N1, configurable baud rate)
//! - Line framing over an async byte stream
//! - Read timeouts, reported as a stalled device
//! - Listing available ports

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::port_trait::LineSource;
use crate::error::{Result, WindLoggerError};

/// Default baud rate of the GMX500 family
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Longest line accepted before the buffer is discarded
const MAX_LINE_LEN: usize = 4096;

/// Splits an async byte stream into text lines.
///
/// A timeout, when set, bounds each [`LineReader::read_line`] call. Bytes
/// received before a timeout are kept for the next call.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(inner: R, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(256),
            timeout,
        }
    }

    /// Read the next line
    ///
    /// # Returns
    ///
    /// * `Result<String>` - Line without `\r\n`; invalid UTF-8 is replaced
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No line arrives within the timeout (`DeviceStalled`)
    /// - The stream ends (`DeviceUnavailable`)
    /// - The underlying read fails (`Serial`)
    pub async fn read_line(&mut self) -> Result<String> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_line_unbounded())
                .await
                .map_err(|_| WindLoggerError::DeviceStalled(limit))?,
            None => self.read_line_unbounded().await,
        }
    }

    async fn read_line_unbounded(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line);
                return Ok(text.trim_end_matches(['\r', '\n']).to_string());
            }

            if self.buf.len() > MAX_LINE_LEN {
                warn!("Discarding {} bytes without a line break", self.buf.len());
                self.buf.clear();
            }

            let n = self
                .inner
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| WindLoggerError::Serial(format!("Failed to read: {}", e)))?;

            if n == 0 {
                return Err(WindLoggerError::DeviceUnavailable(
                    "serial stream closed".to_string(),
                ));
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for LineReader<R> {
    async fn next_line(&mut self) -> Result<String> {
        self.read_line().await
    }
}

/// Anemometer connected over USB serial
pub struct AnemometerSerial {
    reader: LineReader<tokio_serial::SerialStream>,
    device_path: String,
}

impl std::fmt::Debug for AnemometerSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnemometerSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl AnemometerSerial {
    /// Open the anemometer port
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Instrument baud rate
    /// * `read_timeout` - Longest wait for one line
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use wind_logger::sensor::serial::AnemometerSerial;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut port = AnemometerSerial::open("/dev/ttyUSB0", 19200, Duration::from_secs(5))?;
    ///     let line = port.probe().await?;
    ///     println!("{}", line);
    ///     Ok(())
    /// }
    /// ```
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", path, baud_rate);
        let port = Self::open_port(path, baud_rate)?;
        info!("Opened anemometer at {}", path);

        Ok(Self {
            reader: LineReader::new(port, Some(read_timeout)),
            device_path: path.to_string(),
        })
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| WindLoggerError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Check that the instrument is talking
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the first line is empty, or the read
    /// error if nothing arrives.
    pub async fn probe(&mut self) -> Result<String> {
        let line = self.reader.read_line().await?;
        if line.trim().is_empty() {
            return Err(WindLoggerError::DeviceUnavailable(format!(
                "{} sent an empty line",
                self.device_path
            )));
        }
        Ok(line)
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl LineSource for AnemometerSerial {
    async fn next_line(&mut self) -> Result<String> {
        self.reader.read_line().await
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Vec<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Cannot list serial ports: {}", e);
            Vec::new()
        }
    }
}
