//! # Serial Communication Module
//!
//! Handles the UART link to the E220 module.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Blocking reads with a timeout and writes
//! - Driving M0/M1 and sampling AUX through the adapter's modem-control
//!   signals when no GPIO is available on the host

pub mod modem_lines;
pub mod port_trait;

pub use modem_lines::{ModemLines, ModemSignal};
pub use port_trait::Transport;

use std::io::{self, Read, Write};
use std::time::Duration;

use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, info, trace};

use crate::error::{LoraError, Result};

/// Baud rate the module must use while in configuration mode
pub const CONFIGURATION_BAUD_RATE: u32 = 9600;

/// Baud rates the module's UART supports
pub const SUPPORTED_BAUD_RATES: &[u32] = &[1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Gap after the last byte that ends a read burst
const INTER_BYTE_GAP: Duration = Duration::from_millis(20);

/// UART link to an E220 module
pub struct SerialTransport {
    /// Serial port handle
    port: Box<dyn SerialPort>,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    /// Timeout the port was opened with, restored after each read
    timeout: Duration,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open a serial port for the module
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - UART speed, must match the module's SPED register
    /// * `timeout` - Default blocking read timeout
    ///
    /// # Errors
    ///
    /// Returns error if the baud rate is not one the module supports or the
    /// port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_e220::serial::SerialTransport;
    /// use std::time::Duration;
    ///
    /// let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_millis(1000))?;
    /// # Ok::<(), lora_e220::error::LoraError>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(LoraError::InvalidArgument(format!(
                "unsupported baud rate {}",
                baud_rate
            )));
        }

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()?;

        info!("Opened E220 serial port at {} ({} baud)", path, baud_rate);
        Ok(Self::from_port(port, path))
    }

    /// Wrap an already opened port, keeping its current timeout as the default
    pub fn from_port(port: Box<dyn SerialPort>, device_path: &str) -> Self {
        let timeout = port.timeout();
        Self {
            port,
            device_path: device_path.to_string(),
            timeout,
        }
    }

    /// Second handle onto the same port, for modem-control lines
    pub fn try_clone_port(&self) -> Result<Box<dyn SerialPort>> {
        Ok(self.port.try_clone()?)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Read until `max_bytes`, a read timeout or a quiet gap ends the burst
    fn read_burst(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(max_bytes);
        let mut chunk = [0u8; 64];

        while data.len() < max_bytes {
            let want = chunk.len().min(max_bytes - data.len());
            match self.port.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    // Rest of the burst follows at UART speed
                    self.port.set_timeout(INTER_BYTE_GAP)?;
                }
                Err(e) if is_timeout(&e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(data)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!("TX {:02X?}", bytes);
        Ok(bytes.len())
    }

    fn read_available(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.port.set_timeout(timeout)?;
        let burst = self.read_burst(max_bytes);
        let restored = self.port.set_timeout(self.timeout);

        let data = burst?;
        restored?;
        if !data.is_empty() {
            trace!("RX {:02X?}", data);
        }
        Ok(data)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        debug!("Cleared serial input buffer");
        Ok(())
    }
}
