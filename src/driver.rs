//! # Driver
//!
//! Public lifecycle of an E220 module: bring-up, configuration, sending and
//! receiving.
//!
//! All operations block the calling thread for a bounded time and return a
//! [`Result`]; [`crate::error::LoraError::status`] maps failures onto
//! [`crate::error::ResponseStatusCode`]. The driver holds no locks, so a host
//! sharing it between threads must serialize calls itself.
//!
//! ## Usage
//!
//! ```no_run
//! use lora_e220::driver::LoraE220;
//! use lora_e220::e220::command::Persistence;
//! use lora_e220::e220::registers::Configuration;
//! use lora_e220::lines::Unwired;
//! use lora_e220::serial::SerialTransport;
//! use std::time::Duration;
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_millis(1000))?;
//! let mut lora = LoraE220::new("400T22D", transport, Unwired)?;
//! lora.begin()?;
//!
//! let mut config = Configuration::for_model("400T22D")?;
//! config.transmission_mode.enable_rssi = true;
//! lora.set_configuration(&config, Persistence::Temporary)?;
//!
//! loop {
//!     if lora.available()? > 0 {
//!         let received = lora.receive_dict(true)?;
//!         println!("{:?} rssi={:?}", received.payload, received.rssi);
//!     }
//! }
//! # Ok::<(), lora_e220::error::LoraError>(())
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::e220::command::{CommandEngine, ModuleInformation, Persistence};
use crate::e220::frame::{self, Rssi, TransmissionFrame, BROADCAST_ADDRESS, MAX_PAYLOAD_SIZE};
use crate::e220::model::Model;
use crate::e220::payload::{self, Dictionary, Message};
use crate::e220::registers::{Configuration, TransmissionKind};
use crate::error::{LoraError, Result};
use crate::lines::ControlLines;
use crate::mode::{ModeController, ModeTiming, OperatingMode};
use crate::serial::Transport;
use crate::timing::{Clock, SystemClock};

/// Register start of the configuration block
const CONFIGURATION_START: u8 = 0x00;

/// Timeouts and delays of a driver instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    pub timing: ModeTiming,
    /// Longest wait for the answer to a configuration command
    pub response_timeout: Duration,
    /// Longest wait for the first byte of a received frame
    pub receive_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            timing: ModeTiming::default(),
            response_timeout: Duration::from_millis(1000),
            receive_timeout: Duration::from_millis(1000),
        }
    }
}

/// Payload of a received frame with its signal strength
#[derive(Debug, Clone, PartialEq)]
pub struct Received<T> {
    pub payload: T,
    /// Present only when the caller asked for it
    pub rssi: Option<Rssi>,
}

impl<T> Received<T> {
    fn map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Received<U>> {
        Ok(Received {
            payload: f(self.payload)?,
            rssi: self.rssi,
        })
    }
}

/// Driver for one E220/E22 module
///
/// Owns the UART and the control lines exclusively.
pub struct LoraE220<T, L, C = SystemClock> {
    model: Model,
    transport: T,
    modes: ModeController<L, C>,
    options: DriverOptions,
}

impl<T: Transport, L: ControlLines> LoraE220<T, L, SystemClock> {
    /// Driver with default timeouts and the system clock
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if `model_id` is not a supported module
    pub fn new(model_id: &str, transport: T, lines: L) -> Result<Self> {
        let model = Model::from_id(model_id)?;
        Ok(Self::with_clock(model, transport, lines, SystemClock, DriverOptions::default()))
    }
}

impl<T: Transport, L: ControlLines, C: Clock> LoraE220<T, L, C> {
    pub fn with_clock(model: Model, transport: T, lines: L, clock: C, options: DriverOptions) -> Self {
        Self {
            model,
            transport,
            modes: ModeController::new(lines, clock, options.timing),
            options,
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Current operating mode, `None` before [`LoraE220::begin`]
    pub fn mode(&self) -> Option<OperatingMode> {
        self.modes.mode()
    }

    /// Drop stale input and put the module into normal mode
    pub fn begin(&mut self) -> Result<()> {
        self.transport.clear_input()?;
        self.modes.set_mode(OperatingMode::Normal)?;
        info!("{} ready", self.model);
        Ok(())
    }

    /// Switch operating mode
    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<()> {
        self.modes.set_mode(mode)
    }

    /// Run `op` in configuration mode, always returning to normal mode
    ///
    /// The first error wins: a failed command is reported even if restoring
    /// normal mode also fails.
    fn in_configuration_mode<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let result = self
            .modes
            .set_mode(OperatingMode::Configuration)
            .and_then(|()| op(self));

        let restored = self.modes.set_mode(OperatingMode::Normal);
        if let Err(e) = &restored {
            warn!("Failed to restore normal mode: {}", e);
        }

        let value = result?;
        restored?;
        Ok(value)
    }

    fn engine(&mut self) -> CommandEngine<'_, T> {
        CommandEngine::new(&mut self.transport, self.options.response_timeout)
    }

    fn read_configuration(&mut self) -> Result<Configuration> {
        let length = self.model.layout().length as u8;
        let registers = self.engine().read_registers(CONFIGURATION_START, length)?;
        Configuration::decode(&registers, self.model)
    }

    /// Read the module's configuration registers
    pub fn get_configuration(&mut self) -> Result<Configuration> {
        self.in_configuration_mode(|lora| lora.read_configuration())
    }

    /// Write `configuration` and read back what the module applied
    ///
    /// The firmware may coerce out-of-range values, so the returned value can
    /// differ from the one written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` before any I/O if `configuration` belongs to
    /// another model
    pub fn set_configuration(&mut self, configuration: &Configuration, persistence: Persistence) -> Result<Configuration> {
        if configuration.model() != self.model {
            return Err(LoraError::InvalidArgument(format!(
                "configuration is for {}, module is {}",
                configuration.model(),
                self.model
            )));
        }
        if let Err(e) = configuration.validate() {
            warn!("Writing configuration the module will coerce: {}", e);
        }

        let registers = configuration.encode();
        self.in_configuration_mode(|lora| {
            lora.engine()
                .write_registers(persistence, CONFIGURATION_START, &registers)?;
            debug!("Wrote {} configuration registers ({:?})", registers.len(), persistence);
            lora.read_configuration()
        })
    }

    /// Read the product information registers
    pub fn get_module_information(&mut self) -> Result<ModuleInformation> {
        let layout = self.model.layout();
        let (start, length) = (layout.pid_start, layout.pid_length);
        self.in_configuration_mode(|lora| {
            let raw = lora.engine().read_registers(start, length)?;
            Ok(ModuleInformation::new(raw))
        })
    }

    /// Restart the module and wait for it to come back
    pub fn reset_module(&mut self) -> Result<()> {
        self.in_configuration_mode(|lora| {
            lora.engine().reset()?;
            lora.modes.wait_ready()
        })
    }

    /// Number of received bytes waiting to be read; never blocks
    pub fn available(&mut self) -> Result<usize> {
        self.transport.bytes_available()
    }

    fn write_frame(&mut self, frame: &TransmissionFrame) -> Result<()> {
        let bytes = frame.to_bytes();
        let written = self.transport.write(&bytes)?;
        if written != bytes.len() {
            return Err(LoraError::Transport(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, bytes.len()),
            )));
        }
        debug!("Sent {:?} frame ({} payload bytes)", frame.kind(), frame.payload().len());
        // AUX drops while the module transmits
        self.modes.wait_ready()
    }

    /// Send raw payload bytes
    ///
    /// `address` and `channel` are required for fixed transmission and
    /// rejected for transparent transmission. Sending twice transmits twice.
    pub fn send(&mut self, kind: TransmissionKind, address: Option<u16>, channel: Option<u8>, payload: &[u8]) -> Result<()> {
        let frame = TransmissionFrame::new(kind, address, channel, payload.to_vec())?;
        self.write_frame(&frame)
    }

    pub fn send_transparent(&mut self, payload: &[u8]) -> Result<()> {
        self.send(TransmissionKind::Transparent, None, None, payload)
    }

    pub fn send_fixed(&mut self, address: u16, channel: u8, payload: &[u8]) -> Result<()> {
        self.send(TransmissionKind::Fixed, Some(address), Some(channel), payload)
    }

    /// Fixed transmission to every node listening on `channel`
    pub fn send_broadcast(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        self.send_fixed(BROADCAST_ADDRESS, channel, payload)
    }

    pub fn send_str(&mut self, kind: TransmissionKind, address: Option<u16>, channel: Option<u8>, text: &str) -> Result<()> {
        self.send(kind, address, channel, text.as_bytes())
    }

    pub fn send_dict(
        &mut self,
        kind: TransmissionKind,
        address: Option<u16>,
        channel: Option<u8>,
        dictionary: &Dictionary,
    ) -> Result<()> {
        let payload = payload::encode_dict(dictionary)?;
        self.send(kind, address, channel, &payload)
    }

    pub fn send_message(
        &mut self,
        kind: TransmissionKind,
        address: Option<u16>,
        channel: Option<u8>,
        message: &Message,
    ) -> Result<()> {
        let payload = message.to_payload()?;
        self.send(kind, address, channel, &payload)
    }

    /// Read one received frame
    ///
    /// `rssi` must match this module's RSSI setting.
    ///
    /// # Errors
    ///
    /// - `NoData` if nothing is buffered; the read path is not touched
    /// - `Timeout` if bytes were announced but none arrived
    /// - `MalformedFrame` if the frame is too short for an RSSI byte
    pub fn receive(&mut self, rssi: bool) -> Result<Received<Vec<u8>>> {
        if self.available()? == 0 {
            return Err(LoraError::NoData);
        }

        let max = MAX_PAYLOAD_SIZE + usize::from(rssi);
        let bytes = self.transport.read_available(max, self.options.receive_timeout)?;
        if bytes.is_empty() {
            return Err(LoraError::Timeout("announced data never arrived".to_string()));
        }

        let parsed = frame::parse_frame(&bytes, rssi)?;
        debug!("Received {} bytes (rssi {:?})", parsed.payload.len(), parsed.rssi.map(Rssi::dbm));
        Ok(Received {
            payload: parsed.payload,
            rssi: parsed.rssi,
        })
    }

    /// Receive a UTF-8 text payload
    pub fn receive_string(&mut self, rssi: bool) -> Result<Received<String>> {
        self.receive(rssi)?.map(|bytes| payload::decode_text(&bytes))
    }

    /// Receive a dictionary payload
    pub fn receive_dict(&mut self, rssi: bool) -> Result<Received<Dictionary>> {
        self.receive(rssi)?.map(|bytes| payload::decode_dict(&bytes))
    }

    /// Give back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }
}
