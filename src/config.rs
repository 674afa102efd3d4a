//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::driver::DriverOptions;
use crate::e220::command::Persistence;
use crate::e220::frame::MAX_PAYLOAD_SIZE;
use crate::e220::model::Model;
use crate::e220::payload::{self, Dictionary, Value};
use crate::e220::registers::{Configuration, TransmissionKind};
use crate::error::{LoraError, Result};
use crate::mode::ModeTiming;
use crate::serial::{ModemSignal, SUPPORTED_BAUD_RATES};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub module: ModuleConfig,
    pub radio: RadioConfig,
    pub receiver: ReceiverConfig,
    pub sender: SenderConfig,
    pub message_log: MessageLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Module wiring and timing
#[derive(Debug, Deserialize, Clone)]
pub struct ModuleConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_m0_signal")]
    pub m0: ModemSignal,

    #[serde(default = "default_m1_signal")]
    pub m1: ModemSignal,

    #[serde(default = "default_aux_signal")]
    pub aux: ModemSignal,

    /// Adapter drives its modem-control outputs active-low
    #[serde(default = "default_inverted")]
    pub inverted: bool,

    #[serde(default = "default_aux_timeout_ms")]
    pub aux_timeout_ms: u64,

    #[serde(default = "default_unwired_aux_delay_ms")]
    pub unwired_aux_delay_ms: u64,
}

/// Register values applied at startup
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default)]
    pub addh: u8,

    #[serde(default = "default_addl")]
    pub addl: u8,

    #[serde(default = "default_chan")]
    pub chan: u8,

    #[serde(default)]
    pub fixed_transmission: bool,

    #[serde(default)]
    pub enable_rssi: bool,

    #[serde(default = "default_apply_on_start")]
    pub apply_on_start: bool,

    /// Write with C0 so the settings survive a power cycle
    #[serde(default)]
    pub persist: bool,
}

/// Receive loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReceiverConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Send loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SenderConfig {
    #[serde(default)]
    pub addh: u8,

    #[serde(default = "default_sender_addl")]
    pub addl: u8,

    #[serde(default = "default_chan")]
    pub chan: u8,

    #[serde(default = "default_send_interval_ms")]
    pub interval_ms: u64,

    /// Dictionary sent every interval
    #[serde(default = "default_message")]
    pub message: toml::Table,
}

/// Received message log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MessageLogConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_timeout_ms() -> u64 { 1000 }

fn default_model() -> String { "400T22D".to_string() }
fn default_m0_signal() -> ModemSignal { ModemSignal::Rts }
fn default_m1_signal() -> ModemSignal { ModemSignal::Dtr }
fn default_aux_signal() -> ModemSignal { ModemSignal::Cts }
fn default_inverted() -> bool { true }
fn default_aux_timeout_ms() -> u64 { 1000 }
fn default_unwired_aux_delay_ms() -> u64 { 100 }

fn default_addl() -> u8 { 0x01 }
fn default_chan() -> u8 { 23 }
fn default_apply_on_start() -> bool { true }

fn default_poll_interval_ms() -> u64 { 50 }

fn default_sender_addl() -> u8 { 0x01 }
fn default_send_interval_ms() -> u64 { 2000 }
fn default_message() -> toml::Table {
    let mut table = toml::Table::new();
    table.insert("key1".to_string(), toml::Value::String("value1".to_string()));
    table
}

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn invalid(message: impl std::fmt::Display) -> LoraError {
    LoraError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_e220::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate {} is not one of {:?}",
                self.serial.baud_rate, SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        let model = self.model()?;

        for (name, signal) in [("m0", self.module.m0), ("m1", self.module.m1)] {
            if !matches!(signal, ModemSignal::Rts | ModemSignal::Dtr | ModemSignal::None) {
                return Err(invalid(format!("module.{} must be rts, dtr or none", name)));
            }
        }
        if matches!(self.module.aux, ModemSignal::Rts | ModemSignal::Dtr) {
            return Err(invalid("module.aux must be an input signal"));
        }

        if self.module.aux_timeout_ms == 0 || self.module.aux_timeout_ms > 10000 {
            return Err(invalid("aux_timeout_ms must be between 1 and 10000"));
        }

        if self.module.unwired_aux_delay_ms > 10000 {
            return Err(invalid("unwired_aux_delay_ms must be at most 10000"));
        }

        let max_channel = model.spec().max_channel;
        if self.radio.chan > max_channel || self.sender.chan > max_channel {
            return Err(invalid(format!("channel must be between 0 and {} for {}", max_channel, model)));
        }

        if self.receiver.poll_interval_ms == 0 || self.receiver.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if self.sender.interval_ms == 0 || self.sender.interval_ms > 3_600_000 {
            return Err(invalid("sender interval_ms must be between 1 and 3600000"));
        }

        let encoded = payload::encode_dict(&self.sender.message()?)
            .map_err(|e| invalid(format!("sender message: {}", e)))?;
        if encoded.len() > MAX_PAYLOAD_SIZE {
            return Err(invalid(format!(
                "sender message encodes to {} bytes, limit is {}",
                encoded.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        if self.message_log.enabled && self.message_log.dir.is_empty() {
            return Err(invalid("message_log dir cannot be empty when enabled"));
        }

        if self.message_log.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.message_log.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }

    /// Module model named in `[module]`
    pub fn model(&self) -> Result<Model> {
        Model::from_id(&self.module.model)
    }

    /// Driver timeouts derived from `[serial]` and `[module]`
    pub fn driver_options(&self) -> DriverOptions {
        let response_timeout = Duration::from_millis(self.serial.timeout_ms);
        DriverOptions {
            timing: ModeTiming {
                aux_timeout: Duration::from_millis(self.module.aux_timeout_ms),
                unwired_aux_delay: Duration::from_millis(self.module.unwired_aux_delay_ms),
                ..ModeTiming::default()
            },
            response_timeout,
            receive_timeout: response_timeout,
        }
    }
}

impl RadioConfig {
    /// `base` with this section's address, channel and mode applied
    pub fn apply(&self, base: &Configuration) -> Configuration {
        let mut configuration = base.clone();
        configuration.addh = self.addh;
        configuration.addl = self.addl;
        configuration.chan = self.chan;
        configuration.transmission_mode.transmission = if self.fixed_transmission {
            TransmissionKind::Fixed
        } else {
            TransmissionKind::Transparent
        };
        configuration.transmission_mode.enable_rssi = self.enable_rssi;
        configuration
    }

    pub fn persistence(&self) -> Persistence {
        if self.persist {
            Persistence::Permanent
        } else {
            Persistence::Temporary
        }
    }
}

impl SenderConfig {
    /// Destination node address
    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.addh, self.addl])
    }

    /// The `[sender.message]` table as a dictionary
    ///
    /// # Errors
    ///
    /// Returns `Config` for values other than strings, integers, floats and
    /// booleans
    pub fn message(&self) -> Result<Dictionary> {
        let mut dictionary = Dictionary::new();
        for (key, value) in &self.message {
            let value = match value {
                toml::Value::String(s) => Value::String(s.clone()),
                toml::Value::Integer(i) => Value::Integer(*i),
                toml::Value::Float(f) => Value::Float(*f),
                toml::Value::Boolean(b) => Value::Boolean(*b),
                other => {
                    return Err(invalid(format!(
                        "sender message value for {:?} must be a string, number or boolean, got {}",
                        key,
                        other.type_str()
                    )))
                }
            };
            dictionary.insert(key.as_str(), value);
        }
        Ok(dictionary)
    }
}
