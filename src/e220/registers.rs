//! # Configuration Registers
//!
//! Typed view of the module's configuration register block and its binary
//! encoding.
//!
//! ## Register bits (E220, E22 shifts everything after ADDL by one NETID byte)
//!
//! | Register | Bits | Field |
//! |----------|------|-------|
//! | SPED | 7-5 | UART baud rate |
//! | SPED | 4-3 | UART parity |
//! | SPED | 2-0 | air data rate |
//! | OPTION | 7-6 | sub-packet size |
//! | OPTION | 5 | RSSI ambient noise |
//! | OPTION | 1-0 | transmission power |
//! | TRANSMISSION_MODE | 7 | RSSI byte enable |
//! | TRANSMISSION_MODE | 6 | fixed transmission |
//! | TRANSMISSION_MODE | 5 | repeater (E22 only) |
//! | TRANSMISSION_MODE | 4 | listen before talk |
//! | TRANSMISSION_MODE | 2-0 | WOR period |
//!
//! Bits not listed are reserved. A [`Configuration`] remembers the register
//! image it was decoded from and writes reserved bits back unchanged.
//!
//! Encoding a freshly constructed [`Configuration`] uses the factory
//! defaults for every reserved bit; decode from a read first when the module
//! may carry firmware settings this driver does not model.

use super::model::Model;
use crate::error::{LoraError, Result};

/// UART speed between host and module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartBaudRate {
    Bps1200 = 0b000,
    Bps2400 = 0b001,
    Bps4800 = 0b010,
    Bps9600 = 0b011,
    Bps19200 = 0b100,
    Bps38400 = 0b101,
    Bps57600 = 0b110,
    Bps115200 = 0b111,
}

impl UartBaudRate {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => UartBaudRate::Bps1200,
            0b001 => UartBaudRate::Bps2400,
            0b010 => UartBaudRate::Bps4800,
            0b011 => UartBaudRate::Bps9600,
            0b100 => UartBaudRate::Bps19200,
            0b101 => UartBaudRate::Bps38400,
            0b110 => UartBaudRate::Bps57600,
            _ => UartBaudRate::Bps115200,
        }
    }

    pub fn bps(self) -> u32 {
        match self {
            UartBaudRate::Bps57600 => 57_600,
            UartBaudRate::Bps115200 => 115_200,
            other => 1200 << (other as u32),
        }
    }
}

/// UART framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartParity {
    /// 8N1 (`0b11` is read back as 8N1 as well)
    None8N1 = 0b00,
    Odd8O1 = 0b01,
    Even8E1 = 0b10,
}

impl UartParity {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => UartParity::Odd8O1,
            0b10 => UartParity::Even8E1,
            _ => UartParity::None8N1,
        }
    }
}

/// 3-bit air data rate code; its bps depends on the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirDataRate(u8);

impl AirDataRate {
    /// Factory default, 2.4 kbps on every model
    pub const DEFAULT: AirDataRate = AirDataRate(0b010);

    pub fn from_code(code: u8) -> Result<Self> {
        if code > 0b111 {
            return Err(LoraError::InvalidArgument(format!("air data rate code {} out of range", code)));
        }
        Ok(AirDataRate(code))
    }

    /// Code of the given rate on `model`
    pub fn from_bps(model: Model, bps: u32) -> Result<Self> {
        model
            .spec()
            .air_data_rate_bps
            .iter()
            .rposition(|&rate| rate == bps)
            .map(|code| AirDataRate(code as u8))
            .ok_or_else(|| {
                LoraError::InvalidArgument(format!("{} bps is not an air data rate of {}", bps, model))
            })
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn bps(self, model: Model) -> u32 {
        model.spec().air_data_rate_bps[self.0 as usize]
    }
}

/// Maximum bytes the module sends in one over-the-air packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPacketSize {
    Bytes200 = 0b00,
    Bytes128 = 0b01,
    Bytes64 = 0b10,
    Bytes32 = 0b11,
}

impl SubPacketSize {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => SubPacketSize::Bytes200,
            0b01 => SubPacketSize::Bytes128,
            0b10 => SubPacketSize::Bytes64,
            _ => SubPacketSize::Bytes32,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            SubPacketSize::Bytes200 => 200,
            SubPacketSize::Bytes128 => 128,
            SubPacketSize::Bytes64 => 64,
            SubPacketSize::Bytes32 => 32,
        }
    }
}

/// 2-bit transmission power code; its dBm depends on the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionPower(u8);

impl TransmissionPower {
    /// Highest power the model supports
    pub const MAX: TransmissionPower = TransmissionPower(0b00);

    pub fn from_code(code: u8) -> Result<Self> {
        if code > 0b11 {
            return Err(LoraError::InvalidArgument(format!("power code {} out of range", code)));
        }
        Ok(TransmissionPower(code))
    }

    /// Code of the given output power on `model`
    pub fn from_dbm(model: Model, dbm: i8) -> Result<Self> {
        model
            .spec()
            .power_dbm
            .iter()
            .position(|&p| p == dbm)
            .map(|code| TransmissionPower(code as u8))
            .ok_or_else(|| LoraError::InvalidArgument(format!("{} dBm is not a power level of {}", dbm, model)))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn dbm(self, model: Model) -> i8 {
        model.spec().power_dbm[self.0 as usize]
    }
}

/// Wake-on-radio cycle, `500 ms * (code + 1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorPeriod(u8);

impl WorPeriod {
    /// Factory default, 2000 ms
    pub const DEFAULT: WorPeriod = WorPeriod(0b011);

    pub fn from_code(code: u8) -> Result<Self> {
        if code > 0b111 {
            return Err(LoraError::InvalidArgument(format!("WOR period code {} out of range", code)));
        }
        Ok(WorPeriod(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn millis(self) -> u32 {
        500 * (u32::from(self.0) + 1)
    }
}

/// How frames are addressed on air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionKind {
    /// Every node on the channel receives every frame
    #[default]
    Transparent,
    /// Frames carry destination address and channel
    Fixed,
}

/// SPED register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed {
    pub uart_baud_rate: UartBaudRate,
    pub uart_parity: UartParity,
    pub air_data_rate: AirDataRate,
}

impl Speed {
    fn from_byte(byte: u8) -> Self {
        Self {
            uart_baud_rate: UartBaudRate::from_bits(byte >> 5),
            uart_parity: UartParity::from_bits(byte >> 3),
            air_data_rate: AirDataRate(byte & 0b111),
        }
    }

    fn to_byte(self) -> u8 {
        (self.uart_baud_rate as u8) << 5 | (self.uart_parity as u8) << 3 | self.air_data_rate.0
    }
}

/// OPTION register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioOption {
    pub sub_packet_size: SubPacketSize,
    pub rssi_ambient_noise: bool,
    pub transmission_power: TransmissionPower,
}

impl RadioOption {
    fn from_byte(byte: u8) -> Self {
        Self {
            sub_packet_size: SubPacketSize::from_bits(byte >> 6),
            rssi_ambient_noise: byte & 0b0010_0000 != 0,
            transmission_power: TransmissionPower(byte & 0b11),
        }
    }

    fn to_byte(self) -> u8 {
        (self.sub_packet_size as u8) << 6
            | u8::from(self.rssi_ambient_noise) << 5
            | self.transmission_power.0
    }
}

/// TRANSMISSION_MODE register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionMode {
    pub enable_rssi: bool,
    pub transmission: TransmissionKind,
    /// Only meaningful on models with a repeater bit; ignored elsewhere
    pub enable_repeater: bool,
    pub enable_lbt: bool,
    pub wor_period: WorPeriod,
}

impl TransmissionMode {
    fn from_byte(byte: u8, repeater_bit: Option<u8>) -> Self {
        Self {
            enable_rssi: byte & 0x80 != 0,
            transmission: if byte & 0x40 != 0 {
                TransmissionKind::Fixed
            } else {
                TransmissionKind::Transparent
            },
            enable_repeater: repeater_bit.is_some_and(|bit| byte & (1 << bit) != 0),
            enable_lbt: byte & 0x10 != 0,
            wor_period: WorPeriod(byte & 0b111),
        }
    }

    fn to_byte(self, repeater_bit: Option<u8>) -> u8 {
        let repeater = match repeater_bit {
            Some(bit) if self.enable_repeater => 1 << bit,
            _ => 0,
        };
        u8::from(self.enable_rssi) << 7
            | u8::from(self.transmission == TransmissionKind::Fixed) << 6
            | repeater
            | u8::from(self.enable_lbt) << 4
            | self.wor_period.0
    }

    pub fn is_fixed(&self) -> bool {
        self.transmission == TransmissionKind::Fixed
    }
}

/// Contents of the module's configuration registers
#[derive(Debug, Clone)]
pub struct Configuration {
    model: Model,
    pub addh: u8,
    pub addl: u8,
    /// Network id; only encoded on models with a NETID register
    pub net_id: u8,
    pub chan: u8,
    pub speed: Speed,
    pub option: RadioOption,
    pub transmission_mode: TransmissionMode,
    /// Encryption key; write-only, modules read it back as zero
    pub crypt: u16,
    /// Register image this value was decoded from
    raw: Vec<u8>,
}

impl Configuration {
    /// Factory-default configuration of `model`
    ///
    /// Reserved bits are taken from the factory image, not from the module.
    /// For partial edits prefer a value read back from the module, which
    /// carries the module's own reserved bits.
    pub fn new(model: Model) -> Self {
        let raw = model.default_registers();
        Self::from_registers(model, raw)
    }

    /// Default configuration for a model id
    ///
    /// # Examples
    ///
    /// ```
    /// use lora_e220::e220::registers::Configuration;
    ///
    /// let mut config = Configuration::for_model("400T22D")?;
    /// config.addl = 0x01;
    /// config.chan = 23;
    /// config.transmission_mode.enable_rssi = true;
    /// assert_eq!(config.encode().len(), 8);
    /// # Ok::<(), lora_e220::error::LoraError>(())
    /// ```
    pub fn for_model(id: &str) -> Result<Self> {
        Ok(Self::new(Model::from_id(id)?))
    }

    /// Decode a register block read from the module
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if `bytes` is not exactly the model's
    /// register length
    pub fn decode(bytes: &[u8], model: Model) -> Result<Self> {
        let expected = model.layout().length;
        if bytes.len() != expected {
            return Err(LoraError::MalformedFrame(format!(
                "{} configuration is {} bytes, got {}",
                model,
                expected,
                bytes.len()
            )));
        }
        Ok(Self::from_registers(model, bytes.to_vec()))
    }

    fn from_registers(model: Model, raw: Vec<u8>) -> Self {
        let layout = model.layout();
        let byte = |field: super::model::Field| field.get(&raw) as u8;
        let address = layout.address.get(&raw);

        Self {
            model,
            addh: (address >> 8) as u8,
            addl: address as u8,
            net_id: layout.net_id.map_or(0, byte),
            chan: byte(layout.channel),
            speed: Speed::from_byte(byte(layout.speed)),
            option: RadioOption::from_byte(byte(layout.option)),
            transmission_mode: TransmissionMode::from_byte(byte(layout.transmission_mode), layout.repeater_bit),
            crypt: layout.crypt.get(&raw),
            raw,
        }
    }

    /// Encode into the register block sent with a write command
    pub fn encode(&self) -> Vec<u8> {
        let layout = self.model.layout();
        let mut registers = self.raw.clone();

        layout.address.put(&mut registers, self.address(), 0xFFFF);
        if let Some(field) = layout.net_id {
            field.put(&mut registers, u16::from(self.net_id), 0xFF);
        }
        layout.speed.put(&mut registers, u16::from(self.speed.to_byte()), 0xFF);
        layout
            .option
            .put(&mut registers, u16::from(self.option.to_byte()), u16::from(layout.option_mask));
        layout.channel.put(&mut registers, u16::from(self.chan), 0xFF);
        layout.transmission_mode.put(
            &mut registers,
            u16::from(self.transmission_mode.to_byte(layout.repeater_bit)),
            u16::from(layout.transmission_mode_mask),
        );
        layout.crypt.put(&mut registers, self.crypt, 0xFFFF);

        registers
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// 16-bit node address, ADDH high byte
    pub fn address(&self) -> u16 {
        u16::from_be_bytes([self.addh, self.addl])
    }

    pub fn set_address(&mut self, address: u16) {
        [self.addh, self.addl] = address.to_be_bytes();
    }

    /// Carrier frequency of the configured channel in MHz
    pub fn frequency_mhz(&self) -> f64 {
        self.model.frequency_mhz(self.chan)
    }

    pub fn transmission_power_dbm(&self) -> i8 {
        self.option.transmission_power.dbm(self.model)
    }

    pub fn air_data_rate_bps(&self) -> u32 {
        self.speed.air_data_rate.bps(self.model)
    }

    /// Reject values the module cannot hold
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the channel is above the model's range
    pub fn validate(&self) -> Result<()> {
        let max = self.model.spec().max_channel;
        if self.chan > max {
            return Err(LoraError::InvalidArgument(format!(
                "channel {} exceeds maximum {} for {}",
                self.chan, max, self.model
            )));
        }
        Ok(())
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.encode() == other.encode()
    }
}

impl Eq for Configuration {}
