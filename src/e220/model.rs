//! # Module Models
//!
//! Closed set of supported modules and their register layouts.
//!
//! Model ids follow the part number printed on the module, e.g.
//! `E220-400T22D`: family `E220`, band `400` MHz, `T`TL UART, `22` dBm.
//! A bare `400T22D` selects the E220 variant.
//!
//! Regional part numbers resolve to the table entry sharing their register
//! set: bands 410/433 use the 400 MHz entry and 868/915 the 900 MHz entry,
//! and transmit powers up to 26 dBm use the 22 dBm entry, higher ones the
//! 30 dBm entry. `433T20D` is therefore `E220-400T22D`.

use std::fmt;

use crate::error::{LoraError, Result};

/// Position of a register field inside the register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Byte offset from register 0x00
    pub offset: usize,
    /// Width in bytes, most-significant byte first
    pub width: usize,
}

impl Field {
    const fn byte(offset: usize) -> Self {
        Self { offset, width: 1 }
    }

    const fn word(offset: usize) -> Self {
        Self { offset, width: 2 }
    }

    /// Read the field out of a register image
    pub fn get(&self, registers: &[u8]) -> u16 {
        registers[self.offset..self.offset + self.width]
            .iter()
            .fold(0u16, |acc, &b| (acc << 8) | u16::from(b))
    }

    /// Write the field into a register image, keeping bits outside `mask`
    pub fn put(&self, registers: &mut [u8], value: u16, mask: u16) {
        let current = self.get(registers);
        let merged = (current & !mask) | (value & mask);
        let bytes = merged.to_be_bytes();
        registers[self.offset..self.offset + self.width].copy_from_slice(&bytes[2 - self.width..]);
    }
}

/// Byte layout of a family's configuration registers
#[derive(Debug, PartialEq, Eq)]
pub struct RegisterLayout {
    /// Number of configuration registers, starting at 0x00
    pub length: usize,
    pub address: Field,
    pub net_id: Option<Field>,
    pub speed: Field,
    pub option: Field,
    pub channel: Field,
    pub transmission_mode: Field,
    pub crypt: Field,
    /// Bits of the option register the driver models
    pub option_mask: u8,
    /// Bits of the transmission-mode register the driver models
    pub transmission_mode_mask: u8,
    /// Repeater flag bit in the transmission-mode register, if the family has one
    pub repeater_bit: Option<u8>,
    /// First product-information register
    pub pid_start: u8,
    /// Number of product-information registers
    pub pid_length: u8,
    /// Register image of a factory-reset module, channel excluded
    pub defaults: &'static [u8],
}

/// E220: ADDH ADDL REG0 REG1 CHAN REG3 CRYPT_H CRYPT_L
pub static E220_LAYOUT: RegisterLayout = RegisterLayout {
    length: 8,
    address: Field::word(0),
    net_id: None,
    speed: Field::byte(2),
    option: Field::byte(3),
    channel: Field::byte(4),
    transmission_mode: Field::byte(5),
    crypt: Field::word(6),
    option_mask: 0b1110_0011,
    transmission_mode_mask: 0b1101_0111,
    repeater_bit: None,
    pid_start: 0x08,
    pid_length: 3,
    defaults: &[0x00, 0x00, 0x62, 0x00, 0x00, 0x03, 0x00, 0x00],
};

/// E22: ADDH ADDL NETID REG0 REG1 CHAN REG3 CRYPT_H CRYPT_L
pub static E22_LAYOUT: RegisterLayout = RegisterLayout {
    length: 9,
    address: Field::word(0),
    net_id: Some(Field::byte(2)),
    speed: Field::byte(3),
    option: Field::byte(4),
    channel: Field::byte(5),
    transmission_mode: Field::byte(6),
    crypt: Field::word(7),
    option_mask: 0b1110_0011,
    transmission_mode_mask: 0b1111_0111,
    repeater_bit: Some(5),
    pid_start: 0x80,
    pid_length: 7,
    defaults: &[0x00, 0x00, 0x00, 0x62, 0x00, 0x00, 0x03, 0x00, 0x00],
};

/// Module family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    E220,
    E22,
}

/// Static description of one module variant
#[derive(Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub family: Family,
    pub layout: &'static RegisterLayout,
    /// Frequency of channel 0 in kHz
    pub base_frequency_khz: u32,
    pub max_channel: u8,
    pub default_channel: u8,
    /// Output power in dBm for power codes 0..=3
    pub power_dbm: [i8; 4],
    /// Air data rate in bps for rate codes 0..=7
    pub air_data_rate_bps: [u32; 8],
}

const E220_AIR_RATES: [u32; 8] = [2_400, 2_400, 2_400, 4_800, 9_600, 19_200, 38_400, 62_500];
const E22_AIR_RATES: [u32; 8] = [300, 1_200, 2_400, 4_800, 9_600, 19_200, 38_400, 62_500];
const POWER_22DBM: [i8; 4] = [22, 17, 13, 10];
const POWER_30DBM: [i8; 4] = [30, 27, 24, 21];

macro_rules! model {
    ($id:literal, $family:ident, $layout:ident, $band:literal, $power:ident, $rates:ident) => {
        ModelSpec {
            id: $id,
            family: Family::$family,
            layout: &$layout,
            base_frequency_khz: if $band == 400 { 410_125 } else { 850_125 },
            max_channel: if $band == 400 { 83 } else { 80 },
            default_channel: if $band == 400 { 23 } else { 18 },
            power_dbm: $power,
            air_data_rate_bps: $rates,
        }
    };
}

/// Every supported model
pub static MODELS: [ModelSpec; 8] = [
    model!("E220-400T22D", E220, E220_LAYOUT, 400, POWER_22DBM, E220_AIR_RATES),
    model!("E220-400T30D", E220, E220_LAYOUT, 400, POWER_30DBM, E220_AIR_RATES),
    model!("E220-900T22D", E220, E220_LAYOUT, 900, POWER_22DBM, E220_AIR_RATES),
    model!("E220-900T30D", E220, E220_LAYOUT, 900, POWER_30DBM, E220_AIR_RATES),
    model!("E22-400T22D", E22, E22_LAYOUT, 400, POWER_22DBM, E22_AIR_RATES),
    model!("E22-400T30D", E22, E22_LAYOUT, 400, POWER_30DBM, E22_AIR_RATES),
    model!("E22-900T22D", E22, E22_LAYOUT, 900, POWER_22DBM, E22_AIR_RATES),
    model!("E22-900T30D", E22, E22_LAYOUT, 900, POWER_30DBM, E22_AIR_RATES),
];

/// Handle to an entry of the model table
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Model(&'static ModelSpec);

impl Model {
    /// Look up a model by id
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the id does not resolve to a table entry
    ///
    /// # Examples
    ///
    /// ```
    /// use lora_e220::e220::model::Model;
    ///
    /// let model = Model::from_id("400T22D")?;
    /// assert_eq!(model.id(), "E220-400T22D");
    /// # Ok::<(), lora_e220::error::LoraError>(())
    /// ```
    pub fn from_id(id: &str) -> Result<Self> {
        let id = id.trim().to_ascii_uppercase();
        let qualified = if id.starts_with('E') { id } else { format!("E220-{}", id) };

        canonical_id(&qualified)
            .and_then(|canonical| MODELS.iter().find(|spec| spec.id == canonical))
            .map(Model)
            .ok_or(LoraError::UnknownModel(qualified))
    }

    pub fn spec(&self) -> &'static ModelSpec {
        self.0
    }

    pub fn id(&self) -> &'static str {
        self.0.id
    }

    pub fn family(&self) -> Family {
        self.0.family
    }

    pub fn layout(&self) -> &'static RegisterLayout {
        self.0.layout
    }

    /// Default register image with the model's default channel filled in
    pub fn default_registers(&self) -> Vec<u8> {
        let layout = self.layout();
        let mut registers = layout.defaults.to_vec();
        layout
            .channel
            .put(&mut registers, u16::from(self.0.default_channel), 0xFF);
        registers
    }

    /// Carrier frequency of `channel` in MHz
    pub fn frequency_mhz(&self, channel: u8) -> f64 {
        (f64::from(self.0.base_frequency_khz) + 1000.0 * f64::from(channel)) / 1000.0
    }
}

/// Map a qualified part number onto its table id, `None` if it does not parse
fn canonical_id(qualified: &str) -> Option<String> {
    let (family, part) = qualified.split_once('-')?;
    if family != "E220" && family != "E22" {
        return None;
    }

    let (band, rest) = part.split_once('T')?;
    let band = match band.parse::<u16>().ok()? {
        400 | 410 | 433 => 400,
        868 | 900 | 915 => 900,
        _ => return None,
    };

    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (power, package) = rest.split_at(digits);
    if package.is_empty() || !package.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let power = if power.parse::<u8>().ok()? <= 26 { 22 } else { 30 };

    Some(format!("{}-{}T{}D", family, band, power))
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.0.id).finish()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_bare_id_selects_e220() {
        let model = Model::from_id("400T22D").unwrap();
        assert_eq!(model.id(), "E220-400T22D");
        assert_eq!(model.family(), Family::E220);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Model::from_id("e22-900t30d").unwrap().id(), "E22-900T30D");
    }

    #[test]
    fn test_regional_part_numbers_resolve() {
        let model = Model::from_id("433T20D").unwrap();
        assert_eq!(model.id(), "E220-400T22D");
        assert!((model.frequency_mhz(0) - 410.125).abs() < 1e-9);

        assert_eq!(Model::from_id("868T20D").unwrap().id(), "E220-900T22D");
        assert_eq!(Model::from_id("E220-915T30D").unwrap().id(), "E220-900T30D");
        assert_eq!(Model::from_id("e22-433t33s").unwrap().id(), "E22-400T30D");
    }

    #[test]
    fn test_unknown_model() {
        for id in ["123X", "150T22D", "433T20", "433TXD", "E32-433T20D"] {
            match Model::from_id(id) {
                Err(LoraError::UnknownModel(reported)) => assert!(reported.ends_with(id), "{}", reported),
                other => panic!("Expected UnknownModel for {}, got: {:?}", id, other),
            }
        }
    }

    #[test]
    fn test_layout_lengths_match_defaults() {
        for spec in MODELS.iter() {
            assert_eq!(spec.layout.defaults.len(), spec.layout.length, "{}", spec.id);
        }
    }

    #[test]
    fn test_default_registers_carry_default_channel() {
        let e220 = Model::from_id("E220-400T22D").unwrap();
        assert_eq!(e220.default_registers(), vec![0x00, 0x00, 0x62, 0x00, 23, 0x03, 0x00, 0x00]);

        let e22 = Model::from_id("E22-900T22D").unwrap();
        assert_eq!(e22.default_registers()[5], 18);
    }

    #[test]
    fn test_frequency() {
        let model = Model::from_id("E220-400T22D").unwrap();
        assert!((model.frequency_mhz(23) - 433.125).abs() < 1e-9);

        let model = Model::from_id("E220-900T22D").unwrap();
        assert!((model.frequency_mhz(18) - 868.125).abs() < 1e-9);
    }

    #[test]
    fn test_field_put_preserves_unmasked_bits() {
        let mut registers = [0b1010_1010u8, 0x00];
        Field::byte(0).put(&mut registers, 0b0000_0101, 0b0000_0111);
        assert_eq!(registers[0], 0b1010_1101);
    }

    #[test]
    fn test_word_field_is_big_endian() {
        let mut registers = [0u8; 4];
        Field::word(1).put(&mut registers, 0x1234, 0xFFFF);
        assert_eq!(registers, [0x00, 0x12, 0x34, 0x00]);
        assert_eq!(Field::word(1).get(&registers), 0x1234);
    }
}
