//! # LoRa E220 Library
//!
//! Drive EBYTE E220 (and E22) LoRa modules over a UART.
//!
//! This library provides configuration register access, operating mode
//! control through M0/M1/AUX, fixed and transparent messaging with optional
//! RSSI, and a compact dictionary payload format.

pub mod config;
pub mod driver;
pub mod e220;
pub mod error;
pub mod lines;
pub mod mode;
pub mod serial;
pub mod telemetry;
pub mod timing;

pub use driver::{DriverOptions, LoraE220, Received};
pub use error::{LoraError, ResponseStatusCode, Result};
