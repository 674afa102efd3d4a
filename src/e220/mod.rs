//! # E220 Protocol Module
//!
//! Wire-level protocol of EBYTE E220/E22 LoRa modules.
//!
//! This module handles:
//! - Model table and per-family register layouts
//! - Configuration register encoding and decoding
//! - The configuration command protocol (read, write, reset)
//! - Fixed/transparent transmission frames and RSSI extraction
//! - Dictionary payload encoding

pub mod command;
pub mod frame;
pub mod model;
pub mod payload;
pub mod registers;
