//! # Telemetry Module
//!
//! Logs received messages to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting received messages as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;
pub mod types;

pub use logger::MessageLog;
pub use types::MessageRecord;
