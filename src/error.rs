//! # Error Types
//!
//! Custom error types for the LoRa E220 driver using `thiserror`, plus the
//! numeric status taxonomy reported by every public operation.

use std::fmt;

use thiserror::Error;

/// Main error type for the LoRa E220 driver
#[derive(Debug, Error)]
pub enum LoraError {
    /// AUX never signalled ready, or the module never answered in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Length or shape of a frame does not match what was expected
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Echoed command header does not match the request
    #[error("Unexpected opcode: expected {expected:02X?}, got {actual:02X?}")]
    UnexpectedOpcode { expected: [u8; 3], actual: [u8; 3] },

    /// Module rejected the command (answered `FF FF FF`)
    #[error("Module reported wrong command format")]
    WrongFormat,

    /// I/O errors on the serial link
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialPort(#[from] tokio_serial::Error),

    /// A control line (M0, M1, AUX) could not be driven or sampled
    #[error("Control line error: {0}")]
    Line(String),

    /// Receive attempted while nothing is buffered
    #[error("No data available")]
    NoData,

    /// Caller supplied an inconsistent combination of arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Payload exceeds what the module accepts in a single packet
    #[error("Packet too big: {size} bytes (maximum {max})")]
    PacketTooBig { size: usize, max: usize },

    /// Model identifier not present in the model table
    #[error("Unknown module model: {0}")]
    UnknownModel(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type alias for the LoRa E220 driver
pub type Result<T> = std::result::Result<T, LoraError>;

impl LoraError {
    /// Status code this error reports to callers
    pub fn status(&self) -> ResponseStatusCode {
        match self {
            LoraError::Timeout(_) => ResponseStatusCode::Timeout,
            LoraError::MalformedFrame(_) => ResponseStatusCode::MalformedFrame,
            LoraError::UnexpectedOpcode { .. } => ResponseStatusCode::UnexpectedOpcode,
            LoraError::WrongFormat => ResponseStatusCode::WrongFormat,
            LoraError::Transport(_) | LoraError::SerialPort(_) | LoraError::Line(_) => {
                ResponseStatusCode::TransportError
            }
            LoraError::NoData => ResponseStatusCode::NoData,
            LoraError::InvalidArgument(_) | LoraError::UnknownModel(_) | LoraError::Config(_) => {
                ResponseStatusCode::InvalidArgument
            }
            LoraError::PacketTooBig { .. } => ResponseStatusCode::PacketTooBig,
        }
    }

    /// `false` for outcomes that are a normal empty result rather than a failure
    pub fn is_failure(&self) -> bool {
        !matches!(self, LoraError::NoData)
    }

    /// Whether repeating the same operation can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoraError::Timeout(_) | LoraError::UnexpectedOpcode { .. } | LoraError::WrongFormat
        )
    }
}

/// Status of a driver operation, with a stable numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseStatusCode {
    Success = 1,
    Unknown = 2,
    InvalidArgument = 6,
    MalformedFrame = 7,
    Timeout = 9,
    TransportError = 10,
    UnexpectedOpcode = 11,
    NoData = 12,
    WrongFormat = 14,
    PacketTooBig = 15,
}

impl ResponseStatusCode {
    const ALL: [ResponseStatusCode; 10] = [
        ResponseStatusCode::Success,
        ResponseStatusCode::Unknown,
        ResponseStatusCode::InvalidArgument,
        ResponseStatusCode::MalformedFrame,
        ResponseStatusCode::Timeout,
        ResponseStatusCode::TransportError,
        ResponseStatusCode::UnexpectedOpcode,
        ResponseStatusCode::NoData,
        ResponseStatusCode::WrongFormat,
        ResponseStatusCode::PacketTooBig,
    ];

    /// Numeric code of this status
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a status by its numeric code; unassigned codes map to `Unknown`
    pub fn from_code(code: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .unwrap_or(ResponseStatusCode::Unknown)
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ResponseStatusCode::Success => "Success",
            ResponseStatusCode::Unknown => "Unknown",
            ResponseStatusCode::InvalidArgument => "Invalid argument",
            ResponseStatusCode::MalformedFrame => "Data size not match",
            ResponseStatusCode::Timeout => "Timeout waiting for the module",
            ResponseStatusCode::TransportError => "Hardware or serial link error",
            ResponseStatusCode::UnexpectedOpcode => "Returned command header not recognized",
            ResponseStatusCode::NoData => "No data available",
            ResponseStatusCode::WrongFormat => "Module reported wrong command format",
            ResponseStatusCode::PacketTooBig => "Packet too big, send at most 200 bytes",
        }
    }

    pub fn is_success(self) -> bool {
        self == ResponseStatusCode::Success
    }
}

impl fmt::Display for ResponseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Status of any driver result: `Success` for `Ok`, the error's status otherwise
pub fn status_of<T>(result: &Result<T>) -> ResponseStatusCode {
    match result {
        Ok(_) => ResponseStatusCode::Success,
        Err(e) => e.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(ResponseStatusCode::Success.code(), 1);
        assert_eq!(ResponseStatusCode::Timeout.code(), 9);
        assert_eq!(ResponseStatusCode::NoData.code(), 12);
        assert_eq!(ResponseStatusCode::PacketTooBig.code(), 15);
    }

    #[test]
    fn test_from_code_round_trips_every_status() {
        for status in ResponseStatusCode::ALL {
            assert_eq!(ResponseStatusCode::from_code(status.code()), status);
        }
        assert_eq!(ResponseStatusCode::from_code(0), ResponseStatusCode::Unknown);
        assert_eq!(ResponseStatusCode::from_code(200), ResponseStatusCode::Unknown);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(LoraError::Timeout("aux".into()).status(), ResponseStatusCode::Timeout);
        assert_eq!(LoraError::NoData.status(), ResponseStatusCode::NoData);
        assert_eq!(
            LoraError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")).status(),
            ResponseStatusCode::TransportError
        );
        assert_eq!(
            LoraError::UnknownModel("X".into()).status(),
            ResponseStatusCode::InvalidArgument
        );
    }

    #[test]
    fn test_no_data_is_not_a_failure() {
        assert!(!LoraError::NoData.is_failure());
        assert!(LoraError::WrongFormat.is_failure());
    }

    #[test]
    fn test_retryable_classes() {
        assert!(LoraError::Timeout("x".into()).is_retryable());
        assert!(LoraError::UnexpectedOpcode { expected: [0xC1, 0, 8], actual: [0xC0, 0, 8] }.is_retryable());
        assert!(!LoraError::MalformedFrame("x".into()).is_retryable());
        assert!(!LoraError::InvalidArgument("x".into()).is_retryable());
    }

    #[test]
    fn test_status_of() {
        let ok: Result<()> = Ok(());
        let err: Result<()> = Err(LoraError::WrongFormat);
        assert!(status_of(&ok).is_success());
        assert_eq!(status_of(&err), ResponseStatusCode::WrongFormat);
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(ResponseStatusCode::Success.to_string(), "Success (1)");
    }
}
