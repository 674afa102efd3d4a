//! # Transmission Frames
//!
//! Bytes written to the module in normal mode, and bytes it hands back.
//!
//! ```text
//! transparent: [payload...]
//! fixed:       [ADDH][ADDL][CHAN][payload...]
//! received:    [payload...][RSSI, if enabled on both ends]
//! ```
//!
//! In fixed mode the receiving module strips the address header before
//! output, so a received frame is always payload plus optional RSSI.

use bytes::{BufMut, BytesMut};

use super::registers::TransmissionKind;
use crate::error::{LoraError, Result};

/// Largest payload the module accepts in one write
pub const MAX_PAYLOAD_SIZE: usize = 200;

/// Address every node accepts in fixed mode
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;

/// Size of the fixed-mode address header
pub const FIXED_HEADER_LENGTH: usize = 3;

/// Offset subtracted from the raw RSSI byte to get dBm
pub const RSSI_OFFSET: i16 = 256;

/// Signal strength of a received frame, as reported by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rssi(pub u8);

impl Rssi {
    /// Strongest value the module reports
    pub const MAX_DBM: i16 = -1;
    /// Weakest value the module reports
    pub const MIN_DBM: i16 = -RSSI_OFFSET;

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Signal strength in dBm
    pub fn dbm(self) -> i16 {
        i16::from(self.0) - RSSI_OFFSET
    }
}

/// Frame to be written to the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionFrame {
    Transparent { payload: Vec<u8> },
    Fixed { address: u16, channel: u8, payload: Vec<u8> },
}

/// Payload and signal strength of a received frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub payload: Vec<u8>,
    pub rssi: Option<Rssi>,
}

impl TransmissionFrame {
    /// Build a frame, checking the address/channel combination
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if a fixed frame lacks address or channel, or a
    ///   transparent frame is given one
    /// - `PacketTooBig` if the payload exceeds [`MAX_PAYLOAD_SIZE`]
    pub fn new(kind: TransmissionKind, address: Option<u16>, channel: Option<u8>, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LoraError::PacketTooBig {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        match (kind, address, channel) {
            (TransmissionKind::Transparent, None, None) => Ok(TransmissionFrame::Transparent { payload }),
            (TransmissionKind::Transparent, _, _) => Err(LoraError::InvalidArgument(
                "transparent transmission takes no address or channel".to_string(),
            )),
            (TransmissionKind::Fixed, Some(address), Some(channel)) => Ok(TransmissionFrame::Fixed {
                address,
                channel,
                payload,
            }),
            (TransmissionKind::Fixed, _, _) => Err(LoraError::InvalidArgument(
                "fixed transmission needs both address and channel".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> TransmissionKind {
        match self {
            TransmissionFrame::Transparent { .. } => TransmissionKind::Transparent,
            TransmissionFrame::Fixed { .. } => TransmissionKind::Fixed,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            TransmissionFrame::Transparent { payload } | TransmissionFrame::Fixed { payload, .. } => payload,
        }
    }

    /// Bytes to write to the module
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            TransmissionFrame::Transparent { payload } => payload.clone(),
            TransmissionFrame::Fixed { address, channel, payload } => {
                let mut frame = BytesMut::with_capacity(FIXED_HEADER_LENGTH + payload.len());
                frame.put_u16(*address);
                frame.put_u8(*channel);
                frame.put_slice(payload);
                frame.to_vec()
            }
        }
    }
}

/// Build the bytes for one transmission
pub fn build_frame(kind: TransmissionKind, address: Option<u16>, channel: Option<u8>, payload: &[u8]) -> Result<Vec<u8>> {
    Ok(TransmissionFrame::new(kind, address, channel, payload.to_vec())?.to_bytes())
}

/// Split bytes received from the module into payload and RSSI
///
/// `rssi_expected` must reflect this receiver's own RSSI setting; the frame
/// itself does not say whether a trailing byte was appended.
///
/// # Errors
///
/// Returns `MalformedFrame` if an RSSI byte is expected but the frame is empty
pub fn parse_frame(bytes: &[u8], rssi_expected: bool) -> Result<ParsedFrame> {
    if !rssi_expected {
        return Ok(ParsedFrame {
            payload: bytes.to_vec(),
            rssi: None,
        });
    }

    match bytes.split_last() {
        Some((&rssi, payload)) => Ok(ParsedFrame {
            payload: payload.to_vec(),
            rssi: Some(Rssi(rssi)),
        }),
        None => Err(LoraError::MalformedFrame("frame too short for RSSI byte".to_string())),
    }
}

/// Parse a frame that still carries its fixed-mode address header
///
/// Returns the destination address, channel and parsed remainder.
pub fn parse_addressed_frame(bytes: &[u8], rssi_expected: bool) -> Result<(u16, u8, ParsedFrame)> {
    let minimum = FIXED_HEADER_LENGTH + usize::from(rssi_expected);
    if bytes.len() < minimum {
        return Err(LoraError::MalformedFrame(format!(
            "fixed frame needs at least {} bytes, got {}",
            minimum,
            bytes.len()
        )));
    }

    let address = u16::from_be_bytes([bytes[0], bytes[1]]);
    let channel = bytes[2];
    Ok((address, channel, parse_frame(&bytes[FIXED_HEADER_LENGTH..], rssi_expected)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_frame_is_payload() {
        let frame = build_frame(TransmissionKind::Transparent, None, None, b"hello").unwrap();
        assert_eq!(frame, b"hello".to_vec());
    }

    #[test]
    fn test_fixed_frame_layout() {
        let frame = build_frame(TransmissionKind::Fixed, Some(0x0001), Some(23), b"hi").unwrap();
        assert_eq!(frame, vec![0x00, 0x01, 23, b'h', b'i']);
    }

    #[test]
    fn test_fixed_without_address_is_invalid() {
        let result = build_frame(TransmissionKind::Fixed, None, Some(23), b"hi");
        assert!(matches!(result, Err(LoraError::InvalidArgument(_))));

        let result = build_frame(TransmissionKind::Fixed, Some(1), None, b"hi");
        assert!(matches!(result, Err(LoraError::InvalidArgument(_))));
    }

    #[test]
    fn test_transparent_with_address_is_invalid() {
        let result = build_frame(TransmissionKind::Transparent, Some(1), None, b"hi");
        assert!(matches!(result, Err(LoraError::InvalidArgument(_))));
    }

    #[test]
    fn test_payload_limit() {
        assert!(build_frame(TransmissionKind::Transparent, None, None, &[0u8; MAX_PAYLOAD_SIZE]).is_ok());

        match build_frame(TransmissionKind::Fixed, Some(1), Some(2), &[0u8; MAX_PAYLOAD_SIZE + 1]) {
            Err(LoraError::PacketTooBig { size, max }) => {
                assert_eq!(size, 201);
                assert_eq!(max, 200);
            }
            other => panic!("Expected PacketTooBig, got: {:?}", other),
        }
    }

    #[test]
    fn test_fixed_frame_parses_back_to_payload() {
        for (address, channel, payload) in [
            (0x0000u16, 0u8, Vec::new()),
            (0x0001, 23, b"value".to_vec()),
            (BROADCAST_ADDRESS, 83, vec![0xFF; 197]),
        ] {
            let frame = build_frame(TransmissionKind::Fixed, Some(address), Some(channel), &payload).unwrap();
            let (parsed_address, parsed_channel, parsed) = parse_addressed_frame(&frame, false).unwrap();
            assert_eq!(parsed_address, address);
            assert_eq!(parsed_channel, channel);
            assert_eq!(parsed.payload, payload);
            assert_eq!(parsed.rssi, None);
        }
    }

    #[test]
    fn test_rssi_extraction() {
        let mut frame = b"payload".to_vec();
        frame.push(0xA0);

        let parsed = parse_frame(&frame, true).unwrap();
        assert_eq!(parsed.payload, b"payload".to_vec());
        assert_eq!(parsed.rssi, Some(Rssi(0xA0)));
        assert_eq!(parsed.rssi.unwrap().dbm(), -96);
    }

    #[test]
    fn test_rssi_expected_on_empty_frame() {
        assert!(matches!(parse_frame(&[], true), Err(LoraError::MalformedFrame(_))));
        assert!(parse_frame(&[], false).unwrap().payload.is_empty());
    }

    #[test]
    fn test_short_addressed_frame() {
        assert!(matches!(parse_addressed_frame(&[0x00, 0x01], false), Err(LoraError::MalformedFrame(_))));
        assert!(matches!(parse_addressed_frame(&[0x00, 0x01, 23], true), Err(LoraError::MalformedFrame(_))));
    }

    #[test]
    fn test_rssi_range() {
        assert_eq!(Rssi(0).dbm(), Rssi::MIN_DBM);
        assert_eq!(Rssi(255).dbm(), Rssi::MAX_DBM);
    }

    #[test]
    fn test_frame_accessors() {
        let frame = TransmissionFrame::new(TransmissionKind::Fixed, Some(2), Some(3), vec![9]).unwrap();
        assert_eq!(frame.kind(), TransmissionKind::Fixed);
        assert_eq!(frame.payload(), &[9]);
    }
}
