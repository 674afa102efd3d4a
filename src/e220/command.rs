//! # Configuration Command Protocol
//!
//! Register read/write commands, valid only while the module is in
//! configuration mode (M0 = M1 = high, UART at 9600 8N1).
//!
//! ```text
//! request:  [opcode][start register][count] [count register bytes, writes only]
//! response: [0xC1  ][start register][count] [count register bytes]
//! rejected: [0xFF  ][0xFF          ][0xFF ]
//! ```
//!
//! One command is in flight at a time and nothing is retried here; a caller
//! that sees `Timeout` or `UnexpectedOpcode` decides whether to try again.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::{LoraError, Result};
use crate::serial::Transport;

/// Write registers, kept across power cycles
pub const OPCODE_WRITE_PERMANENT: u8 = 0xC0;
/// Read registers
pub const OPCODE_READ: u8 = 0xC1;
/// Write registers, lost on power down
pub const OPCODE_WRITE_TEMPORARY: u8 = 0xC2;
/// Opcode the module answers every accepted command with
pub const OPCODE_RESPONSE: u8 = 0xC1;
/// Module reset, sent three times
pub const OPCODE_RESET: u8 = 0xC4;
/// Header of a rejected command
pub const WRONG_FORMAT: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Size of the command header
pub const HEADER_LENGTH: usize = 3;

/// Whether a register write survives a power cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Saved to the module's non-volatile memory
    Permanent,
    /// Active until the next power down
    #[default]
    Temporary,
}

impl Persistence {
    pub fn opcode(self) -> u8 {
        match self {
            Persistence::Permanent => OPCODE_WRITE_PERMANENT,
            Persistence::Temporary => OPCODE_WRITE_TEMPORARY,
        }
    }
}

/// Progress of the command in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    SendingCommand,
    AwaitingEcho,
    Validating,
    Done,
    Failed,
}

/// Product information registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInformation {
    raw: Vec<u8>,
}

impl ModuleInformation {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn model(&self) -> Option<u8> {
        self.raw.first().copied()
    }

    pub fn version(&self) -> Option<u8> {
        self.raw.get(1).copied()
    }

    pub fn features(&self) -> Option<u8> {
        self.raw.get(2).copied()
    }
}

/// Issues configuration commands over a transport
pub struct CommandEngine<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    timeout: Duration,
    state: CommandState,
}

impl<'a, T: Transport + ?Sized> CommandEngine<'a, T> {
    /// # Arguments
    ///
    /// * `transport` - Link to a module already in configuration mode
    /// * `timeout` - How long to wait for the response to each command
    pub fn new(transport: &'a mut T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            state: CommandState::Idle,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Read `count` registers starting at `start`
    pub fn read_registers(&mut self, start: u8, count: u8) -> Result<Vec<u8>> {
        self.execute([OPCODE_READ, start, count], &[])
    }

    /// Write `data` starting at register `start`
    ///
    /// Returns the register values the module echoed back.
    pub fn write_registers(&mut self, persistence: Persistence, start: u8, data: &[u8]) -> Result<Vec<u8>> {
        let count = u8::try_from(data.len())
            .map_err(|_| LoraError::InvalidArgument(format!("cannot write {} registers", data.len())))?;
        self.execute([persistence.opcode(), start, count], data)
    }

    /// Reset the module; no echo follows, the module drops AUX while restarting
    pub fn reset(&mut self) -> Result<()> {
        self.transition(CommandState::SendingCommand);
        match self.send(&[OPCODE_RESET; 3]) {
            Ok(()) => {
                self.transition(CommandState::Done);
                Ok(())
            }
            Err(e) => {
                self.transition(CommandState::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self, header: [u8; HEADER_LENGTH], payload: &[u8]) -> Result<Vec<u8>> {
        let result = self.run(header, payload);
        match &result {
            Ok(_) => self.transition(CommandState::Done),
            Err(e) => {
                debug!("Command {:02X?} failed: {}", header, e);
                self.transition(CommandState::Failed);
            }
        }
        result
    }

    fn run(&mut self, header: [u8; HEADER_LENGTH], payload: &[u8]) -> Result<Vec<u8>> {
        self.transition(CommandState::SendingCommand);
        let mut frame = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
        frame.put_slice(&header);
        frame.put_slice(payload);
        self.transport.clear_input()?;
        self.send(&frame)?;

        self.transition(CommandState::AwaitingEcho);
        let count = header[2] as usize;
        let response = self.read_response(HEADER_LENGTH + count)?;

        self.transition(CommandState::Validating);
        let expected = [OPCODE_RESPONSE, header[1], header[2]];
        let actual = [response[0], response[1], response[2]];
        if actual != expected {
            return Err(LoraError::UnexpectedOpcode { expected, actual });
        }

        Ok(response[HEADER_LENGTH..].to_vec())
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let written = self.transport.write(frame)?;
        if written != frame.len() {
            return Err(LoraError::Transport(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, frame.len()),
            )));
        }
        Ok(())
    }

    fn read_response(&mut self, expected: usize) -> Result<Vec<u8>> {
        let mut response = Vec::with_capacity(expected);

        while response.len() < expected {
            let chunk = self.transport.read_available(expected - response.len(), self.timeout)?;
            if chunk.is_empty() {
                return Err(if response.is_empty() {
                    LoraError::Timeout(format!(
                        "no response from module within {} ms",
                        self.timeout.as_millis()
                    ))
                } else {
                    LoraError::MalformedFrame(format!(
                        "response truncated: expected {} bytes, got {}",
                        expected,
                        response.len()
                    ))
                });
            }
            response.extend_from_slice(&chunk);

            if response.len() >= HEADER_LENGTH && response[..HEADER_LENGTH] == WRONG_FORMAT {
                return Err(LoraError::WrongFormat);
            }
        }

        Ok(response)
    }

    fn transition(&mut self, next: CommandState) {
        trace!("Command state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::MockTransport;
    use mockall::Sequence;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn respond_with(mock: &mut MockTransport, chunks: Vec<Vec<u8>>) {
        let mut seq = Sequence::new();
        for chunk in chunks {
            mock.expect_read_available()
                .times(1)
                .in_sequence(&mut seq)
                .return_once(move |_, _| Ok(chunk));
        }
    }

    fn accepting_mock() -> MockTransport {
        let mut mock = MockTransport::new();
        mock.expect_clear_input().returning(|| Ok(()));
        mock.expect_write().returning(|bytes| Ok(bytes.len()));
        mock
    }

    #[test]
    fn test_read_registers() {
        let mut mock = MockTransport::new();
        mock.expect_clear_input().times(1).returning(|| Ok(()));
        mock.expect_write()
            .withf(|bytes| bytes == [0xC1, 0x00, 0x08])
            .times(1)
            .returning(|bytes| Ok(bytes.len()));
        respond_with(&mut mock, vec![vec![0xC1, 0x00, 0x08, 0x00, 0x01, 0x62, 0x00, 0x17, 0x03, 0x00, 0x00]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        let registers = engine.read_registers(0x00, 0x08).unwrap();

        assert_eq!(registers, vec![0x00, 0x01, 0x62, 0x00, 0x17, 0x03, 0x00, 0x00]);
        assert_eq!(engine.state(), CommandState::Done);
    }

    #[test]
    fn test_write_registers_sends_header_and_payload() {
        let mut mock = MockTransport::new();
        mock.expect_clear_input().returning(|| Ok(()));
        mock.expect_write()
            .withf(|bytes| bytes == [0xC0, 0x00, 0x02, 0x12, 0x34])
            .times(1)
            .returning(|bytes| Ok(bytes.len()));
        respond_with(&mut mock, vec![vec![0xC1, 0x00, 0x02, 0x12, 0x34]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        let echoed = engine.write_registers(Persistence::Permanent, 0x00, &[0x12, 0x34]).unwrap();
        assert_eq!(echoed, vec![0x12, 0x34]);
    }

    #[test]
    fn test_response_arriving_in_chunks() {
        let mut mock = accepting_mock();
        respond_with(&mut mock, vec![vec![0xC1], vec![0x08, 0x03, 0x20], vec![0x0B, 0x16]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        assert_eq!(engine.read_registers(0x08, 0x03).unwrap(), vec![0x20, 0x0B, 0x16]);
    }

    #[test]
    fn test_no_response_is_timeout() {
        let mut mock = accepting_mock();
        respond_with(&mut mock, vec![vec![]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        let result = engine.read_registers(0x00, 0x08);
        assert!(matches!(result, Err(LoraError::Timeout(_))));
        assert_eq!(engine.state(), CommandState::Failed);
    }

    #[test]
    fn test_truncated_response_is_malformed() {
        let mut mock = accepting_mock();
        respond_with(&mut mock, vec![vec![0xC1, 0x00, 0x08, 0x00], vec![]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        assert!(matches!(engine.read_registers(0x00, 0x08), Err(LoraError::MalformedFrame(_))));
    }

    #[test]
    fn test_wrong_format_response() {
        let mut mock = accepting_mock();
        respond_with(&mut mock, vec![vec![0xFF, 0xFF, 0xFF]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        assert!(matches!(engine.read_registers(0x00, 0x08), Err(LoraError::WrongFormat)));
    }

    #[test]
    fn test_mismatched_echo_is_unexpected_opcode() {
        let mut mock = accepting_mock();
        respond_with(&mut mock, vec![vec![0xC1, 0x02, 0x01, 0x62]]);

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        match engine.read_registers(0x03, 0x01) {
            Err(LoraError::UnexpectedOpcode { expected, actual }) => {
                assert_eq!(expected, [0xC1, 0x03, 0x01]);
                assert_eq!(actual, [0xC1, 0x02, 0x01]);
            }
            other => panic!("Expected UnexpectedOpcode, got: {:?}", other),
        }
    }

    #[test]
    fn test_short_write_is_transport_error() {
        let mut mock = MockTransport::new();
        mock.expect_clear_input().returning(|| Ok(()));
        mock.expect_write().returning(|_| Ok(1));
        mock.expect_read_available().never();

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        assert!(matches!(engine.read_registers(0x00, 0x08), Err(LoraError::Transport(_))));
    }

    #[test]
    fn test_reset_sends_three_reset_bytes() {
        let mut mock = MockTransport::new();
        mock.expect_write()
            .withf(|bytes| bytes == [0xC4, 0xC4, 0xC4])
            .times(1)
            .returning(|bytes| Ok(bytes.len()));
        mock.expect_read_available().never();

        let mut engine = CommandEngine::new(&mut mock, TIMEOUT);
        assert!(engine.reset().is_ok());
        assert_eq!(engine.state(), CommandState::Done);
    }

    #[test]
    fn test_persistence_opcodes() {
        assert_eq!(Persistence::Permanent.opcode(), 0xC0);
        assert_eq!(Persistence::Temporary.opcode(), 0xC2);
        assert_eq!(Persistence::default(), Persistence::Temporary);
    }

    #[test]
    fn test_module_information_accessors() {
        let info = ModuleInformation::new(vec![0x20, 0x0B, 0x16]);
        assert_eq!(info.model(), Some(0x20));
        assert_eq!(info.version(), Some(0x0B));
        assert_eq!(info.features(), Some(0x16));
        assert_eq!(ModuleInformation::new(vec![]).model(), None);
    }
}
