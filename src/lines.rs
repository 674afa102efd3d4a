//! # Control Lines
//!
//! The three digital lines of an E220 module:
//!
//! | Line | Direction | Meaning |
//! |------|-----------|---------|
//! | M0   | output    | mode select, low bit |
//! | M1   | output    | mode select, high bit |
//! | AUX  | input     | high = idle, low = busy |
//!
//! Any line may be left unconnected. Unwired select lines are assumed to be
//! strapped on the board; an unwired AUX line is replaced by a fixed delay.

use embedded_hal::digital::{Error as _, InputPin, OutputPin};

use crate::error::{LoraError, Result};

/// Identifies one of the module's control lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    M0,
    M1,
    Aux,
}

/// Settable/readable digital lines connected to the module
pub trait ControlLines {
    /// Drive an output line high (`true`) or low (`false`)
    fn set_line(&mut self, line: Line, high: bool) -> Result<()>;

    /// Sample a line; `true` means high
    fn read_line(&mut self, line: Line) -> Result<bool>;

    /// Whether the line is physically connected
    fn is_wired(&self, line: Line) -> bool;
}

/// No lines connected at all
#[derive(Debug, Default, Clone, Copy)]
pub struct Unwired;

impl ControlLines for Unwired {
    fn set_line(&mut self, _line: Line, _high: bool) -> Result<()> {
        Ok(())
    }

    fn read_line(&mut self, line: Line) -> Result<bool> {
        Err(LoraError::Line(format!("{:?} is not wired", line)))
    }

    fn is_wired(&self, _line: Line) -> bool {
        false
    }
}

/// Control lines backed by `embedded-hal` GPIO pins
pub struct PinLines<M0, M1, A> {
    m0: Option<M0>,
    m1: Option<M1>,
    aux: Option<A>,
}

impl<M0, M1, A> PinLines<M0, M1, A>
where
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
{
    pub fn new(m0: Option<M0>, m1: Option<M1>, aux: Option<A>) -> Self {
        Self { m0, m1, aux }
    }

    /// Give the pins back
    pub fn release(self) -> (Option<M0>, Option<M1>, Option<A>) {
        (self.m0, self.m1, self.aux)
    }
}

fn drive<P: OutputPin>(pin: &mut P, line: Line, high: bool) -> Result<()> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|e| LoraError::Line(format!("failed to drive {:?}: {:?}", line, e.kind())))
}

impl<M0, M1, A> ControlLines for PinLines<M0, M1, A>
where
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
{
    fn set_line(&mut self, line: Line, high: bool) -> Result<()> {
        match line {
            Line::M0 => self.m0.as_mut().map_or(Ok(()), |pin| drive(pin, line, high)),
            Line::M1 => self.m1.as_mut().map_or(Ok(()), |pin| drive(pin, line, high)),
            Line::Aux => Err(LoraError::InvalidArgument("AUX is an input line".to_string())),
        }
    }

    fn read_line(&mut self, line: Line) -> Result<bool> {
        match (line, self.aux.as_mut()) {
            (Line::Aux, Some(pin)) => pin
                .is_high()
                .map_err(|e| LoraError::Line(format!("failed to read AUX: {:?}", e.kind()))),
            (Line::Aux, None) => Err(LoraError::Line("AUX is not wired".to_string())),
            _ => Err(LoraError::InvalidArgument(format!("{:?} is an output line", line))),
        }
    }

    fn is_wired(&self, line: Line) -> bool {
        match line {
            Line::M0 => self.m0.is_some(),
            Line::M1 => self.m1.is_some(),
            Line::Aux => self.aux.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
    use embedded_hal_mock::eh1::MockError;
    use std::io::ErrorKind;

    #[test]
    fn test_pin_lines_drive_and_sample() {
        let m0 = PinMock::new(&[PinTransaction::set(PinState::High)]);
        let m1 = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let aux = PinMock::new(&[PinTransaction::get(PinState::High), PinTransaction::get(PinState::Low)]);
        let mut lines = PinLines::new(Some(m0), Some(m1), Some(aux));

        lines.set_line(Line::M0, true).unwrap();
        lines.set_line(Line::M1, false).unwrap();
        assert!(lines.read_line(Line::Aux).unwrap());
        assert!(!lines.read_line(Line::Aux).unwrap());

        let (m0, m1, aux) = lines.release();
        for mut pin in [m0, m1, aux].into_iter().flatten() {
            pin.done();
        }
    }

    #[test]
    fn test_pin_lines_missing_pins() {
        let mut lines: PinLines<PinMock, PinMock, PinMock> = PinLines::new(None, None, None);
        assert!(!lines.is_wired(Line::M0));
        assert!(!lines.is_wired(Line::Aux));
        // Strapped select lines: driving them is a no-op
        assert!(lines.set_line(Line::M0, true).is_ok());
        assert!(matches!(lines.read_line(Line::Aux), Err(LoraError::Line(_))));
    }

    #[test]
    fn test_pin_lines_reject_wrong_direction() {
        let mut lines = PinLines::new(Some(PinMock::new(&[])), Some(PinMock::new(&[])), Some(PinMock::new(&[])));
        assert!(matches!(lines.set_line(Line::Aux, true), Err(LoraError::InvalidArgument(_))));
        assert!(matches!(lines.read_line(Line::M1), Err(LoraError::InvalidArgument(_))));

        let (m0, m1, aux) = lines.release();
        for mut pin in [m0, m1, aux].into_iter().flatten() {
            pin.done();
        }
    }

    #[test]
    fn test_pin_error_becomes_line_error() {
        let m0 = PinMock::new(&[
            PinTransaction::set(PinState::High).with_error(MockError::Io(ErrorKind::NotConnected))
        ]);
        let aux = PinMock::new(&[
            PinTransaction::get(PinState::High).with_error(MockError::Io(ErrorKind::NotConnected))
        ]);
        let mut lines: PinLines<PinMock, PinMock, PinMock> = PinLines::new(Some(m0), None, Some(aux));

        match lines.set_line(Line::M0, true) {
            Err(LoraError::Line(msg)) => assert!(msg.contains("M0")),
            other => panic!("Expected Line error, got: {:?}", other),
        }
        assert!(matches!(lines.read_line(Line::Aux), Err(LoraError::Line(_))));

        let (m0, _, aux) = lines.release();
        for mut pin in [m0, aux].into_iter().flatten() {
            pin.done();
        }
    }

    #[test]
    fn test_unwired() {
        let mut lines = Unwired;
        assert!(lines.set_line(Line::M1, true).is_ok());
        assert!(!lines.is_wired(Line::Aux));
        assert!(lines.read_line(Line::Aux).is_err());
    }
}
