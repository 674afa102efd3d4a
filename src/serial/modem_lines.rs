//! M0/M1/AUX over a USB-UART adapter's modem-control signals
//!
//! RTS and DTR are outputs, CTS/DSR/CD/RI are inputs. Most adapters drive
//! their pins active-low, so asserting RTS pulls the pin low; `inverted`
//! compensates for that on the outputs.

use serde::Deserialize;
use tokio_serial::SerialPort;

use crate::error::{LoraError, Result};
use crate::lines::{ControlLines, Line};

/// Modem-control signal a module line is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModemSignal {
    Rts,
    Dtr,
    Cts,
    Dsr,
    Cd,
    Ri,
    None,
}

impl ModemSignal {
    fn is_output(self) -> bool {
        matches!(self, ModemSignal::Rts | ModemSignal::Dtr)
    }
}

/// Control lines routed through the serial port's handshake signals
pub struct ModemLines {
    port: Box<dyn SerialPort>,
    m0: ModemSignal,
    m1: ModemSignal,
    aux: ModemSignal,
    inverted: bool,
}

impl ModemLines {
    /// # Errors
    ///
    /// Returns `InvalidArgument` if M0/M1 are mapped to an input signal or
    /// AUX to an output signal
    pub fn new(
        port: Box<dyn SerialPort>,
        m0: ModemSignal,
        m1: ModemSignal,
        aux: ModemSignal,
        inverted: bool,
    ) -> Result<Self> {
        for (name, signal) in [("m0", m0), ("m1", m1)] {
            if signal != ModemSignal::None && !signal.is_output() {
                return Err(LoraError::InvalidArgument(format!(
                    "{} must use rts or dtr, not {:?}",
                    name, signal
                )));
            }
        }
        if aux.is_output() {
            return Err(LoraError::InvalidArgument(format!(
                "aux must use an input signal, not {:?}",
                aux
            )));
        }

        Ok(Self { port, m0, m1, aux, inverted })
    }

    fn signal(&self, line: Line) -> ModemSignal {
        match line {
            Line::M0 => self.m0,
            Line::M1 => self.m1,
            Line::Aux => self.aux,
        }
    }
}

impl ControlLines for ModemLines {
    fn set_line(&mut self, line: Line, high: bool) -> Result<()> {
        let level = high != self.inverted;
        match self.signal(line) {
            ModemSignal::Rts => self.port.write_request_to_send(level)?,
            ModemSignal::Dtr => self.port.write_data_terminal_ready(level)?,
            ModemSignal::None => {}
            other => {
                return Err(LoraError::InvalidArgument(format!(
                    "{:?} cannot be driven",
                    other
                )))
            }
        }
        Ok(())
    }

    fn read_line(&mut self, line: Line) -> Result<bool> {
        let level = match self.signal(line) {
            ModemSignal::Cts => self.port.read_clear_to_send()?,
            ModemSignal::Dsr => self.port.read_data_set_ready()?,
            ModemSignal::Cd => self.port.read_carrier_detect()?,
            ModemSignal::Ri => self.port.read_ring_indicator()?,
            ModemSignal::None => return Err(LoraError::Line(format!("{:?} is not wired", line))),
            other => {
                return Err(LoraError::InvalidArgument(format!(
                    "{:?} cannot be sampled",
                    other
                )))
            }
        };
        Ok(level)
    }

    fn is_wired(&self, line: Line) -> bool {
        self.signal(line) != ModemSignal::None
    }
}
