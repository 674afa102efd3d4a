//! # Mode Controller
//!
//! Sequences the module between its operating modes via M0/M1 and waits for
//! AUX to report idle after each switch.
//!
//! | Mode | M0 | M1 |
//! |------|----|----|
//! | Normal | 0 | 0 |
//! | Wake-on-radio (transmitter) | 1 | 0 |
//! | Power saving (WOR receiver) | 0 | 1 |
//! | Configuration (deep sleep) | 1 | 1 |

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::lines::{ControlLines, Line};
use crate::timing::{await_ready, Clock};

/// Operating mode of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Normal,
    WakeOnRadio,
    PowerSaving,
    Configuration,
}

impl OperatingMode {
    /// Levels of (M0, M1) selecting this mode
    pub fn select_lines(self) -> (bool, bool) {
        match self {
            OperatingMode::Normal => (false, false),
            OperatingMode::WakeOnRadio => (true, false),
            OperatingMode::PowerSaving => (false, true),
            OperatingMode::Configuration => (true, true),
        }
    }
}

/// Delays and bounds used while switching modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTiming {
    /// Longest wait for AUX to go high
    pub aux_timeout: Duration,
    /// AUX sampling period
    pub poll_interval: Duration,
    /// Pause after changing M0/M1 before AUX is meaningful
    pub mode_settle: Duration,
    /// Pause after AUX goes high before the module accepts bytes
    pub aux_settle: Duration,
    /// Fixed wait used in place of AUX when it is not wired
    pub unwired_aux_delay: Duration,
}

impl Default for ModeTiming {
    fn default() -> Self {
        Self {
            aux_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
            mode_settle: Duration::from_millis(40),
            aux_settle: Duration::from_millis(2),
            unwired_aux_delay: Duration::from_millis(100),
        }
    }
}

/// Owns the control lines and knows the module's current mode
pub struct ModeController<L, C> {
    lines: L,
    clock: C,
    timing: ModeTiming,
    mode: Option<OperatingMode>,
}

impl<L: ControlLines, C: Clock> ModeController<L, C> {
    pub fn new(lines: L, clock: C, timing: ModeTiming) -> Self {
        if !lines.is_wired(Line::M0) || !lines.is_wired(Line::M1) {
            warn!("M0/M1 not fully wired; mode changes rely on board strapping");
        }
        if !lines.is_wired(Line::Aux) {
            warn!(
                "AUX not wired; waiting a fixed {} ms instead of polling",
                timing.unwired_aux_delay.as_millis()
            );
        }

        Self {
            lines,
            clock,
            timing,
            mode: None,
        }
    }

    /// Last mode set, `None` before the first switch
    pub fn mode(&self) -> Option<OperatingMode> {
        self.mode
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn timing(&self) -> &ModeTiming {
        &self.timing
    }

    /// Drive M0/M1 for `mode` and wait for the module to settle
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if AUX stays low past the bound; the lines are left
    /// in the requested state
    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<()> {
        let (m0, m1) = mode.select_lines();
        self.lines.set_line(Line::M0, m0)?;
        self.lines.set_line(Line::M1, m1)?;
        self.mode = Some(mode);
        debug!("Switching to {:?} mode (M0={}, M1={})", mode, u8::from(m0), u8::from(m1));

        self.clock.sleep(self.timing.mode_settle);
        self.wait_ready()
    }

    /// Block until AUX reports idle, or the fixed delay if AUX is not wired
    pub fn wait_ready(&mut self) -> Result<()> {
        if !self.lines.is_wired(Line::Aux) {
            self.clock.sleep(self.timing.unwired_aux_delay);
            return Ok(());
        }

        let lines = &mut self.lines;
        await_ready(
            &self.clock,
            self.timing.aux_timeout,
            self.timing.poll_interval,
            "AUX",
            || lines.read_line(Line::Aux),
        )?;
        self.clock.sleep(self.timing.aux_settle);
        Ok(())
    }
}
