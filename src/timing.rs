//! # Timing
//!
//! Clock abstraction and the bounded "await readiness" primitive used for the
//! AUX line and any other condition the driver has to poll for.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{LoraError, Result};

/// Source of time and delays for the driver
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `std`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Poll `ready` until it returns `true` or `timeout` elapses
///
/// The predicate is checked once before the first sleep, so an already-ready
/// condition never waits.
///
/// # Errors
///
/// Returns `LoraError::Timeout` naming `what` if the deadline passes, or the
/// first error `ready` returns.
pub fn await_ready<C, F>(
    clock: &C,
    timeout: Duration,
    poll_interval: Duration,
    what: &str,
    mut ready: F,
) -> Result<()>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool>,
{
    let deadline = clock.now() + timeout;

    loop {
        if ready()? {
            return Ok(());
        }
        if clock.now() >= deadline {
            return Err(LoraError::Timeout(format!(
                "{} not ready after {} ms",
                what,
                timeout.as_millis()
            )));
        }
        clock.sleep(poll_interval);
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Clock whose time only moves when something sleeps on it
    #[derive(Clone)]
    pub struct FakeClock {
        start: Instant,
        elapsed: Rc<Cell<Duration>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        pub fn elapsed(&self) -> Duration {
            self.elapsed.get()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + self.elapsed.get()
        }

        fn sleep(&self, duration: Duration) {
            self.elapsed.set(self.elapsed.get() + duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::FakeClock;
    use super::*;

    #[test]
    fn test_ready_immediately_does_not_sleep() {
        let clock = FakeClock::new();
        let result = await_ready(&clock, Duration::from_millis(100), Duration::from_millis(1), "aux", || Ok(true));
        assert!(result.is_ok());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_becomes_ready_after_polls() {
        let clock = FakeClock::new();
        let mut polls = 0;
        let result = await_ready(&clock, Duration::from_millis(100), Duration::from_millis(5), "aux", || {
            polls += 1;
            Ok(polls == 4)
        });
        assert!(result.is_ok());
        assert_eq!(clock.elapsed(), Duration::from_millis(15));
    }

    #[test]
    fn test_never_ready_times_out_within_bound() {
        let clock = FakeClock::new();
        let result = await_ready(&clock, Duration::from_millis(50), Duration::from_millis(5), "aux", || Ok(false));

        match result {
            Err(LoraError::Timeout(msg)) => assert!(msg.contains("aux")),
            other => panic!("Expected Timeout, got: {:?}", other),
        }
        assert!(clock.elapsed() >= Duration::from_millis(50));
        assert!(clock.elapsed() <= Duration::from_millis(55));
    }

    #[test]
    fn test_predicate_error_is_propagated() {
        let clock = FakeClock::new();
        let result = await_ready(&clock, Duration::from_millis(50), Duration::from_millis(5), "aux", || {
            Err(LoraError::Line("aux read failed".into()))
        });
        assert!(matches!(result, Err(LoraError::Line(_))));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.now() > before);
    }
}
