//! Trait abstraction for the UART link to enable testing

use std::time::Duration;

use crate::error::Result;

/// Byte-level link to the module
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Write `bytes`, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read up to `max_bytes`, waiting at most `timeout` for the first byte
    ///
    /// An empty vector means nothing arrived within the timeout.
    fn read_available(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Number of bytes buffered and ready to read, without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Discard anything buffered on the receive side
    fn clear_input(&mut self) -> Result<()>;
}
