//! Stand-in for a serial port that could not be opened

use super::Transport;
use crate::error::Result;

/// Transport that never delivers bytes and swallows writes.
///
/// Lets the appliance run headless: the control channel reads as empty and
/// the mode controller keeps polling the switch.
#[derive(Debug, Clone)]
pub struct NullTransport {
    name: String,
}

impl NullTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transport for NullTransport {
    fn read(&mut self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        log::trace!("{}: dropping {} bytes (no port)", self.name, data.len());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_present(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.name
    }
}
