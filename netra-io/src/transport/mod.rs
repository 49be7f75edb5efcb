//! Byte transports underneath the control channel
//!
//! The framed serial channel only needs to move raw bytes, so it talks to a
//! [`Transport`]: a real UART, an in-memory mock for tests, or the null
//! transport used when the port is missing.

use crate::error::Result;

mod mock;
mod null;
mod serial;

pub use mock::MockTransport;
pub use null::NullTransport;
pub use serial::SerialTransport;

/// Transport trait for the control link
pub trait Transport: Send {
    /// Read available bytes into buffer, returns number of bytes read.
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's short
    /// read timeout; callers poll again.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Whether a real device sits behind this transport
    fn is_present(&self) -> bool {
        true
    }

    /// Short name for log lines
    fn name(&self) -> &str;
}

/// Write the whole buffer, retrying partial writes
pub fn write_all(transport: &mut dyn Transport, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let n = transport.write(data)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
        }
        data = &data[n..];
    }
    transport.flush()
}
