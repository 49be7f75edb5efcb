//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory transport; clones share the same buffers so a test can keep a
/// handle while the channel owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    name: String,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// Max bytes handed out per read (0 = unlimited)
    read_chunk: usize,
    fail_writes: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: &str) -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                read_chunk: 0,
                fail_writes: false,
            })),
            name: name.to_string(),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Written data as text
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().write_buffer).into_owned()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Deliver at most `n` bytes per read, to exercise split messages
    pub fn set_read_chunk(&self, n: usize) {
        self.inner.lock().read_chunk = n;
    }

    /// Make every write fail with a broken-pipe error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Bytes injected but not read yet
    pub fn pending_read(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut available = inner.read_buffer.len().min(buffer.len());
        if inner.read_chunk > 0 {
            available = available.min(inner.read_chunk);
        }

        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
