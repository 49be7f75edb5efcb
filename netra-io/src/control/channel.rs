//! Framed control channel over a byte transport

use super::framing::{Delimiters, FrameDecoder, encode_frame};
use super::ControlLink;
use crate::error::Result;
use crate::transport::{Transport, write_all};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sleep between polls of the blocking read
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Read buffer size (control messages are a few bytes)
const READ_CHUNK: usize = 64;

/// One serial link speaking head/tail framed ASCII
pub struct FramedChannel {
    transport: Box<dyn Transport>,
    delimiters: Delimiters,
    decoder: FrameDecoder,
    /// Messages decoded from a read but not handed out yet
    pending: VecDeque<String>,
    read_buffer: [u8; READ_CHUNK],
}

impl FramedChannel {
    pub fn new(transport: Box<dyn Transport>, delimiters: Delimiters) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(delimiters.clone()),
            delimiters,
            pending: VecDeque::new(),
            read_buffer: [0u8; READ_CHUNK],
        }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Block until a full message arrives and return its payload.
    ///
    /// Returns an empty payload straight away when the port is absent.
    pub fn read(&mut self) -> Result<String> {
        if !self.transport.is_present() {
            return Ok(String::new());
        }
        loop {
            if let Some(message) = self.try_read()? {
                return Ok(message);
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }

    /// Like [`read`](Self::read) but gives up after `timeout`
    pub fn read_timeout(&mut self, timeout: Duration) -> Result<Option<String>> {
        if !self.transport.is_present() {
            return Ok(Some(String::new()));
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_read()? {
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }

    /// Drop buffered input and any partial message
    pub fn discard_pending(&mut self) -> Result<()> {
        self.pending.clear();
        self.decoder.reset();
        while self.transport.available()? > 0 {
            if self.transport.read(&mut self.read_buffer)? == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl ControlLink for FramedChannel {
    fn try_read(&mut self) -> Result<Option<String>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        let n = self.transport.read(&mut self.read_buffer)?;
        if n == 0 {
            return Ok(None);
        }
        let mut decoded = Vec::new();
        self.decoder.extend(&self.read_buffer[..n], &mut decoded);
        self.pending.extend(decoded);
        Ok(self.pending.pop_front())
    }

    fn write(&mut self, payload: &str) -> Result<()> {
        let frame = encode_frame(payload, &self.delimiters)?;
        write_all(self.transport.as_mut(), &frame)?;
        log::debug!("{} <- {:?}", self.transport.name(), String::from_utf8_lossy(&frame));
        Ok(())
    }

    fn is_present(&self) -> bool {
        self.transport.is_present()
    }

    fn describe(&self) -> String {
        self.transport.name().to_string()
    }
}
