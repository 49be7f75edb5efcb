//! Head/tail delimited ASCII framing
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────┬───────────────────────┬──────────┐
//! │ head     │ payload (ASCII)       │ tail     │
//! │ e.g. "@" │ never contains either │ e.g. "#" │
//! └──────────┴───────────────────────┴──────────┘
//! ```
//!
//! Messages are not length-counted. The decoder resynchronizes byte by
//! byte: everything before a head is discarded, and if a head shows up
//! again before the tail, the payload restarts after it.

use crate::error::{Error, Result};

/// Longest payload accepted before the decoder gives up on a message
pub const MAX_CONTROL_PAYLOAD: usize = 256;

/// Head and tail byte sequences of the control link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    head: Vec<u8>,
    tail: Vec<u8>,
}

impl Delimiters {
    pub fn new(head: &str, tail: &str) -> Result<Self> {
        if head.is_empty() || tail.is_empty() {
            return Err(Error::InvalidParameter(
                "head and tail must not be empty".to_string(),
            ));
        }
        if !head.is_ascii() || !tail.is_ascii() {
            return Err(Error::InvalidParameter(
                "head and tail must be ASCII".to_string(),
            ));
        }
        Ok(Self {
            head: head.as_bytes().to_vec(),
            tail: tail.as_bytes().to_vec(),
        })
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn tail(&self) -> &[u8] {
        &self.tail
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            head: b"@".to_vec(),
            tail: b"#".to_vec(),
        }
    }
}

/// Build `head + payload + tail`.
///
/// Fails if the payload contains either delimiter, since the peer could not
/// recover the message boundary.
pub fn encode_frame(payload: &str, delimiters: &Delimiters) -> Result<Vec<u8>> {
    let bytes = payload.as_bytes();
    if contains(bytes, &delimiters.head) || contains(bytes, &delimiters.tail) {
        return Err(Error::InvalidParameter(format!(
            "payload {:?} contains a frame delimiter",
            payload
        )));
    }
    let mut frame = Vec::with_capacity(delimiters.head.len() + bytes.len() + delimiters.tail.len());
    frame.extend_from_slice(&delimiters.head);
    frame.extend_from_slice(bytes);
    frame.extend_from_slice(&delimiters.tail);
    Ok(frame)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Discarding bytes until the head is seen
    Hunting,
    /// Accumulating payload until the tail is seen
    Collecting,
}

/// Incremental decoder; state survives between reads so a message split
/// across several polls is still delivered whole.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    delimiters: Delimiters,
    state: DecodeState,
    /// Trailing bytes seen while hunting (at most head.len())
    window: Vec<u8>,
    payload: Vec<u8>,
    discarded: u64,
}

impl FrameDecoder {
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            window: Vec::with_capacity(delimiters.head.len()),
            payload: Vec::with_capacity(64),
            delimiters,
            state: DecodeState::Hunting,
            discarded: 0,
        }
    }

    /// Feed one byte; returns a payload when this byte completed a message
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match self.state {
            DecodeState::Hunting => {
                self.window.push(byte);
                if self.window.len() > self.delimiters.head.len() {
                    self.window.remove(0);
                    self.discarded += 1;
                }
                if self.window == self.delimiters.head {
                    self.window.clear();
                    self.payload.clear();
                    self.state = DecodeState::Collecting;
                }
                None
            }
            DecodeState::Collecting => {
                self.payload.push(byte);
                if self.payload.ends_with(&self.delimiters.tail) {
                    let end = self.payload.len() - self.delimiters.tail.len();
                    let start = self.resync_offset(end);
                    let message = String::from_utf8_lossy(&self.payload[start..end]).into_owned();
                    self.payload.clear();
                    self.state = DecodeState::Hunting;
                    return Some(message);
                }
                if self.payload.len() > MAX_CONTROL_PAYLOAD + self.delimiters.tail.len() {
                    self.overflow();
                }
                None
            }
        }
    }

    /// Feed a slice; completed messages are appended to `out`
    pub fn extend(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        for &byte in bytes {
            if let Some(message) = self.push(byte) {
                out.push(message);
            }
        }
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        self.window.clear();
        self.payload.clear();
        self.state = DecodeState::Hunting;
    }

    /// Bytes thrown away while hunting for a head (diagnostics)
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Start of the real payload within `payload[..end]`: just after the
    /// last head, if a head reappeared before the tail.
    fn resync_offset(&self, end: usize) -> usize {
        match rfind(&self.payload[..end], &self.delimiters.head) {
            Some(pos) => {
                log::debug!("control frame restarted at repeated head ({} bytes dropped)", pos);
                pos + self.delimiters.head.len()
            }
            None => 0,
        }
    }

    fn overflow(&mut self) {
        log::warn!(
            "control payload exceeded {} bytes without a tail, resynchronizing",
            MAX_CONTROL_PAYLOAD
        );
        self.discarded += self.payload.len() as u64;
        match rfind(&self.payload, &self.delimiters.head) {
            Some(pos) => {
                self.payload.drain(..pos + self.delimiters.head.len());
            }
            None => self.reset(),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
