//! TCP frame receiver for viewers
//!
//! Reads are opportunistic: a frame may span several reads and one read may
//! carry several frames. The receiver accumulates raw bytes and cuts frames
//! out by their JPEG markers, so it recovers even if it starts mid-stream.
//!
//! # Resynchronization
//!
//! - Bytes before the first SOI (`FF D8 FF`) are discarded. The 4-byte
//!   length prefix and the zero trailer never contain that signature, so a
//!   zero trailer is never taken for the start of a frame.
//! - If the 4 bytes in front of the SOI read as a little-endian length whose
//!   last two payload bytes are EOI, exactly that many bytes are taken.
//! - Otherwise the frame ends at the first EOI (`FF D9`) after the SOI.

use super::wire::{JPEG_EOI, JPEG_SOI, find};
use crate::capture::{Camera, Frame};
use crate::error::{Error, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Largest frame accepted from the length prefix
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Accumulated bytes are dropped past this size
const MAX_BUFFER_BYTES: usize = 16 * 1024 * 1024;

/// Read size per socket read
const READ_CHUNK: usize = 4096;

enum PrefixCheck {
    Complete(usize),
    NeedMore,
    Absent,
}

/// Cuts JPEG images out of an arbitrary byte stream
#[derive(Debug, Default)]
pub struct JpegStreamScanner {
    buffer: Vec<u8>,
    discarded: u64,
}

impl JpegStreamScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.buffer.len() + bytes.len() > MAX_BUFFER_BYTES {
            log::warn!(
                "Stream buffer exceeded {} bytes without a complete frame, dropping",
                MAX_BUFFER_BYTES
            );
            self.discarded += self.buffer.len() as u64;
            self.buffer.clear();
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes thrown away while resynchronizing
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Next complete JPEG, if the buffer holds one
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find(&self.buffer, &JPEG_SOI) else {
            // Keep a possible prefix plus a partial SOI for the next read
            self.drop_front(self.buffer.len().saturating_sub(JPEG_SOI.len() + 3));
            return None;
        };

        let end = match self.prefixed_end(start) {
            PrefixCheck::Complete(end) => end,
            PrefixCheck::NeedMore => {
                self.drop_front(start - 4);
                return None;
            }
            PrefixCheck::Absent => {
                let body = start + JPEG_SOI.len();
                match find(&self.buffer[body..], &JPEG_EOI) {
                    Some(pos) => body + pos + JPEG_EOI.len(),
                    None => {
                        self.drop_front(start.saturating_sub(4));
                        return None;
                    }
                }
            }
        };

        let frame = self.buffer[start..end].to_vec();
        self.discarded += start as u64;
        self.buffer.drain(..end);
        Some(frame)
    }

    fn prefixed_end(&self, start: usize) -> PrefixCheck {
        if start < 4 {
            return PrefixCheck::Absent;
        }
        let prefix = &self.buffer[start - 4..start];
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if !(JPEG_SOI.len() + JPEG_EOI.len()..=MAX_FRAME_BYTES).contains(&len) {
            return PrefixCheck::Absent;
        }
        let end = start + len;
        if self.buffer.len() < end {
            return PrefixCheck::NeedMore;
        }
        if self.buffer[end - JPEG_EOI.len()..end] == JPEG_EOI {
            PrefixCheck::Complete(end)
        } else {
            PrefixCheck::Absent
        }
    }

    fn drop_front(&mut self, n: usize) {
        if n > 0 {
            self.discarded += n as u64;
            self.buffer.drain(..n);
        }
    }
}

/// Viewer side of the TCP video transport
pub struct TcpFrameReceiver {
    stream: TcpStream,
    peer: SocketAddr,
    scanner: JpegStreamScanner,
    read_buffer: Vec<u8>,
}

impl TcpFrameReceiver {
    /// Connect to an appliance's frame server
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(Duration::from_millis(100)))?;
        log::info!("Connected to frame server {}", addr);
        Ok(Self {
            stream,
            peer: addr,
            scanner: JpegStreamScanner::new(),
            read_buffer: vec![0u8; READ_CHUNK],
        })
    }

    /// Next decoded frame.
    ///
    /// `Ok(None)` when no complete frame arrived within the read timeout or
    /// the bytes between markers did not decode. Server disconnect is an
    /// error.
    pub fn receive(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(jpeg) = self.scanner.next_frame() {
                return match Frame::decode_jpeg(&jpeg) {
                    Ok(frame) => Ok(Some(frame)),
                    Err(e) => {
                        log::warn!("Dropping undecodable frame ({} bytes): {}", jpeg.len(), e);
                        Ok(None)
                    }
                };
            }
            match self.stream.read(&mut self.read_buffer) {
                Ok(0) => {
                    return Err(Error::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("frame server {} closed the connection", self.peer),
                    )));
                }
                Ok(n) => self.scanner.push(&self.read_buffer[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Camera for TcpFrameReceiver {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.receive()?.map(|frame| frame.image))
    }

    fn name(&self) -> &str {
        "tcp-receiver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::wire::encode_tcp_frame;
    use proptest::prelude::*;

    fn fake_jpeg(body: &[u8]) -> Vec<u8> {
        let mut jpeg = JPEG_SOI.to_vec();
        jpeg.extend_from_slice(body);
        jpeg.extend_from_slice(&JPEG_EOI);
        jpeg
    }

    fn wire(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for f in frames {
            encode_tcp_frame(f, &mut out);
        }
        out
    }

    fn drain(scanner: &mut JpegStreamScanner) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| scanner.next_frame()).collect()
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let frames = vec![fake_jpeg(b"\x01\x02"), fake_jpeg(b"\x03")];
        let mut scanner = JpegStreamScanner::new();
        scanner.push(&wire(&frames));
        assert_eq!(drain(&mut scanner), frames);
    }

    #[test]
    fn test_garbage_before_first_soi_is_discarded() {
        let frame = fake_jpeg(b"abc");
        let mut bytes = b"noise\x00\x00".to_vec();
        bytes.extend(wire(std::slice::from_ref(&frame)));
        let mut scanner = JpegStreamScanner::new();
        scanner.push(&bytes);
        assert_eq!(scanner.next_frame(), Some(frame));
        assert!(scanner.discarded() >= 7);
    }

    #[test]
    fn test_prefix_covers_embedded_eoi() {
        // Thumbnail-style payload: an EOI inside the image before the real end
        let mut body = vec![0x10, 0xFF, 0xD9, 0x20];
        body.extend_from_slice(&[0x30; 8]);
        let frame = fake_jpeg(&body);
        let mut scanner = JpegStreamScanner::new();
        scanner.push(&wire(std::slice::from_ref(&frame)));
        assert_eq!(scanner.next_frame(), Some(frame));
    }

    #[test]
    fn test_zero_trailer_alone_is_not_a_frame() {
        let mut scanner = JpegStreamScanner::new();
        scanner.push(&[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(scanner.next_frame(), None);
    }

    #[test]
    fn test_real_jpeg_survives_split_reads() {
        let jpeg = Frame::placeholder(40, 30).encode_jpeg(70).unwrap();
        let bytes = wire(std::slice::from_ref(&jpeg));
        let mut scanner = JpegStreamScanner::new();
        let mut got = Vec::new();
        for chunk in bytes.chunks(7) {
            scanner.push(chunk);
            got.extend(drain(&mut scanner));
        }
        assert_eq!(got, vec![jpeg]);
    }

    proptest! {
        #[test]
        fn prop_frames_are_byte_identical(
            bodies in proptest::collection::vec(
                proptest::collection::vec(0u8..0xFF, 0..200), 1..5),
            chunk in 1usize..64,
        ) {
            let frames: Vec<Vec<u8>> = bodies.iter().map(|b| fake_jpeg(b)).collect();
            let bytes = wire(&frames);
            let mut scanner = JpegStreamScanner::new();
            let mut got = Vec::new();
            for piece in bytes.chunks(chunk) {
                scanner.push(piece);
                got.extend(drain(&mut scanner));
            }
            prop_assert_eq!(got, frames);
        }
    }
}
