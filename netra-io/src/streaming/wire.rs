//! Wire formats of the two video transports
//!
//! # TCP
//!
//! ```text
//! ┌──────────────────┬──────────────────┬──────────────────┐
//! │ Length (4 bytes) │ JPEG payload     │ Zero (4 bytes)   │
//! │ Little-endian    │ FF D8 ... FF D9  │ frame boundary   │
//! └──────────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! The trailing zero marks "frame complete"; it is not end-of-stream.
//!
//! # UDP
//!
//! One datagram per frame per client:
//!
//! ```text
//! ┌──────────────────┬──────────────────┬─────────┐
//! │ Length (4 bytes) │ JPEG payload     │ "EOF"   │
//! │ Big-endian       │                  │ trailer │
//! └──────────────────┴──────────────────┴─────────┘
//! ```
//!
//! Registration is a single datagram containing the literal `connect`.

/// JPEG start-of-image signature (SOI marker plus the next marker's 0xFF)
pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// UDP registration datagram
pub const UDP_HANDSHAKE: &[u8] = b"connect";
/// UDP frame trailer
pub const UDP_TRAILER: &[u8] = b"EOF";
/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_DATAGRAM: usize = 65_507;

/// Append one TCP frame (prefix, payload, zero trailer) to `buffer`
pub fn encode_tcp_frame(jpeg: &[u8], buffer: &mut Vec<u8>) {
    buffer.reserve(jpeg.len() + 8);
    buffer.extend_from_slice(&(jpeg.len() as u32).to_le_bytes());
    buffer.extend_from_slice(jpeg);
    buffer.extend_from_slice(&0u32.to_le_bytes());
}

/// Build one UDP datagram into `buffer` (cleared first, capacity reused)
pub fn encode_udp_datagram(jpeg: &[u8], buffer: &mut Vec<u8>) {
    buffer.clear();
    buffer.reserve(4 + jpeg.len() + UDP_TRAILER.len());
    buffer.extend_from_slice(&(jpeg.len() as u32).to_be_bytes());
    buffer.extend_from_slice(jpeg);
    buffer.extend_from_slice(UDP_TRAILER);
}

/// JPEG payload of a UDP datagram, or `None` if it is truncated, has a bad
/// trailer, or its length prefix disagrees with its size.
pub fn decode_udp_datagram(datagram: &[u8]) -> Option<&[u8]> {
    let overhead = 4 + UDP_TRAILER.len();
    if datagram.len() < overhead || !datagram.ends_with(UDP_TRAILER) {
        return None;
    }
    let declared = u32::from_be_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]) as usize;
    let payload = &datagram[4..datagram.len() - UDP_TRAILER.len()];
    (declared == payload.len()).then_some(payload)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_frame_layout() {
        let mut buf = Vec::new();
        encode_tcp_frame(&[0xFF, 0xD8, 0xFF, 0xD9], &mut buf);
        assert_eq!(
            buf,
            vec![4, 0, 0, 0, 0xFF, 0xD8, 0xFF, 0xD9, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_udp_datagram_layout() {
        let mut buf = Vec::new();
        encode_udp_datagram(b"abc", &mut buf);
        assert_eq!(buf, b"\x00\x00\x00\x03abcEOF");
        assert_eq!(decode_udp_datagram(&buf), Some(&b"abc"[..]));
    }

    #[test]
    fn test_udp_rejects_malformed() {
        assert_eq!(decode_udp_datagram(b"EOF"), None);
        assert_eq!(decode_udp_datagram(b"\x00\x00\x00\x03abcEOX"), None);
        assert_eq!(decode_udp_datagram(b"\x00\x00\x00\x09abcEOF"), None);
        assert_eq!(decode_udp_datagram(b"connect"), None);
    }
}
