//! UDP frame receiver for viewers
//!
//! Registers with one `connect` datagram, then treats every datagram from
//! the server as one candidate frame. Datagrams from other senders, bad
//! trailers and undecodable payloads all count as "no frame this cycle".

use super::wire::{MAX_DATAGRAM, UDP_HANDSHAKE, decode_udp_datagram};
use crate::capture::{Camera, Frame};
use crate::error::Result;
use image::RgbImage;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Size of the placeholder returned on timeout
const PLACEHOLDER_SIZE: (u32, u32) = (320, 240);

/// Outcome of one receive
#[derive(Debug)]
pub enum UdpReceive {
    Frame(Frame),
    /// Something arrived but it was not a usable frame
    NoFrame,
    /// Nothing arrived in time; carries a placeholder to display
    Timeout(Frame),
}

/// Viewer side of the UDP video transport
pub struct UdpFrameReceiver {
    socket: UdpSocket,
    server: SocketAddr,
    buffer: Vec<u8>,
    rejected: u64,
}

impl UdpFrameReceiver {
    /// Bind locally and register with the server
    ///
    /// # Arguments
    /// - `bind_address`: local address; its port must be the server's
    ///   configured client port (e.g. "0.0.0.0:8000")
    /// - `server`: the appliance's UDP frame server
    /// - `timeout`: how long one `receive()` waits
    pub fn connect(bind_address: &str, server: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(bind_address)?;
        socket.set_read_timeout(Some(timeout))?;
        let receiver = Self {
            socket,
            server,
            buffer: vec![0u8; MAX_DATAGRAM + 1],
            rejected: 0,
        };
        receiver.register()?;
        Ok(receiver)
    }

    /// (Re-)send the handshake datagram
    pub fn register(&self) -> Result<()> {
        self.socket.send_to(UDP_HANDSHAKE, self.server)?;
        log::info!(
            "Sent handshake to {} from {}",
            self.server,
            self.socket.local_addr()?
        );
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Datagrams dropped as malformed or foreign
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn receive(&mut self) -> Result<UdpReceive> {
        let (n, src) = match self.socket.recv_from(&mut self.buffer) {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                log::debug!("read img timeout");
                return Ok(UdpReceive::Timeout(Frame::placeholder(
                    PLACEHOLDER_SIZE.0,
                    PLACEHOLDER_SIZE.1,
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if src.ip() != self.server.ip() {
            self.rejected += 1;
            log::warn!("Ignoring datagram from unknown sender {}", src);
            return Ok(UdpReceive::NoFrame);
        }
        let Some(jpeg) = decode_udp_datagram(&self.buffer[..n]) else {
            self.rejected += 1;
            log::debug!("Malformed {}-byte datagram from {}", n, src);
            return Ok(UdpReceive::NoFrame);
        };
        match Frame::decode_jpeg(jpeg) {
            Ok(frame) => Ok(UdpReceive::Frame(frame)),
            Err(e) => {
                self.rejected += 1;
                log::debug!("Undecodable frame from {}: {}", src, e);
                Ok(UdpReceive::NoFrame)
            }
        }
    }
}

impl Camera for UdpFrameReceiver {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        match self.receive()? {
            UdpReceive::Frame(frame) | UdpReceive::Timeout(frame) => Ok(Some(frame.image)),
            UdpReceive::NoFrame => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "udp-receiver"
    }
}
