//! Video transports for the operator console
//!
//! | Transport | Peers | Framing | Fault handling |
//! |-----------|-------|---------|----------------|
//! | TCP | one viewer | LE length + JPEG + LE zero | any socket error -> `ReconnectRequired` |
//! | UDP | every IP that sent `connect` | BE length + JPEG + `EOF` | per-peer errors logged, never surfaced |

mod tcp_receiver;
mod tcp_server;
mod udp_receiver;
mod udp_server;
pub mod wire;

pub use tcp_receiver::{JpegStreamScanner, TcpFrameReceiver};
pub use tcp_server::TcpFrameServer;
pub use udp_receiver::{UdpFrameReceiver, UdpReceive};
pub use udp_server::{ClientSet, UdpFrameServer};

use crate::capture::Frame;
use crate::config::{StreamingConfig, TransportKind};
use crate::error::Result;
use std::time::Duration;

/// Result of sending one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The connection is gone; call `connecting()` until it returns true
    /// before sending again
    ReconnectRequired,
}

/// The streaming side of the appliance, one of the two transports
pub enum VideoTransport {
    Tcp(TcpFrameServer),
    Udp(UdpFrameServer),
}

impl VideoTransport {
    /// Bind the configured transport
    pub fn open(config: &StreamingConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Tcp => Ok(VideoTransport::Tcp(TcpFrameServer::bind(
                &config.tcp_bind,
                Duration::from_millis(config.tcp_connect_timeout_ms),
                Duration::from_millis(config.write_timeout_ms),
                config.jpeg_quality,
            )?)),
            TransportKind::Udp => Ok(VideoTransport::Udp(UdpFrameServer::bind(
                &config.udp_bind,
                config.udp_client_port,
                config.allowed_clients.clone(),
                Duration::from_millis(config.udp_connect_timeout_ms),
                config.jpeg_quality,
            )?)),
        }
    }

    /// One short, bounded wait for a peer; true once streaming can start
    pub fn connecting(&mut self) -> bool {
        match self {
            VideoTransport::Tcp(server) => server.connecting(),
            VideoTransport::Udp(server) => server.connecting(),
        }
    }

    pub fn send(&mut self, frame: &Frame) -> Result<SendOutcome> {
        match self {
            VideoTransport::Tcp(server) => server.send(frame),
            VideoTransport::Udp(server) => server.send(frame),
        }
    }

    /// Whether anyone would receive a frame sent now
    pub fn is_connected(&self) -> bool {
        match self {
            VideoTransport::Tcp(server) => server.is_connected(),
            VideoTransport::Udp(server) => server.is_connected(),
        }
    }

    /// Whether `send` can be called without waiting in `connecting()`
    /// first. UDP streams to whoever has registered, possibly nobody.
    pub fn ready(&self) -> bool {
        match self {
            VideoTransport::Tcp(server) => server.is_connected(),
            VideoTransport::Udp(_) => true,
        }
    }

    /// Pick up pending registrations without waiting (UDP only)
    pub fn poll_peers(&mut self) {
        if let VideoTransport::Udp(server) = self {
            server.accept_pending();
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            VideoTransport::Tcp(_) => TransportKind::Tcp,
            VideoTransport::Udp(_) => TransportKind::Udp,
        }
    }
}
