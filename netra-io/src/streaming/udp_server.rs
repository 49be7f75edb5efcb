//! UDP frame server with handshake registration
//!
//! # Client Registration
//!
//! ```text
//! 1. Viewer sends one datagram containing "connect"
//! 2. Server admits the sender IP into the ClientSet
//! 3. Every frame is unicast to each admitted IP at the client port
//! 4. Admitted IPs stay until the process restarts (no expiry)
//! ```
//!
//! Delivery is fire-and-forget: no acknowledgment, no loss detection. A
//! failed `send_to` for one client is logged and the others still get the
//! frame.

use super::SendOutcome;
use super::wire::{MAX_DATAGRAM, UDP_HANDSHAKE, encode_udp_datagram};
use crate::capture::Frame;
use crate::error::Result;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Peers admitted by handshake
#[derive(Debug, Clone, Default)]
pub struct ClientSet {
    clients: BTreeSet<IpAddr>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the IP was not admitted before
    pub fn admit(&mut self, ip: IpAddr) -> bool {
        self.clients.insert(ip)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.clients.contains(ip)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.clients.iter()
    }
}

/// What a `connecting()` poll received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Admitted,
    AlreadyKnown,
    Ignored,
    Nothing,
}

/// Multi-client JPEG streaming over UDP
pub struct UdpFrameServer {
    socket: UdpSocket,
    bind_address: String,
    local: SocketAddr,
    clients: ClientSet,
    allowed: Vec<IpAddr>,
    client_port: u16,
    connect_timeout: Duration,
    jpeg_quality: u8,
    /// Reused datagram buffer
    packet: Vec<u8>,
}

impl UdpFrameServer {
    /// Bind the server socket
    ///
    /// `client_port` is where frames are delivered on each admitted IP;
    /// `None` means the server's own port.
    pub fn bind(
        bind_address: &str,
        client_port: Option<u16>,
        allowed: Vec<IpAddr>,
        connect_timeout: Duration,
        jpeg_quality: u8,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_address)?;
        let local = socket.local_addr()?;
        let client_port = client_port.unwrap_or(local.port());
        log::info!(
            "UDP frame server on {} (frames to client port {}, {} allowed clients)",
            local,
            client_port,
            if allowed.is_empty() { "any".to_string() } else { allowed.len().to_string() }
        );
        Ok(Self {
            socket,
            bind_address: bind_address.to_string(),
            local,
            clients: ClientSet::new(),
            allowed,
            client_port,
            connect_timeout,
            jpeg_quality,
            packet: Vec::with_capacity(MAX_DATAGRAM),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn clients(&self) -> &ClientSet {
        &self.clients
    }

    pub fn is_connected(&self) -> bool {
        !self.clients.is_empty()
    }

    /// Wait up to the connect timeout for a handshake.
    ///
    /// Returns true for any `connect` from an admissible peer, including a
    /// viewer that restarted and registered again.
    pub fn connecting(&mut self) -> bool {
        matches!(
            self.poll_handshake(Some(self.connect_timeout)),
            Handshake::Admitted | Handshake::AlreadyKnown
        )
    }

    /// Admit every handshake already queued on the socket, without waiting
    pub fn accept_pending(&mut self) -> usize {
        let mut admitted = 0;
        loop {
            match self.poll_handshake(None) {
                Handshake::Admitted => admitted += 1,
                Handshake::AlreadyKnown | Handshake::Ignored => {}
                Handshake::Nothing => return admitted,
            }
        }
    }

    fn poll_handshake(&mut self, timeout: Option<Duration>) -> Handshake {
        let mode = match timeout {
            Some(t) => self
                .socket
                .set_nonblocking(false)
                .and_then(|()| self.socket.set_read_timeout(Some(t.max(Duration::from_millis(1))))),
            None => self.socket.set_nonblocking(true),
        };
        if let Err(e) = mode {
            log::warn!("Failed to configure UDP socket: {}", e);
            return Handshake::Nothing;
        }

        let mut buf = [0u8; 64];
        match self.socket.recv_from(&mut buf) {
            Ok((n, src)) => self.handle_datagram(&buf[..n], src),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Handshake::Nothing
            }
            Err(e) => {
                log::warn!("UDP receive error: {}", e);
                self.rebind();
                Handshake::Nothing
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], src: SocketAddr) -> Handshake {
        if data != UDP_HANDSHAKE {
            log::debug!("Ignoring {}-byte datagram from {}", data.len(), src);
            return Handshake::Ignored;
        }
        if self.is_self(src) {
            log::debug!("Ignoring handshake from own socket {}", src);
            return Handshake::Ignored;
        }
        let ip = src.ip();
        if !self.allowed.is_empty() && !self.allowed.contains(&ip) {
            log::warn!("Rejected handshake from {} (not in allowed_clients)", src);
            return Handshake::Ignored;
        }
        if self.clients.admit(ip) {
            log::info!(
                "UDP client registered: {} ({} total)",
                ip,
                self.clients.len()
            );
            Handshake::Admitted
        } else {
            log::debug!("UDP client {} re-sent handshake", ip);
            Handshake::AlreadyKnown
        }
    }

    fn is_self(&self, src: SocketAddr) -> bool {
        src == self.local
            || (self.local.ip().is_unspecified()
                && src.ip().is_loopback()
                && src.port() == self.local.port())
    }

    /// Reopen the socket after a hard receive error; admitted clients stay
    fn rebind(&mut self) {
        // The old socket has to be closed before its port can be bound again
        match UdpSocket::bind(SocketAddr::new(self.local.ip(), 0)) {
            Ok(placeholder) => drop(std::mem::replace(&mut self.socket, placeholder)),
            Err(e) => {
                log::warn!("Failed to rebind UDP socket {}: {}", self.bind_address, e);
                return;
            }
        }
        match UdpSocket::bind(&self.bind_address) {
            Ok(socket) => {
                if let Ok(local) = socket.local_addr() {
                    self.local = local;
                }
                self.socket = socket;
                log::info!("UDP socket rebound on {}", self.local);
            }
            Err(e) => log::warn!("Failed to rebind UDP socket {}: {}", self.bind_address, e),
        }
    }

    /// Encode and unicast one frame to every admitted client
    pub fn send(&mut self, frame: &Frame) -> Result<SendOutcome> {
        self.accept_pending();
        if self.clients.is_empty() {
            return Ok(SendOutcome::Sent);
        }
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        self.send_jpeg(&jpeg);
        Ok(SendOutcome::Sent)
    }

    /// Unicast an already encoded JPEG; returns how many clients it went to
    pub fn send_jpeg(&mut self, jpeg: &[u8]) -> usize {
        encode_udp_datagram(jpeg, &mut self.packet);
        if self.packet.len() > MAX_DATAGRAM {
            log::warn!(
                "Frame of {} bytes does not fit one datagram, skipped (lower jpeg_quality or resolution)",
                jpeg.len()
            );
            return 0;
        }
        let mut delivered = 0;
        for ip in self.clients.iter() {
            let target = SocketAddr::new(*ip, self.client_port);
            match self.socket.send_to(&self.packet, target) {
                Ok(_) => delivered += 1,
                Err(e) => log::warn!("UDP send to {} failed: {}", target, e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(allowed: Vec<IpAddr>) -> UdpFrameServer {
        UdpFrameServer::bind("127.0.0.1:0", None, allowed, Duration::from_millis(200), 70).unwrap()
    }

    #[test]
    fn test_client_set_admits_once() {
        let mut set = ClientSet::new();
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(set.admit(ip));
        assert!(!set.admit(ip));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&ip));
    }

    #[test]
    fn test_handshake_admits_sender() {
        let mut server = server(Vec::new());
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"connect", server.local_addr()).unwrap();
        assert!(server.connecting());
        assert!(server.clients().contains(&"127.0.0.1".parse().unwrap()));

        // A repeated handshake is still a handshake, but not a new client
        peer.send_to(b"connect", server.local_addr()).unwrap();
        assert!(server.connecting());
        assert_eq!(server.clients().len(), 1);
    }

    #[test]
    fn test_accept_pending_counts_only_new_clients() {
        let mut server = server(Vec::new());
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"connect", server.local_addr()).unwrap();
        peer.send_to(b"connect", server.local_addr()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(server.accept_pending(), 1);
        assert_eq!(server.clients().len(), 1);
    }

    #[test]
    fn test_other_payloads_are_not_handshakes() {
        let mut server = server(Vec::new());
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"connect!", server.local_addr()).unwrap();
        assert!(!server.connecting());
        assert!(server.clients().is_empty());
    }

    #[test]
    fn test_allow_list_rejects_unknown_ip() {
        let mut server = server(vec!["192.168.50.7".parse().unwrap()]);
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"connect", server.local_addr()).unwrap();
        assert!(!server.connecting());
        assert!(server.clients().is_empty());
    }

    #[test]
    fn test_connecting_times_out_quietly() {
        let mut server = server(Vec::new());
        assert!(!server.connecting());
        assert_eq!(server.accept_pending(), 0);
    }
}
