//! TCP frame server (one viewer at a time)
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Listener bound at startup (non-blocking)
//! 2. connecting() polls accept() for a short window, returns true once a
//!    viewer is attached
//! 3. send() streams frames until any socket error
//! 4. On error every handle is closed and ReconnectRequired is returned;
//!    the caller goes back to step 2 (listener is reopened there)
//! ```
//!
//! The server never reconnects on its own; the mode controller owns that
//! loop so it can keep watching the mode switch.

use super::SendOutcome;
use super::wire::encode_tcp_frame;
use crate::capture::Frame;
use crate::error::Result;
use std::io::{BufWriter, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Sleep between accept polls
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Socket send buffer for one client
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

struct Viewer {
    writer: BufWriter<TcpStream>,
    addr: SocketAddr,
}

/// Length-prefixed JPEG stream to a single TCP viewer
pub struct TcpFrameServer {
    bind_address: String,
    listener: Option<TcpListener>,
    viewer: Option<Viewer>,
    connect_timeout: Duration,
    write_timeout: Duration,
    jpeg_quality: u8,
    frames_sent: u64,
}

impl TcpFrameServer {
    /// Bind the listener
    ///
    /// # Arguments
    /// - `bind_address`: e.g. "0.0.0.0:8000"
    /// - `connect_timeout`: how long one `connecting()` call waits
    /// - `write_timeout`: a stalled viewer is dropped after this long
    pub fn bind(
        bind_address: &str,
        connect_timeout: Duration,
        write_timeout: Duration,
        jpeg_quality: u8,
    ) -> Result<Self> {
        let listener = open_listener(bind_address)?;
        let local = listener.local_addr()?;
        log::info!("TCP frame server listening on {}", local);
        Ok(Self {
            // Resolved address, so a reopened listener keeps an ephemeral port
            bind_address: local.to_string(),
            listener: Some(listener),
            viewer: None,
            connect_timeout,
            write_timeout,
            jpeg_quality,
            frames_sent: 0,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn is_connected(&self) -> bool {
        self.viewer.is_some()
    }

    /// Wait up to the connect timeout for a viewer.
    ///
    /// Returns true once a viewer is attached (immediately if one already
    /// is). Reopens the listener if a previous fault closed it.
    pub fn connecting(&mut self) -> bool {
        if self.viewer.is_some() {
            return true;
        }
        if self.listener.is_none() {
            match open_listener(&self.bind_address) {
                Ok(listener) => {
                    log::info!("TCP listener reopened on {}", self.bind_address);
                    self.listener = Some(listener);
                }
                Err(e) => {
                    log::warn!("Failed to reopen TCP listener on {}: {}", self.bind_address, e);
                    std::thread::sleep(self.connect_timeout);
                    return false;
                }
            }
        }
        let deadline = Instant::now() + self.connect_timeout;
        let accepted = loop {
            let Some(listener) = self.listener.as_ref() else {
                return false;
            };
            match listener.accept() {
                Ok(pair) => break Ok(pair),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => break Err(e),
            }
        };

        match accepted {
            Ok((stream, addr)) => match self.attach(stream, addr) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to set up viewer {}: {}", addr, e);
                    false
                }
            },
            Err(e) => {
                log::warn!("Accept error: {}", e);
                self.close_all();
                false
            }
        }
    }

    fn attach(&mut self, stream: TcpStream, addr: SocketAddr) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        log::info!("Viewer connected: {}", addr);
        self.viewer = Some(Viewer {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, stream),
            addr,
        });
        Ok(())
    }

    /// Encode and send one frame
    pub fn send(&mut self, frame: &Frame) -> Result<SendOutcome> {
        if self.viewer.is_none() {
            return Ok(SendOutcome::ReconnectRequired);
        }
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        Ok(self.send_jpeg(&jpeg))
    }

    /// Send an already encoded JPEG
    pub fn send_jpeg(&mut self, jpeg: &[u8]) -> SendOutcome {
        let Some(viewer) = self.viewer.as_mut() else {
            return SendOutcome::ReconnectRequired;
        };
        match write_frame(&mut viewer.writer, jpeg) {
            Ok(()) => {
                self.frames_sent += 1;
                log::trace!("Sent frame {} ({} bytes) to {}", self.frames_sent, jpeg.len(), viewer.addr);
                SendOutcome::Sent
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe => {
                        log::info!("Viewer {} disconnected: {}", viewer.addr, e)
                    }
                    _ => log::warn!("Send to viewer {} failed: {}", viewer.addr, e),
                }
                self.close_all();
                SendOutcome::ReconnectRequired
            }
        }
    }

    /// Drop the viewer and the listener; `connecting()` reopens them
    pub fn close_all(&mut self) {
        if let Some(viewer) = self.viewer.take() {
            // BufWriter flushes on drop; avoid blocking on a dead peer
            let (stream, _) = viewer.writer.into_parts();
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.listener = None;
    }
}

fn open_listener(bind_address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(bind_address)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Prefix, flush, payload, zero trailer
fn write_frame(writer: &mut BufWriter<TcpStream>, jpeg: &[u8]) -> std::io::Result<()> {
    let mut framed = Vec::with_capacity(jpeg.len() + 8);
    encode_tcp_frame(jpeg, &mut framed);
    let (prefix, rest) = framed.split_at(4);
    writer.write_all(prefix)?;
    writer.flush()?;
    writer.write_all(rest)?;
    writer.flush()
}
