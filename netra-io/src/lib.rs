//! NetraIO - control plane for a camera vision appliance
//!
//! A mode switch selects between two behaviors that share one camera:
//!
//! - **Streaming**: live JPEG video to an operator console over TCP (one
//!   viewer, length-prefixed) or UDP (handshake-registered peers).
//! - **Task**: single-character signals arrive over a head/tail framed
//!   serial link, a detector runs frame by frame until it produces a
//!   fixed-width record, and the record goes back over the same link.
//!
//! The capture thread keeps the newest frame in a [`capture::FrameSlot`];
//! everything else runs on the caller's thread inside
//! [`mode::ModeController`].

pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod mode;
pub mod streaming;
pub mod tasks;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
