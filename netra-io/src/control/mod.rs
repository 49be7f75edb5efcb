//! Framed serial control channel
//!
//! The robot controller sends single-character task signals and receives
//! fixed-width result records, both wrapped in head/tail delimiters. One
//! port gives a [`FramedChannel`]; two ports give a [`DualChannel`] where
//! the first link to deliver a message wins.

mod channel;
mod dual;
pub mod framing;

pub use channel::FramedChannel;
pub use dual::DualChannel;
pub use framing::{Delimiters, FrameDecoder, MAX_CONTROL_PAYLOAD, encode_frame};

use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::transport::{NullTransport, SerialTransport, Transport};

/// Non-blocking side of a control link, as used by the task dispatcher
pub trait ControlLink: Send {
    /// Next complete message payload, or `None` if nothing is ready
    fn try_read(&mut self) -> Result<Option<String>>;

    /// Send `payload` wrapped in the link's delimiters
    fn write(&mut self, payload: &str) -> Result<()>;

    /// False when running without a port
    fn is_present(&self) -> bool;

    /// Port name(s) for log lines
    fn describe(&self) -> String;
}

/// Open the configured control link(s).
///
/// Ports that fail to open are replaced by a [`NullTransport`]. When none
/// opens and `allow_absent` is false this is a startup failure.
pub fn open_control(config: &SerialConfig) -> Result<Box<dyn ControlLink>> {
    let delimiters = Delimiters::new(&config.head, &config.tail)?;
    let mut channels = Vec::with_capacity(config.ports.len());
    let mut opened = 0;

    for path in &config.ports {
        let transport: Box<dyn Transport> = match SerialTransport::open(path, config.baud_rate) {
            Ok(mut port) => {
                if let Err(e) = port.discard_input() {
                    log::warn!("Failed to clear input of {}: {}", path, e);
                }
                opened += 1;
                Box::new(port)
            }
            Err(e) => {
                log::warn!("Serial port {} unavailable: {}", path, e);
                Box::new(NullTransport::new(path.as_str()))
            }
        };
        channels.push(FramedChannel::new(transport, delimiters.clone()));
    }

    if opened == 0 && !config.allow_absent {
        return Err(Error::NoSerialPort(config.ports.join(", ")));
    }
    if opened == 0 {
        log::warn!("No serial port opened; control channel will stay silent");
    }

    let mut channels = channels.into_iter();
    match (channels.next(), channels.next()) {
        (Some(primary), Some(secondary)) => Ok(Box::new(DualChannel::new(primary, secondary))),
        (Some(single), None) => Ok(Box::new(single)),
        _ => Err(Error::Config("serial.ports is empty".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_degrades_when_allowed() {
        let config = SerialConfig {
            ports: vec!["/dev/netra-test-missing".to_string()],
            ..SerialConfig::default()
        };
        let link = open_control(&config).unwrap();
        assert!(!link.is_present());
    }

    #[test]
    fn test_missing_port_is_fatal_when_required() {
        let config = SerialConfig {
            ports: vec!["/dev/netra-test-missing".to_string()],
            allow_absent: false,
            ..SerialConfig::default()
        };
        assert!(matches!(open_control(&config), Err(Error::NoSerialPort(_))));
    }
}
