//! Redundant pair of control links

use super::{ControlLink, FramedChannel};
use crate::error::Result;

/// Two independent links polled every cycle.
///
/// The first link that yields a message wins the cycle; when both yield in
/// the same poll, link 1 is kept and link 2's message is dropped. There is
/// no voting between the links.
pub struct DualChannel {
    primary: FramedChannel,
    secondary: FramedChannel,
}

impl DualChannel {
    pub fn new(primary: FramedChannel, secondary: FramedChannel) -> Self {
        Self { primary, secondary }
    }
}

impl ControlLink for DualChannel {
    fn try_read(&mut self) -> Result<Option<String>> {
        let first = poll_link(&mut self.primary);
        let second = poll_link(&mut self.secondary);
        match (first, second) {
            (Some(message), Some(dropped)) => {
                log::debug!(
                    "both control links produced a message, keeping {} ({:?}), dropping {:?}",
                    self.primary.describe(),
                    message,
                    dropped
                );
                Ok(Some(message))
            }
            (Some(message), None) | (None, Some(message)) => Ok(Some(message)),
            (None, None) => Ok(None),
        }
    }

    /// Results go out on both links; succeeds if at least one link took it
    fn write(&mut self, payload: &str) -> Result<()> {
        let first = self.primary.write(payload);
        let second = self.secondary.write(payload);
        match (first, second) {
            (Err(e), Err(_)) => Err(e),
            (Err(e), Ok(())) => {
                log::warn!("control write on {} failed: {}", self.primary.describe(), e);
                Ok(())
            }
            (Ok(()), Err(e)) => {
                log::warn!("control write on {} failed: {}", self.secondary.describe(), e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn is_present(&self) -> bool {
        self.primary.is_present() || self.secondary.is_present()
    }

    fn describe(&self) -> String {
        format!("{}+{}", self.primary.describe(), self.secondary.describe())
    }
}

/// A read error on one link must not starve the other
fn poll_link(link: &mut FramedChannel) -> Option<String> {
    match link.try_read() {
        Ok(message) => message,
        Err(e) => {
            log::warn!("control read on {} failed: {}", link.describe(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Delimiters;
    use crate::transport::MockTransport;

    fn pair() -> (MockTransport, MockTransport, DualChannel) {
        let a = MockTransport::named("ttyS3");
        let b = MockTransport::named("ttyS4");
        let dual = DualChannel::new(
            FramedChannel::new(Box::new(a.clone()), Delimiters::default()),
            FramedChannel::new(Box::new(b.clone()), Delimiters::default()),
        );
        (a, b, dual)
    }

    #[test]
    fn test_either_link_delivers() {
        let (a, b, mut dual) = pair();
        b.inject_read(b"@2#");
        assert_eq!(dual.try_read().unwrap(), Some("2".to_string()));
        a.inject_read(b"@1#");
        assert_eq!(dual.try_read().unwrap(), Some("1".to_string()));
        assert_eq!(dual.try_read().unwrap(), None);
    }

    #[test]
    fn test_link_one_wins_same_cycle() {
        let (a, b, mut dual) = pair();
        a.inject_read(b"@1#");
        b.inject_read(b"@2#");
        assert_eq!(dual.try_read().unwrap(), Some("1".to_string()));
        assert_eq!(dual.try_read().unwrap(), None);
    }

    #[test]
    fn test_write_reaches_both_links() {
        let (a, b, mut dual) = pair();
        dual.write("C120E").unwrap();
        assert_eq!(a.get_written(), b"@C120E#");
        assert_eq!(b.get_written(), b"@C120E#");
    }

    #[test]
    fn test_write_survives_one_failed_link() {
        let (a, b, mut dual) = pair();
        a.set_fail_writes(true);
        dual.write("X").unwrap();
        assert_eq!(b.get_written(), b"@X#");

        b.set_fail_writes(true);
        assert!(dual.write("X").is_err());
    }
}
