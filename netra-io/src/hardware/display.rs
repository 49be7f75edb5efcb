//! Status display implementations

use super::StatusDisplay;
use parking_lot::Mutex;
use std::sync::Arc;

/// Rows on the appliance's 128x32 OLED
pub const DISPLAY_ROWS: usize = 4;
/// Characters per row at the OLED's font size
pub const DISPLAY_COLUMNS: usize = 21;

/// Text frame buffer that writes to the log on `display()`.
///
/// Clones share the buffer, so the last shown screen can be inspected.
#[derive(Clone, Default)]
pub struct LogDisplay {
    inner: Arc<Mutex<Screen>>,
}

#[derive(Default)]
struct Screen {
    pending: Vec<String>,
    shown: Vec<String>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows as of the last `display()`
    pub fn shown(&self) -> Vec<String> {
        self.inner.lock().shown.clone()
    }
}

impl StatusDisplay for LogDisplay {
    fn clear(&mut self) {
        self.inner.lock().pending.clear();
    }

    fn text(&mut self, line: usize, text: &str) {
        if line >= DISPLAY_ROWS {
            return;
        }
        let mut screen = self.inner.lock();
        if screen.pending.len() <= line {
            screen.pending.resize(line + 1, String::new());
        }
        screen.pending[line] = text.chars().take(DISPLAY_COLUMNS).collect();
    }

    fn display(&mut self) {
        let mut screen = self.inner.lock();
        screen.shown = screen.pending.clone();
        log::debug!("display: {}", screen.shown.join(" | "));
    }
}

/// Display stand-in that discards everything
pub struct NullDisplay;

impl StatusDisplay for NullDisplay {
    fn clear(&mut self) {}
    fn text(&mut self, _line: usize, _text: &str) {}
    fn display(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_truncated_and_bounded() {
        let mut display = LogDisplay::new();
        display.text(1, "a very long line that cannot fit");
        display.text(9, "ignored");
        display.display();
        let shown = display.shown();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0], "");
        assert_eq!(shown[1].chars().count(), DISPLAY_COLUMNS);
    }

    #[test]
    fn test_nothing_shown_before_display() {
        let mut display = LogDisplay::new();
        display.text(0, "hello");
        assert!(display.shown().is_empty());
        display.display();
        display.clear();
        assert_eq!(display.shown(), vec!["hello"]);
    }
}
