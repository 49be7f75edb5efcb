//! Task signals received from the robot controller

use std::fmt;

/// One control message interpreted against the task registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSignal {
    /// A code bound to a detector
    Known(char),
    /// Anything else; rejected with a diagnostic, never dropped silently
    Unknown(String),
    /// Empty payload (`@#`): show a placeholder until the mode changes
    Idle,
}

impl TaskSignal {
    /// Classify a received payload.
    ///
    /// Surrounding ASCII whitespace is ignored so a controller that pads its
    /// messages still matches.
    pub fn parse(payload: &str, is_known: impl Fn(char) -> bool) -> Self {
        let token = payload.trim_matches(|c: char| c.is_ascii_whitespace());
        if token.is_empty() {
            return TaskSignal::Idle;
        }
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) if is_known(code) => TaskSignal::Known(code),
            _ => TaskSignal::Unknown(payload.to_string()),
        }
    }
}

impl fmt::Display for TaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSignal::Known(code) => write!(f, "task {}", code),
            TaskSignal::Unknown(raw) => write!(f, "unknown signal {:?}", raw),
            TaskSignal::Idle => write!(f, "idle"),
        }
    }
}
