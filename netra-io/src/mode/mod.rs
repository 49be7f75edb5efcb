//! Top-level Streaming / Task state machine

mod controller;
mod operator;

pub use controller::{ControllerStats, ModeController};
pub use operator::OperatorConsole;

use std::fmt;

/// What the appliance is doing, selected by the mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Live video to the operator console
    Streaming,
    /// Vision tasks requested over serial
    Task,
}

impl Mode {
    /// Switch active means Streaming
    pub fn from_switch(active: bool) -> Self {
        if active { Mode::Streaming } else { Mode::Task }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Streaming => "STREAM",
            Mode::Task => "TASK",
        })
    }
}
