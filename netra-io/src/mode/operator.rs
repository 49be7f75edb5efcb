//! Operator feedback: log lines mirrored to the status display and LED
//!
//! Display rows:
//!
//! ```text
//! 0  mode         "STREAM tcp" / "TASK"
//! 1  status       last status or fault line
//! 2  task         last task result and latency
//! 3  board        temperature, network
//! ```

use super::Mode;
use crate::hardware::{Led, StatusDisplay};

const ROW_MODE: usize = 0;
const ROW_STATUS: usize = 1;
const ROW_TASK: usize = 2;
const ROW_BOARD: usize = 3;

pub struct OperatorConsole {
    display: Box<dyn StatusDisplay>,
    led: Box<dyn Led>,
    rows: [String; 4],
    faults: u64,
}

impl OperatorConsole {
    pub fn new(display: Box<dyn StatusDisplay>, led: Box<dyn Led>) -> Self {
        Self {
            display,
            led,
            rows: Default::default(),
            faults: 0,
        }
    }

    /// Faults reported since startup
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Mode change: LED on while in Task mode
    pub fn mode(&mut self, mode: Mode, detail: &str) {
        match mode {
            Mode::Task => self.led.on(),
            Mode::Streaming => self.led.off(),
        }
        self.set(ROW_MODE, format!("{} {}", mode, detail).trim_end().to_string());
    }

    pub fn status(&mut self, message: &str) {
        log::info!("{}", message);
        self.set(ROW_STATUS, message.to_string());
    }

    /// Control fault: logged as an error and shown until replaced
    pub fn fault(&mut self, message: &str) {
        self.faults += 1;
        log::error!("{}", message);
        self.set(ROW_STATUS, format!("ERR {}", message));
    }

    pub fn task(&mut self, message: &str) {
        self.set(ROW_TASK, message.to_string());
    }

    pub fn board(&mut self, message: &str) {
        self.set(ROW_BOARD, message.to_string());
    }

    fn set(&mut self, row: usize, text: String) {
        if self.rows[row] == text {
            return;
        }
        self.rows[row] = text;
        self.display.clear();
        for (line, text) in self.rows.iter().enumerate() {
            self.display.text(line, text);
        }
        self.display.display();
    }
}
