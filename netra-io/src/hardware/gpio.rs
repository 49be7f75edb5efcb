//! sysfs GPIO switch and LED
//!
//! Both read or write a line's `value` file (e.g.
//! `/sys/class/gpio/gpio17/value`); exporting the line and setting its
//! direction is left to the board setup scripts.

use super::{Led, ModeSwitch};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Mode switch read from a sysfs GPIO input
pub struct SysfsSwitch {
    path: PathBuf,
    invert: bool,
    last: bool,
    read_failures: u32,
}

impl SysfsSwitch {
    pub fn open(path: &Path, invert: bool) -> Result<Self> {
        let mut switch = Self {
            path: path.to_path_buf(),
            invert,
            last: false,
            read_failures: 0,
        };
        switch.last = switch.read_raw()? != invert;
        log::info!(
            "Mode switch on {} (inverted: {}, currently {})",
            path.display(),
            invert,
            if switch.last { "on" } else { "off" }
        );
        Ok(switch)
    }

    fn read_raw(&self) -> Result<bool> {
        let value = fs::read_to_string(&self.path)?;
        match value.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(Error::InvalidParameter(format!(
                "unexpected GPIO value {:?} in {}",
                other,
                self.path.display()
            ))),
        }
    }
}

impl ModeSwitch for SysfsSwitch {
    /// A failed read keeps the last known position
    fn read_status(&mut self) -> bool {
        match self.read_raw() {
            Ok(level) => {
                self.read_failures = 0;
                self.last = level != self.invert;
            }
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures == 1 {
                    log::warn!("Mode switch read failed, keeping last position: {}", e);
                }
            }
        }
        self.last
    }
}

/// Switch driven from software: stands in for a missing switch and lets
/// tests flip the mode from another thread
#[derive(Clone)]
pub struct ManualSwitch {
    state: Arc<AtomicBool>,
}

impl ManualSwitch {
    pub fn new(active: bool) -> Self {
        Self {
            state: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn set(&self, active: bool) {
        self.state.store(active, Ordering::SeqCst);
    }
}

impl ModeSwitch for ManualSwitch {
    fn read_status(&mut self) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}

/// LED on a sysfs GPIO output
pub struct SysfsLed {
    path: PathBuf,
}

impl SysfsLed {
    pub fn open(path: &Path) -> Result<Self> {
        let led = Self {
            path: path.to_path_buf(),
        };
        led.write("0")?;
        Ok(led)
    }

    fn write(&self, value: &str) -> Result<()> {
        fs::write(&self.path, value)?;
        Ok(())
    }
}

impl Led for SysfsLed {
    fn on(&mut self) {
        if let Err(e) = self.write("1") {
            log::warn!("LED on failed: {}", e);
        }
    }

    fn off(&mut self) {
        if let Err(e) = self.write("0") {
            log::warn!("LED off failed: {}", e);
        }
    }
}

/// LED stand-in when none is wired
pub struct NullLed;

impl Led for NullLed {
    fn on(&mut self) {}
    fn off(&mut self) {}
}
