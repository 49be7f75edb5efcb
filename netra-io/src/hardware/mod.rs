//! Board peripherals around the control loop
//!
//! Switch, LED and display calls are fire-and-forget: a failing GPIO write
//! is logged, never propagated, so a missing peripheral cannot stop the
//! appliance.

pub mod board;
mod display;
mod gpio;
pub mod wifi;

pub use display::{LogDisplay, NullDisplay};
pub use gpio::{ManualSwitch, NullLed, SysfsLed, SysfsSwitch};

use crate::config::HardwareConfig;
use crate::error::Result;

/// Two-position mode switch
pub trait ModeSwitch: Send {
    /// True when the switch is in its active position
    fn read_status(&mut self) -> bool;
}

/// Status LED
pub trait Led: Send {
    fn on(&mut self);
    fn off(&mut self);
}

/// Small text display (OLED on the appliance)
pub trait StatusDisplay: Send {
    fn clear(&mut self);
    /// Put `text` on row `line`, replacing what was there
    fn text(&mut self, line: usize, text: &str);
    /// Push the buffered rows to the screen
    fn display(&mut self);
}

/// Peripherals built from the `[hardware]` section
pub struct Peripherals {
    pub switch: Box<dyn ModeSwitch>,
    pub led: Box<dyn Led>,
    pub display: Box<dyn StatusDisplay>,
}

/// Open what is configured and substitute no-op stand-ins for the rest
pub fn open_peripherals(config: &HardwareConfig) -> Result<Peripherals> {
    let switch: Box<dyn ModeSwitch> = match &config.switch_gpio {
        Some(path) => match SysfsSwitch::open(path, config.switch_invert) {
            Ok(switch) => Box::new(switch),
            Err(e) => {
                log::warn!("Mode switch {} unavailable ({}), using fixed mode", path.display(), e);
                Box::new(ManualSwitch::new(fixed_switch_state(config)))
            }
        },
        None => Box::new(ManualSwitch::new(fixed_switch_state(config))),
    };

    let led: Box<dyn Led> = match &config.led_gpio {
        Some(path) => match SysfsLed::open(path) {
            Ok(led) => Box::new(led),
            Err(e) => {
                log::warn!("LED {} unavailable ({}), running without it", path.display(), e);
                Box::new(NullLed)
            }
        },
        None => Box::new(NullLed),
    };

    let display: Box<dyn StatusDisplay> = if config.display {
        Box::new(LogDisplay::new())
    } else {
        Box::new(NullDisplay)
    };

    Ok(Peripherals {
        switch,
        led,
        display,
    })
}

/// Switch state standing in for a missing switch: active means Streaming
fn fixed_switch_state(config: &HardwareConfig) -> bool {
    config.fixed_mode.as_deref() != Some("task")
}
