//! NetraIO - camera vision appliance daemon
//!
//! ## Startup
//!
//! 1. Load config, start logging
//! 2. Optional Wi-Fi join, board temperature on the display
//! 3. Capture thread filling the latest-frame slot (and the session
//!    recording, if configured)
//! 4. Serial control link (degrades to a silent link without a port)
//! 5. Video transport (TCP or UDP, bound once)
//! 6. Mode controller on the main thread until Ctrl-C

use netra_io::capture::{CaptureWorker, FrameSlot, SessionRecorder, SlotSource, open_camera};
use netra_io::config::Config;
use netra_io::control::open_control;
use netra_io::error::{Error, Result};
use netra_io::hardware::{self, board, wifi};
use netra_io::mode::{ModeController, OperatorConsole};
use netra_io::streaming::VideoTransport;
use netra_io::tasks::{TaskDispatcher, TaskRegistry};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `netra-io <path>` (positional)
/// - `netra-io --config <path>` (flag-based)
/// - `netra-io -c <path>` (short flag)
///
/// Defaults to `/etc/netra.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/netra.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = Config::load(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("NetraIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);

    // Set up shutdown signal handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        s.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let peripherals = hardware::open_peripherals(&config.hardware)?;
    let mut console = OperatorConsole::new(peripherals.display, peripherals.led);

    if let Some(net) = &config.wifi {
        match wifi::connect_wifi(&net.ssid, &net.password, net.rescan) {
            Ok(()) => console.board(&format!("wifi {}", net.ssid)),
            Err(e) => console.fault(&format!("wifi {}: {}", net.ssid, e)),
        }
    }
    match board::cpu_temperature() {
        Ok(cpu) => {
            let line = match board::gpu_temperature() {
                Some(gpu) => format!("CPU {:.1}C GPU {:.1}C", cpu, gpu),
                None => format!("CPU {:.1}C", cpu),
            };
            log::info!("Board temperature: {}", line);
            console.board(&line);
        }
        Err(e) => log::debug!("No board temperature: {}", e),
    }

    // Capture thread owns the camera for the whole run
    let camera = open_camera(&config.camera)?;
    log::info!(
        "Camera: {} ({}x{} @ {} fps)",
        camera.name(),
        config.camera.width,
        config.camera.height,
        config.camera.fps
    );
    let recorder = match &config.camera.record_dir {
        Some(root) => Some(SessionRecorder::create(root)?),
        None => None,
    };
    let slot = Arc::new(FrameSlot::new());
    let capture = CaptureWorker::spawn(camera, Arc::clone(&slot), recorder)?;
    let frames = SlotSource::new(
        Arc::clone(&slot),
        Duration::from_millis(config.task.acquire_timeout_ms),
    );

    let control = open_control(&config.serial)?;
    log::info!(
        "Control link: {} (head {:?}, tail {:?})",
        control.describe(),
        config.serial.head,
        config.serial.tail
    );

    let video = VideoTransport::open(&config.streaming)?;

    let registry = TaskRegistry::from_bindings(&config.task.bindings)?;
    let dispatcher = TaskDispatcher::new(registry, config.task.clone());

    let mut controller = ModeController::new(
        peripherals.switch,
        video,
        control,
        Box::new(frames),
        dispatcher,
        console,
        shutdown,
    )
    .with_config_path(&config_path)
    .with_check_interval(config.streaming.check_interval());

    log::info!("NetraIO running. Press Ctrl-C to stop.");
    controller.run()?;

    log::info!("Shutting down...");
    capture.stop();
    drop(capture);
    log::info!("NetraIO stopped");
    Ok(())
}
