//! Mode controller
//!
//! ```text
//!            ┌──────── switch read at loop top ────────┐
//!            ▼                                         │
//!   Streaming: acquire ─► send ─► (every N frames: checkpoint)
//!            │   ReconnectRequired                     │
//!            ▼                                         │
//!   Reconnect: connecting() ─► checkpoint ─► ...       │
//!                                                      │
//!   Task: dispatch one signal (checkpoints inside) ────┘
//! ```
//!
//! The camera, control link and video transport live for the whole run;
//! a mode change only changes which loop drives them.

use super::{Mode, OperatorConsole};
use crate::capture::{Frame, FrameSource};
use crate::config::TaskConfig;
use crate::control::ControlLink;
use crate::error::Result;
use crate::hardware::ModeSwitch;
use crate::streaming::{SendOutcome, VideoTransport};
use crate::tasks::{DispatchOutcome, Interrupt, TaskDispatcher, TaskIo, TaskRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Counters reported at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub mode_changes: u64,
    pub frames_streamed: u64,
    pub reconnects: u64,
    pub tasks_completed: u64,
    pub results_undelivered: u64,
}

pub struct ModeController {
    switch: Box<dyn ModeSwitch>,
    video: VideoTransport,
    control: Box<dyn ControlLink>,
    frames: Box<dyn FrameSource>,
    dispatcher: TaskDispatcher,
    console: OperatorConsole,
    shutdown: Arc<AtomicBool>,
    /// Re-read on every entry into Task mode
    config_path: Option<PathBuf>,
    /// Frames between switch reads while streaming
    check_interval: u32,
    mode: Option<Mode>,
    stats: ControllerStats,
}

/// Shutdown first, then the switch
fn checkpoint(switch: &mut dyn ModeSwitch, shutdown: &AtomicBool, current: Mode) -> Option<Interrupt> {
    if shutdown.load(Ordering::Relaxed) {
        return Some(Interrupt::Shutdown);
    }
    if Mode::from_switch(switch.read_status()) != current {
        return Some(Interrupt::ModeChanged);
    }
    None
}

impl ModeController {
    pub fn new(
        switch: Box<dyn ModeSwitch>,
        video: VideoTransport,
        control: Box<dyn ControlLink>,
        frames: Box<dyn FrameSource>,
        dispatcher: TaskDispatcher,
        console: OperatorConsole,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            switch,
            video,
            control,
            frames,
            dispatcher,
            console,
            shutdown,
            config_path: None,
            check_interval: 30,
            mode: None,
            stats: ControllerStats::default(),
        }
    }

    /// Reload `[task]` from this file whenever Task mode is entered
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Streaming frames between switch reads, clamped to 1..=30
    pub fn with_check_interval(mut self, frames: u32) -> Self {
        self.check_interval = frames.clamp(1, 30);
        self
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Run until the shutdown flag is set
    pub fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let mode = Mode::from_switch(self.switch.read_status());
            if self.mode != Some(mode) {
                self.enter(mode);
            }
            match mode {
                Mode::Streaming => self.stream(),
                Mode::Task => self.task(),
            }
        }
        log::info!("Mode controller stopped: {:?}", self.stats);
        Ok(())
    }

    fn enter(&mut self, mode: Mode) {
        if let Some(previous) = self.mode {
            log::info!("Mode change: {} -> {}", previous, mode);
            self.stats.mode_changes += 1;
        } else {
            log::info!("Starting in {} mode", mode);
        }
        self.mode = Some(mode);
        match mode {
            Mode::Streaming => {
                let detail = format!("{:?}", self.video.kind()).to_lowercase();
                self.console.mode(mode, &detail);
            }
            Mode::Task => {
                self.console.mode(mode, "");
                self.reload_task_config();
            }
        }
    }

    fn reload_task_config(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };
        let config = match TaskConfig::reload(path) {
            Ok(config) => config,
            Err(e) => {
                self.console
                    .fault(&format!("task config reload failed, keeping previous: {}", e));
                return;
            }
        };
        if config.bindings != self.dispatcher.config().bindings {
            match TaskRegistry::from_bindings(&config.bindings) {
                Ok(registry) => {
                    self.dispatcher.set_registry(registry);
                    log::info!(
                        "Task bindings now {}",
                        self.dispatcher.registry().codes().collect::<String>()
                    );
                }
                Err(e) => {
                    self.console
                        .fault(&format!("task bindings rejected, keeping previous: {}", e));
                    return;
                }
            }
        }
        log::debug!("Task config reloaded from {}", path.display());
        self.dispatcher.set_config(config);
    }

    /// Stream until a checkpoint fires
    fn stream(&mut self) {
        let mut reconnecting = !self.video.ready();
        if reconnecting {
            self.console.status("waiting for viewer");
        }
        let mut since_check: u32 = 0;

        loop {
            if reconnecting {
                if checkpoint(self.switch.as_mut(), &self.shutdown, Mode::Streaming).is_some() {
                    return;
                }
                if self.video.connecting() {
                    reconnecting = false;
                    since_check = 0;
                    self.console.status("viewer connected");
                }
                continue;
            }

            if since_check >= self.check_interval {
                since_check = 0;
                if checkpoint(self.switch.as_mut(), &self.shutdown, Mode::Streaming).is_some() {
                    return;
                }
            }
            since_check += 1;

            let Some(frame) = self.frames.acquire() else {
                continue;
            };
            match self.video.send(&frame) {
                Ok(SendOutcome::Sent) => self.stats.frames_streamed += 1,
                Ok(SendOutcome::ReconnectRequired) => {
                    self.stats.reconnects += 1;
                    self.console.status("viewer lost, reconnecting");
                    reconnecting = true;
                }
                Err(e) => log::warn!("Frame {} not sent: {}", frame.sequence, e),
            }
        }
    }

    /// Run one dispatch; the next loop iteration re-reads the switch
    fn task(&mut self) {
        let video = &mut self.video;
        let mut sink = |frame: &Frame| {
            video.poll_peers();
            if !video.is_connected() {
                return;
            }
            match video.send(frame) {
                Ok(SendOutcome::Sent) => {}
                Ok(SendOutcome::ReconnectRequired) => {
                    log::info!("Viewer lost during task, frames paused until Streaming mode")
                }
                Err(e) => log::warn!("Annotated frame not sent: {}", e),
            }
        };
        let switch = self.switch.as_mut();
        let shutdown = &self.shutdown;
        let mut check = || checkpoint(switch, shutdown, Mode::Task);
        let mut io = TaskIo {
            control: self.control.as_mut(),
            frames: self.frames.as_mut(),
            sink: &mut sink,
            console: &mut self.console,
            checkpoint: &mut check,
        };

        match self.dispatcher.dispatch(&mut io) {
            DispatchOutcome::Completed { delivered, .. } => {
                self.stats.tasks_completed += 1;
                if !delivered {
                    self.stats.results_undelivered += 1;
                }
            }
            DispatchOutcome::Housekeeping { .. } => {}
            DispatchOutcome::ModeChanged | DispatchOutcome::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Delimiters, FramedChannel};
    use crate::hardware::{ManualSwitch, NullDisplay, NullLed};
    use crate::streaming::{TcpFrameServer, UdpFrameServer};
    use crate::transport::MockTransport;
    use image::RgbImage;
    use std::sync::atomic::AtomicU32;
    use std::io::Read;
    use std::net::TcpStream;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Flips the switch to Task after `flip_at` frames
    struct FlippingSource {
        switch: ManualSwitch,
        flip_at: u32,
        acquired: Arc<AtomicU32>,
    }

    impl FrameSource for FlippingSource {
        fn acquire(&mut self) -> Option<Arc<Frame>> {
            let n = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.flip_at {
                self.switch.set(false);
            }
            Some(Arc::new(Frame::new(RgbImage::new(32, 24))))
        }
    }

    /// Sets the shutdown flag once Task mode has been seen twice
    struct TaskCountingSwitch {
        inner: ManualSwitch,
        task_reads: u32,
        shutdown: Arc<AtomicBool>,
    }

    impl ModeSwitch for TaskCountingSwitch {
        fn read_status(&mut self) -> bool {
            let active = self.inner.read_status();
            if !active {
                self.task_reads += 1;
                if self.task_reads >= 2 {
                    self.shutdown.store(true, Ordering::SeqCst);
                }
            }
            active
        }
    }

    fn udp_video() -> VideoTransport {
        VideoTransport::Udp(
            UdpFrameServer::bind("127.0.0.1:0", None, Vec::new(), Duration::from_millis(10), 50)
                .unwrap(),
        )
    }

    #[test]
    fn test_switch_flip_reaches_task_within_check_interval() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let manual = ManualSwitch::new(true);
        let acquired = Arc::new(AtomicU32::new(0));
        let flip_at = 10;

        let switch = TaskCountingSwitch {
            inner: manual.clone(),
            task_reads: 0,
            shutdown: Arc::clone(&shutdown),
        };
        let source = FlippingSource {
            switch: manual,
            flip_at,
            acquired: Arc::clone(&acquired),
        };
        let control = FramedChannel::new(Box::new(MockTransport::new()), Delimiters::default());
        let dispatcher = TaskDispatcher::new(TaskRegistry::new(), TaskConfig::default());
        let console = OperatorConsole::new(Box::new(NullDisplay), Box::new(NullLed));

        let mut controller = ModeController::new(
            Box::new(switch),
            udp_video(),
            Box::new(control),
            Box::new(source),
            dispatcher,
            console,
            Arc::clone(&shutdown),
        );
        controller.run().unwrap();

        let frames = acquired.load(Ordering::SeqCst);
        assert!(frames >= flip_at);
        assert!(frames - flip_at <= 30, "{} frames after the flip", frames - flip_at);
        assert_eq!(controller.mode(), Some(Mode::Task));
        assert_eq!(controller.stats().mode_changes, 1);
        assert_eq!(controller.stats().frames_streamed, u64::from(frames));
    }

    #[test]
    fn test_task_mode_housekeeping_writes_nothing() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mock = MockTransport::new();
        mock.inject_read(b"@R#");
        let control = FramedChannel::new(Box::new(mock.clone()), Delimiters::default());
        let mut bindings = std::collections::BTreeMap::new();
        bindings.insert("R".to_string(), "reset_tracking".to_string());
        let registry = TaskRegistry::from_bindings(&bindings).unwrap();
        let dispatcher = TaskDispatcher::new(registry, TaskConfig::default());
        let console = OperatorConsole::new(Box::new(NullDisplay), Box::new(NullLed));
        let source = FlippingSource {
            switch: ManualSwitch::new(false),
            flip_at: 0,
            acquired: Arc::new(AtomicU32::new(0)),
        };
        // Task on the first two reads (enter + first dispatch), then stop
        let switch = TaskCountingSwitch {
            inner: ManualSwitch::new(false),
            task_reads: 0,
            shutdown: Arc::clone(&shutdown),
        };

        let mut controller = ModeController::new(
            Box::new(switch),
            udp_video(),
            Box::new(control),
            Box::new(source),
            dispatcher,
            console,
            Arc::clone(&shutdown),
        );
        controller.run().unwrap();

        assert_eq!(controller.mode(), Some(Mode::Task));
        assert_eq!(mock.written_string(), "");
    }

    /// Endless stream of tiny frames, counting acquisitions
    struct CountingSource {
        acquired: Arc<AtomicU32>,
    }

    impl FrameSource for CountingSource {
        fn acquire(&mut self) -> Option<Arc<Frame>> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(Frame::new(RgbImage::new(32, 24))))
        }
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_switch_aborts_tcp_reconnect_wait() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let manual = ManualSwitch::new(true);
        let acquired = Arc::new(AtomicU32::new(0));

        let server = TcpFrameServer::bind(
            "127.0.0.1:0",
            Duration::from_millis(20),
            Duration::from_millis(500),
            50,
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        // Viewer attaches, takes some frames, then vanishes. Once streaming
        // has stalled in the reconnect wait the operator flips to Task.
        let operator = {
            let manual = manual.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let streamed = TcpStream::connect(addr).is_ok_and(|mut viewer| {
                    let mut buf = [0u8; 256];
                    let got_bytes = viewer
                        .set_read_timeout(Some(Duration::from_secs(2)))
                        .and_then(|()| viewer.read(&mut buf))
                        .is_ok_and(|n| n > 0);
                    got_bytes
                        && wait_until(Duration::from_secs(5), || {
                            acquired.load(Ordering::SeqCst) >= 20
                        })
                });

                // No acquisitions while waiting in connecting()
                let stalled = streamed
                    && wait_until(Duration::from_secs(5), || {
                        let before = acquired.load(Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(150));
                        acquired.load(Ordering::SeqCst) == before
                    });
                manual.set(false);
                stalled
            })
        };

        let switch = TaskCountingSwitch {
            inner: manual,
            task_reads: 0,
            shutdown: Arc::clone(&shutdown),
        };
        let control = FramedChannel::new(Box::new(MockTransport::new()), Delimiters::default());
        let dispatcher = TaskDispatcher::new(TaskRegistry::new(), TaskConfig::default());
        let console = OperatorConsole::new(Box::new(NullDisplay), Box::new(NullLed));

        let mut controller = ModeController::new(
            Box::new(switch),
            VideoTransport::Tcp(server),
            Box::new(control),
            Box::new(CountingSource {
                acquired: Arc::clone(&acquired),
            }),
            dispatcher,
            console,
            Arc::clone(&shutdown),
        );
        controller.run().unwrap();

        assert!(operator.join().unwrap(), "streaming never reached the reconnect wait");
        assert_eq!(controller.mode(), Some(Mode::Task));
        assert_eq!(controller.stats().mode_changes, 1);
        assert!(controller.stats().reconnects >= 1);
        assert!(controller.stats().frames_streamed >= 1);
    }
}
