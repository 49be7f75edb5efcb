//! Task mode: one signal in, frames through a detector, one record out
//!
//! ```text
//! wait for signal ──► Unknown ──► fault, keep waiting
//!        │
//!        ├──► Idle ──► placeholder frames until a checkpoint fires
//!        │
//!        └──► Known(code)
//!               loop: acquire ─► crop ─► detect ─► sink(annotated)
//!                       NotYet       ─► next frame (missed += 1)
//!                       Housekeeping ─► done, nothing sent
//!                       Result(rec)  ─► write rec, bucket latency, done
//! ```
//!
//! Checkpoints (mode switch, shutdown) run while waiting for a signal, on
//! every idle frame and every `check_interval` detection iterations. A
//! detector call is never interrupted.

use super::{DetectOutcome, TaskRegistry, TaskSignal};
use crate::capture::{Frame, FrameSource};
use crate::config::TaskConfig;
use crate::control::ControlLink;
use crate::mode::OperatorConsole;
use std::fmt;
use std::time::{Duration, Instant};

/// Sleep between control polls while no signal is pending
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Pace of idle placeholder frames when the camera has nothing new
const IDLE_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Placeholder size before any real frame has been seen
const DEFAULT_PLACEHOLDER: (u32, u32) = (640, 480);

/// Why a checkpoint stopped the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    ModeChanged,
    Shutdown,
}

/// Operator feedback bucket for signal-to-result latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    /// Under 200 ms
    Fast,
    /// Under 1 s
    Normal,
    Slow,
}

impl Latency {
    pub fn classify(elapsed: Duration) -> Self {
        if elapsed < Duration::from_millis(200) {
            Latency::Fast
        } else if elapsed < Duration::from_secs(1) {
            Latency::Normal
        } else {
            Latency::Slow
        }
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Latency::Fast => "fast",
            Latency::Normal => "normal",
            Latency::Slow => "slow",
        })
    }
}

/// How one dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed {
        code: char,
        record: String,
        latency: Duration,
        bucket: Latency,
        /// Detection iterations, including the one that produced the record
        iterations: u32,
        /// False if the serial write failed
        delivered: bool,
    },
    Housekeeping {
        code: char,
    },
    ModeChanged,
    Shutdown,
}

impl From<Interrupt> for DispatchOutcome {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::ModeChanged => DispatchOutcome::ModeChanged,
            Interrupt::Shutdown => DispatchOutcome::Shutdown,
        }
    }
}

/// Where annotated frames go while a task runs (the video transport on the
/// appliance)
pub trait FrameSink {
    fn show(&mut self, frame: &Frame);
}

impl<F: FnMut(&Frame)> FrameSink for F {
    fn show(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Everything a dispatch borrows from the mode controller
pub struct TaskIo<'a> {
    pub control: &'a mut dyn ControlLink,
    pub frames: &'a mut dyn FrameSource,
    pub sink: &'a mut dyn FrameSink,
    pub console: &'a mut OperatorConsole,
    /// Mode switch and shutdown check
    pub checkpoint: &'a mut dyn FnMut() -> Option<Interrupt>,
}

pub struct TaskDispatcher {
    registry: TaskRegistry,
    config: TaskConfig,
    /// Iterations that ended without a result, for diagnostics only
    missed_frames: u64,
}

impl TaskDispatcher {
    pub fn new(registry: TaskRegistry, config: TaskConfig) -> Self {
        Self {
            registry,
            config,
            missed_frames: 0,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Replace the task configuration; takes effect on the next dispatch
    pub fn set_config(&mut self, config: TaskConfig) {
        self.config = config;
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Swap the detector table (after a bindings change)
    pub fn set_registry(&mut self, registry: TaskRegistry) {
        self.registry = registry;
    }

    pub fn missed_frames(&self) -> u64 {
        self.missed_frames
    }

    /// Wait for one signal and run it to completion or interruption
    pub fn dispatch(&mut self, io: &mut TaskIo<'_>) -> DispatchOutcome {
        loop {
            if let Some(interrupt) = (io.checkpoint)() {
                return interrupt.into();
            }
            let payload = match io.control.try_read() {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    std::thread::sleep(SIGNAL_POLL_INTERVAL);
                    continue;
                }
                Err(e) => {
                    io.console
                        .fault(&format!("control read on {} failed: {}", io.control.describe(), e));
                    std::thread::sleep(SIGNAL_POLL_INTERVAL);
                    continue;
                }
            };

            match self.registry.resolve(&payload) {
                TaskSignal::Unknown(raw) => {
                    io.console.fault(&format!("invalid signal {:?}", raw));
                }
                TaskSignal::Idle => return self.idle(io),
                TaskSignal::Known(code) => match self.run(code, io) {
                    Some(outcome) => return outcome,
                    None => io.console.fault(&format!("no detector bound to {:?}", code)),
                },
            }
        }
    }

    fn idle(&mut self, io: &mut TaskIo<'_>) -> DispatchOutcome {
        io.console.task("idle");
        let mut size = DEFAULT_PLACEHOLDER;
        loop {
            if let Some(interrupt) = (io.checkpoint)() {
                return interrupt.into();
            }
            match io.frames.acquire() {
                Some(frame) => size = (frame.width(), frame.height()),
                None => std::thread::sleep(IDLE_FRAME_INTERVAL),
            }
            io.sink.show(&Frame::placeholder(size.0, size.1));
        }
    }

    fn run(&mut self, code: char, io: &mut TaskIo<'_>) -> Option<DispatchOutcome> {
        let detector = self.registry.get_mut(code)?;
        let name = detector.name().to_string();
        let interval = self.config.check_interval();
        let started = Instant::now();
        let mut iterations: u32 = 0;
        let mut missed: u32 = 0;
        log::info!("Task {} ({}) started", code, name);
        io.console.task(&format!("{} {}", code, name));

        loop {
            if iterations > 0 && iterations % interval == 0 {
                if let Some(interrupt) = (io.checkpoint)() {
                    log::info!(
                        "Task {} interrupted ({:?}) after {} iterations",
                        code,
                        interrupt,
                        iterations
                    );
                    return Some(interrupt.into());
                }
            }
            iterations += 1;

            let Some(frame) = io.frames.acquire() else {
                log::debug!("Task {}: no fresh frame", code);
                missed += 1;
                self.missed_frames += 1;
                continue;
            };
            let cropped = frame.crop_bottom(self.config.crop_bottom);
            let detection = detector.detect(&cropped, &self.config);
            io.sink.show(&detection.annotated);

            match detection.outcome {
                DetectOutcome::NotYet => {
                    missed += 1;
                    self.missed_frames += 1;
                }
                DetectOutcome::Housekeeping => {
                    log::info!("Task {} ({}) done, nothing to send", code, name);
                    io.console.task(&format!("{} {} done", code, name));
                    return Some(DispatchOutcome::Housekeeping { code });
                }
                DetectOutcome::Result(record) => {
                    let latency = started.elapsed();
                    let bucket = Latency::classify(latency);
                    let delivered = match io.control.write(&record) {
                        Ok(()) => true,
                        Err(e) => {
                            io.console.fault(&format!("result {} not sent: {}", record, e));
                            false
                        }
                    };
                    log::info!(
                        "Task {} -> {} in {} ms ({}), {} of {} frames without result",
                        code,
                        record,
                        latency.as_millis(),
                        bucket,
                        missed,
                        iterations
                    );
                    io.console.task(&format!("{} {} {}", code, record, bucket));
                    return Some(DispatchOutcome::Completed {
                        code,
                        record,
                        latency,
                        bucket,
                        iterations,
                        delivered,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Delimiters, FramedChannel};
    use crate::hardware::{LogDisplay, NullLed};
    use crate::tasks::{Detection, Detector};
    use crate::transport::MockTransport;
    use image::RgbImage;
    use std::sync::Arc;

    /// Returns `NotYet` a fixed number of times, then `record`
    struct StubDetector {
        misses: u32,
        calls: u32,
        record: Option<String>,
    }

    impl Detector for StubDetector {
        fn name(&self) -> &str {
            "stub"
        }

        fn detect(&mut self, frame: &Frame, _config: &TaskConfig) -> Detection {
            self.calls += 1;
            match &self.record {
                Some(record) if self.calls > self.misses => Detection::result(record, frame.clone()),
                _ => Detection::not_yet(frame.clone()),
            }
        }
    }

    struct CountingSource {
        acquisitions: u32,
    }

    impl FrameSource for CountingSource {
        fn acquire(&mut self) -> Option<Arc<Frame>> {
            self.acquisitions += 1;
            let mut frame = Frame::new(RgbImage::new(64, 48));
            frame.sequence = u64::from(self.acquisitions);
            Some(Arc::new(frame))
        }
    }

    struct Rig {
        mock: MockTransport,
        channel: FramedChannel,
        source: CountingSource,
        console: OperatorConsole,
        shown: Vec<u64>,
    }

    impl Rig {
        fn new(input: &[u8]) -> Self {
            let mock = MockTransport::new();
            mock.inject_read(input);
            Self {
                channel: FramedChannel::new(Box::new(mock.clone()), Delimiters::default()),
                mock,
                source: CountingSource { acquisitions: 0 },
                console: OperatorConsole::new(Box::new(LogDisplay::new()), Box::new(NullLed)),
                shown: Vec::new(),
            }
        }

        fn dispatch(
            &mut self,
            dispatcher: &mut TaskDispatcher,
            checkpoint: &mut dyn FnMut() -> Option<Interrupt>,
        ) -> DispatchOutcome {
            let shown = &mut self.shown;
            let mut sink = |frame: &Frame| shown.push(frame.sequence);
            let mut io = TaskIo {
                control: &mut self.channel,
                frames: &mut self.source,
                sink: &mut sink,
                console: &mut self.console,
                checkpoint,
            };
            dispatcher.dispatch(&mut io)
        }
    }

    fn dispatcher_with(code: char, detector: StubDetector) -> TaskDispatcher {
        let mut registry = TaskRegistry::new();
        registry.register(code, Box::new(detector));
        TaskDispatcher::new(registry, TaskConfig::default())
    }

    fn stub(misses: u32, record: Option<&str>) -> StubDetector {
        StubDetector {
            misses,
            calls: 0,
            record: record.map(str::to_string),
        }
    }

    #[test]
    fn test_right_angle_scenario() {
        let mut dispatcher = dispatcher_with('3', stub(4, Some("L10450200150E")));
        let mut rig = Rig::new(b"@3#");

        let outcome = rig.dispatch(&mut dispatcher, &mut || None);

        let DispatchOutcome::Completed {
            code,
            record,
            iterations,
            delivered,
            bucket,
            ..
        } = outcome
        else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(code, '3');
        assert_eq!(record, "L10450200150E");
        assert_eq!(iterations, 5);
        assert!(delivered);
        assert_eq!(bucket, Latency::Fast);
        assert_eq!(rig.source.acquisitions, 5);
        assert_eq!(rig.mock.written_string(), "@L10450200150E#");
        assert_eq!(dispatcher.missed_frames(), 4);
        // Every annotated frame reached the sink, results or not
        assert_eq!(rig.shown, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_n_misses_then_result() {
        for n in [0u32, 1, 7, 45] {
            let mut dispatcher = dispatcher_with('1', stub(n, Some("C123E")));
            let mut rig = Rig::new(b"@1#");
            let outcome = rig.dispatch(&mut dispatcher, &mut || None);
            assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
            assert_eq!(rig.source.acquisitions, n + 1);
            assert_eq!(rig.mock.written_string(), "@C123E#");
        }
    }

    #[test]
    fn test_unknown_signal_is_rejected_then_next_runs() {
        let mut dispatcher = dispatcher_with('3', stub(0, Some("L10000000000E")));
        let mut rig = Rig::new(b"@9#@3#");

        let outcome = rig.dispatch(&mut dispatcher, &mut || None);

        assert!(matches!(outcome, DispatchOutcome::Completed { code: '3', .. }));
        assert_eq!(rig.console.faults(), 1);
        assert_eq!(rig.mock.written_string(), "@L10000000000E#");
    }

    #[test]
    fn test_one_signal_per_dispatch() {
        let mut dispatcher = dispatcher_with('3', stub(0, Some("L10000000000E")));
        let mut rig = Rig::new(b"@3#@3#");

        rig.dispatch(&mut dispatcher, &mut || None);
        assert_eq!(rig.mock.written_string(), "@L10000000000E#");
        rig.dispatch(&mut dispatcher, &mut || None);
        assert_eq!(rig.mock.written_string(), "@L10000000000E#@L10000000000E#");
    }

    #[test]
    fn test_mode_change_interrupts_long_task() {
        let mut dispatcher = dispatcher_with('3', stub(0, None));
        let mut rig = Rig::new(b"@3#");
        let mut checks = 0;
        let mut checkpoint = || {
            checks += 1;
            (checks > 3).then_some(Interrupt::ModeChanged)
        };

        let outcome = rig.dispatch(&mut dispatcher, &mut checkpoint);

        assert_eq!(outcome, DispatchOutcome::ModeChanged);
        // One check while waiting for the signal, then every 30 iterations
        assert_eq!(rig.source.acquisitions, 90);
        assert_eq!(rig.mock.written_string(), "");
    }

    #[test]
    fn test_shutdown_while_waiting_for_signal() {
        let mut dispatcher = dispatcher_with('3', stub(0, Some("x")));
        let mut rig = Rig::new(b"");
        let outcome = rig.dispatch(&mut dispatcher, &mut || Some(Interrupt::Shutdown));
        assert_eq!(outcome, DispatchOutcome::Shutdown);
        assert_eq!(rig.source.acquisitions, 0);
    }

    #[test]
    fn test_idle_shows_placeholders_until_checkpoint() {
        let mut dispatcher = dispatcher_with('3', stub(0, Some("x")));
        let mut rig = Rig::new(b"@#");
        let mut checks = 0;
        let mut checkpoint = || {
            checks += 1;
            (checks > 4).then_some(Interrupt::ModeChanged)
        };

        let outcome = rig.dispatch(&mut dispatcher, &mut checkpoint);

        assert_eq!(outcome, DispatchOutcome::ModeChanged);
        // Placeholders carry sequence 0
        assert_eq!(rig.shown, vec![0, 0, 0]);
        assert_eq!(rig.mock.written_string(), "");
    }

    #[test]
    fn test_housekeeping_sends_nothing() {
        let mut registry = TaskRegistry::new();
        let mut shared = crate::tasks::detectors::SharedState::default();
        registry.register('R', crate::tasks::detectors::build("reset_tracking", &mut shared).unwrap());
        let mut dispatcher = TaskDispatcher::new(registry, TaskConfig::default());
        let mut rig = Rig::new(b"@R#");

        let outcome = rig.dispatch(&mut dispatcher, &mut || None);

        assert_eq!(outcome, DispatchOutcome::Housekeeping { code: 'R' });
        assert_eq!(rig.mock.written_string(), "");
    }

    #[test]
    fn test_failed_write_is_a_fault_not_a_crash() {
        let mut dispatcher = dispatcher_with('1', stub(0, Some("C000E")));
        let mut rig = Rig::new(b"@1#");
        rig.mock.set_fail_writes(true);

        let outcome = rig.dispatch(&mut dispatcher, &mut || None);

        assert!(matches!(outcome, DispatchOutcome::Completed { delivered: false, .. }));
        assert_eq!(rig.console.faults(), 1);
    }

    #[test]
    fn test_latency_buckets() {
        assert_eq!(Latency::classify(Duration::from_millis(10)), Latency::Fast);
        assert_eq!(Latency::classify(Duration::from_millis(200)), Latency::Normal);
        assert_eq!(Latency::classify(Duration::from_millis(999)), Latency::Normal);
        assert_eq!(Latency::classify(Duration::from_secs(3)), Latency::Slow);
    }
}
