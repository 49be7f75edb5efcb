//! Capture thread keeping the frame slot fresh

use super::{Camera, FrameSlot, SessionRecorder};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Back-off after a camera error
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the camera on a dedicated `capture` thread.
///
/// The camera is never closed on mode changes; it lives until the worker is
/// stopped or dropped. With a recorder attached every captured frame is also
/// written to the session directory; a failed write stops recording, not
/// capture.
pub struct CaptureWorker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureWorker {
    pub fn spawn(
        mut camera: Box<dyn Camera>,
        slot: Arc<FrameSlot>,
        mut recorder: Option<SessionRecorder>,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                log::info!("Capture started ({})", camera.name());
                let mut consecutive_errors = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    match camera.read() {
                        Ok(Some(image)) => {
                            if consecutive_errors > 0 {
                                log::info!("Camera recovered after {} errors", consecutive_errors);
                                consecutive_errors = 0;
                            }
                            if let Some(session) = &mut recorder
                                && let Err(e) = session.record(&image)
                            {
                                log::warn!(
                                    "Recording stopped after {} frames: {}",
                                    session.recorded(),
                                    e
                                );
                                recorder = None;
                            }
                            let sequence = slot.publish(image);
                            log::trace!("captured frame {}", sequence);
                        }
                        Ok(None) => thread::sleep(Duration::from_millis(5)),
                        Err(e) => {
                            consecutive_errors += 1;
                            if consecutive_errors == 1 || consecutive_errors % 50 == 0 {
                                log::warn!("Camera read failed ({}x): {}", consecutive_errors, e);
                            }
                            thread::sleep(ERROR_BACKOFF);
                        }
                    }
                }
                if let Some(session) = &recorder {
                    log::info!(
                        "Recorded {} frames to {}",
                        session.recorded(),
                        session.dir().display()
                    );
                }
                log::info!("Capture stopped");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
