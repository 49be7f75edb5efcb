//! Latest-frame mailbox shared by the capture thread and the control loop

use super::Frame;
use arc_swap::ArcSwapOption;
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Single-slot mailbox holding the newest frame.
///
/// The capture thread atomically swaps a fresh `Arc<Frame>` in; readers
/// load the current `Arc` without taking a lock, so a reader never sees a
/// half-written bitmap and never stalls the writer behind an encode or a
/// detection. The mutex only pairs with the condvar for `wait_newer`.
pub struct FrameSlot {
    latest: ArcSwapOption<Frame>,
    gate: Mutex<()>,
    fresh: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            gate: Mutex::new(()),
            fresh: Condvar::new(),
        }
    }

    /// Store a new frame, replacing the previous one. Returns its sequence.
    ///
    /// Single writer: only the capture thread publishes.
    pub fn publish(&self, image: RgbImage) -> u64 {
        let sequence = self.latest.load().as_ref().map_or(1, |f| f.sequence + 1);
        self.latest.store(Some(Arc::new(Frame {
            image,
            captured_at: Instant::now(),
            sequence,
        })));
        // Taking the gate orders this wakeup after any waiter's last check
        drop(self.gate.lock());
        self.fresh.notify_all();
        sequence
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.load_full()
    }

    fn newer_than(&self, after: u64) -> Option<Arc<Frame>> {
        self.latest.load_full().filter(|f| f.sequence > after)
    }

    /// Wait up to `timeout` for a frame newer than `after`
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut gate = self.gate.lock();
        loop {
            if let Some(frame) = self.newer_than(after) {
                return Some(frame);
            }
            if self.fresh.wait_until(&mut gate, deadline).timed_out() {
                return self.newer_than(after);
            }
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the control loop gets its frames from
pub trait FrameSource {
    /// Next frame, or `None` if nothing new arrived in time
    fn acquire(&mut self) -> Option<Arc<Frame>>;
}

/// [`FrameSource`] reading from a [`FrameSlot`], never handing out the same
/// frame twice
pub struct SlotSource {
    slot: Arc<FrameSlot>,
    last_seen: u64,
    timeout: Duration,
}

impl SlotSource {
    pub fn new(slot: Arc<FrameSlot>, timeout: Duration) -> Self {
        Self {
            slot,
            last_seen: 0,
            timeout,
        }
    }
}

impl FrameSource for SlotSource {
    fn acquire(&mut self) -> Option<Arc<Frame>> {
        let frame = self.slot.wait_newer(self.last_seen, self.timeout)?;
        self.last_seen = frame.sequence;
        Some(frame)
    }
}
