//! Camera capture: frames, the latest-frame slot, the capture thread and
//! the session recorder

mod camera;
mod frame;
mod recorder;
mod slot;
mod worker;

#[cfg(feature = "device-camera")]
pub use camera::DeviceCamera;
pub use camera::{Camera, ReplayCamera, SyntheticCamera, open_camera};
pub use recorder::SessionRecorder;
pub use frame::{Frame, encode_jpeg};
pub use slot::{FrameSlot, FrameSource, SlotSource};
pub use worker::CaptureWorker;
