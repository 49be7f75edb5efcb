//! Vision tasks requested over the control channel

pub mod detectors;
mod dispatcher;
pub mod records;
mod registry;
mod signal;

pub use dispatcher::{
    DispatchOutcome, FrameSink, Interrupt, Latency, TaskDispatcher, TaskIo,
};
pub use registry::{DetectOutcome, Detection, Detector, TaskRegistry};
pub use signal::TaskSignal;
