//! Engine module housing the detection session.
//!
//! This module exposes trait-based capture backends (`backend`), the session
//! lifecycle (`session`), the frame-paced sampling loop (`scheduler`) and the
//! background-track ducking policy (`ducking`).

pub mod backend;
pub mod ducking;
pub mod scheduler;
pub mod session;

#[cfg(not(target_os = "android"))]
pub use backend::CpalCaptureBackend;
pub use backend::{
    CaptureBackend, CaptureHandle, CaptureStream, FixtureCaptureBackend, ManualClock,
    SystemTimeSource, TimeSource,
};
pub use ducking::{DuckState, DuckingCoordinator};
pub use scheduler::{
    IntervalTickSource, ManualTickSource, SamplingScheduler, ScheduleOutcome, StopHandle,
    TickSource,
};
pub use session::{AudioSession, ConsentState, SessionManager, SessionPhase};
