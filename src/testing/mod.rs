//! Deterministic harness utilities.
//!
//! Signal generators and fixture playback let a complete session (capture,
//! filter, analyzer, classifier, scheduler) run against recorded or synthetic
//! PCM without touching audio hardware. The CLI's offline `detect` command is
//! built on the same pieces.

pub mod playback;
pub mod signals;

pub use playback::FixturePlayback;
