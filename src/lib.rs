// Blow Detector - sustained-blow gesture detection from microphone input
// Frequency filter -> spectral analyzer -> debounced sub-band classifier,
// driven at display-frame cadence by a single-threaded session.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod playback;
pub mod telemetry;
pub mod testing;

pub use analysis::classifier::{BlowClassifier, DetectionState, DetectionStatus};
pub use analysis::filter::{FilterConfig, FrequencyFilter};
pub use analysis::frame::{SpectralFrame, SubBandWindow};
pub use analysis::spectrum::SpectralAnalyzer;
pub use config::{Activation, AppConfig, Preset};
pub use engine::{
    AudioSession, ConsentState, SamplingScheduler, ScheduleOutcome, SessionManager, SessionPhase,
    StopHandle,
};
pub use error::{SessionError, TrackError};

/// Install the fmt subscriber used by the binaries.
///
/// Records emitted through the `log` facade are captured too. Calling this
/// more than once is harmless.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
