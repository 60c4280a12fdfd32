//! Session lifecycle: mount, activation, permission, analysis and teardown.
//!
//! A session is mounted by [`SessionManager::start`]. It waits for its
//! activation condition, asks the capture backend for the microphone, builds
//! the capture graph (buffer pool, frequency filter, spectral analyzer) and
//! then runs one classifier tick per scheduler step until a blow is detected.
//! Denied permission or a failed stream leaves the session disabled: it never
//! analyzes and never reports a blow.
//!
//! Sessions are single-threaded. Another thread can only request teardown,
//! through the session's [`StopHandle`].

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::analysis::classifier::{BlowClassifier, DetectionState, DetectionStatus};
use crate::analysis::filter::FrequencyFilter;
use crate::analysis::spectrum::SpectralAnalyzer;
use crate::audio::{AnalysisChannels, BufferPool};
use crate::config::{Activation, AppConfig};
use crate::engine::backend::{CaptureBackend, CaptureHandle, TimeSource};
use crate::engine::ducking::DuckingCoordinator;
use crate::engine::scheduler::StopHandle;
use crate::error::{log_session_error, log_track_error, SessionError};
use crate::playback::BackgroundTrack;
use crate::telemetry::{SessionEvent, SessionEventKind, TelemetryCollector, TelemetrySnapshot};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Mounted, waiting for the activation condition
    Armed,
    /// Capture graph live, sampling every frame
    Active,
    /// Blow confirmed; sampling has ended
    Detected,
    /// Permission denied or stream failure; detection disabled
    Disabled,
    /// Torn down
    Stopped,
}

/// Outcome of the microphone permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    NotRequested,
    Granted,
    Denied,
}

/// Creates sessions and enforces that only one is live at a time
pub struct SessionManager {
    config: AppConfig,
    backend: Rc<dyn CaptureBackend>,
    track: Rc<dyn BackgroundTrack>,
    clock: Arc<dyn TimeSource>,
    live: Rc<Cell<bool>>,
}

impl SessionManager {
    pub fn new(
        config: AppConfig,
        backend: Rc<dyn CaptureBackend>,
        track: Rc<dyn BackgroundTrack>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            backend,
            track,
            clock,
            live: Rc::new(Cell::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn TimeSource> {
        Arc::clone(&self.clock)
    }

    /// Whether a started session has not yet been torn down
    pub fn is_active(&self) -> bool {
        self.live.get()
    }

    /// Mount a new session.
    ///
    /// Tuning is validated before anything touches the microphone. Background
    /// track failures are logged and ignored. With `Activation::Immediate`
    /// the permission request happens here; a refusal still returns the
    /// session, in the `Disabled` phase.
    ///
    /// # Errors
    /// * `InvalidFilterParameter` / `InvalidTuning` - bad configuration
    /// * `AlreadyActive` - a previous session has not been stopped
    pub fn start(&self, activation: Activation) -> Result<AudioSession, SessionError> {
        if let Err(err) = self.config.validate() {
            log_session_error(&err, "start");
            return Err(err);
        }

        if self.live.get() {
            let err = SessionError::AlreadyActive;
            log_session_error(&err, "start");
            return Err(err);
        }

        if let Err(err) = self.track.play() {
            log_track_error(&err, "background track");
        }

        let mounted_at = self.clock.now();
        let mut session = AudioSession {
            ducking: DuckingCoordinator::new(
                Rc::clone(&self.track),
                self.config.ducking.ducked_volume,
            ),
            config: self.config.clone(),
            activation,
            backend: Rc::clone(&self.backend),
            track: Rc::clone(&self.track),
            live: Rc::clone(&self.live),
            phase: SessionPhase::Armed,
            consent: ConsentState::NotRequested,
            mounted_at,
            last_tick: mounted_at,
            loops_at_mount: self.track.loops_completed(),
            analysis_started_at: None,
            frames_analyzed: 0,
            graph: None,
            classifier: None,
            blown_out: watch::channel(false).0,
            telemetry: Arc::new(TelemetryCollector::default()),
            stop_handle: StopHandle::new(),
            failure: None,
        };
        self.live.set(true);

        log::info!("[Session] Mounted with activation {:?}", activation);
        session.publish(
            mounted_at,
            SessionEventKind::ActivationArmed,
            Some(format!("{:?}", activation)),
        );

        if activation == Activation::Immediate {
            session.activate(mounted_at);
        }
        Ok(session)
    }
}

/// Capture path owned by an active session
struct AudioGraph {
    capture: Box<dyn CaptureHandle>,
    channels: AnalysisChannels,
    filter: FrequencyFilter,
    analyzer: SpectralAnalyzer,
    sample_rate: u32,
}

impl AudioGraph {
    /// Move captured PCM through the filter into the analyzer window
    fn pump(&mut self) -> usize {
        let filter = &mut self.filter;
        let analyzer = &mut self.analyzer;
        self.channels.drain(|buffer| {
            filter.process_in_place(buffer);
            analyzer.push_samples(buffer);
        })
    }
}

/// One mounted blow-detection session
pub struct AudioSession {
    config: AppConfig,
    activation: Activation,
    backend: Rc<dyn CaptureBackend>,
    track: Rc<dyn BackgroundTrack>,
    live: Rc<Cell<bool>>,
    phase: SessionPhase,
    consent: ConsentState,
    mounted_at: Instant,
    /// Most recent frame time, used to stamp teardown events
    last_tick: Instant,
    loops_at_mount: u64,
    analysis_started_at: Option<Instant>,
    frames_analyzed: u64,
    graph: Option<AudioGraph>,
    /// Built together with the graph, never on a denied session
    classifier: Option<BlowClassifier>,
    ducking: DuckingCoordinator,
    blown_out: watch::Sender<bool>,
    telemetry: Arc<TelemetryCollector>,
    stop_handle: StopHandle,
    failure: Option<SessionError>,
}

impl AudioSession {
    /// Advance the session by one display frame.
    ///
    /// While armed this checks the activation condition; while active it runs
    /// one filter → analyzer → classifier pass.
    ///
    /// A stop requested through [`StopHandle`] tears the session down here
    /// even when no scheduler is driving it.
    ///
    /// # Errors
    /// `StaleSampleAccess` when called after detection, disablement or
    /// teardown.
    pub fn step(&mut self, now: Instant) -> Result<SessionPhase, SessionError> {
        if self.stop_handle.is_stop_requested() && self.phase != SessionPhase::Stopped {
            log::info!("[Session] Stop requested through handle, tearing down");
            self.stop();
        }

        match self.phase {
            SessionPhase::Armed => {
                self.last_tick = now;
                if self.activation_due(now) {
                    self.activate(now);
                }
                Ok(self.phase)
            }
            SessionPhase::Active => {
                self.last_tick = now;
                self.analyze(now)
            }
            SessionPhase::Detected | SessionPhase::Disabled | SessionPhase::Stopped => {
                let err = SessionError::StaleSampleAccess {
                    operation: format!("step in {:?} phase", self.phase),
                };
                log::warn!("[Session] {}", err);
                Err(err)
            }
        }
    }

    /// Tear the session down: release the microphone, restore the track.
    /// Safe to call in any phase and more than once.
    pub fn stop(&mut self) {
        if self.phase == SessionPhase::Stopped {
            return;
        }

        let now = self.last_tick;
        let released = self.release_graph();
        if self.ducking.release() {
            self.publish(now, SessionEventKind::Restored, Some("teardown".to_string()));
        }

        let previous = self.phase;
        self.phase = SessionPhase::Stopped;
        self.stop_handle.request_stop();
        self.live.set(false);
        self.publish(now, SessionEventKind::Stopped, Some(format!("from {:?}", previous)));
        log::info!(
            "[Session] Stopped from {:?} (microphone released: {})",
            previous,
            released
        );
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn consent(&self) -> ConsentState {
        self.consent
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Why the session was disabled, if it was
    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub fn is_blown_out(&self) -> bool {
        *self.blown_out.borrow()
    }

    /// Receiver for the `blown_out` flag; it flips false → true at most once
    pub fn subscribe_blown_out(&self) -> watch::Receiver<bool> {
        self.blown_out.subscribe()
    }

    /// `blown_out` as a stream, starting with the current value
    pub fn blown_out_stream(&self) -> WatchStream<bool> {
        WatchStream::new(self.blown_out.subscribe())
    }

    /// Whether the capture graph (and microphone stream) is currently held
    pub fn has_analysis_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Sample rate of the granted capture stream
    pub fn sample_rate(&self) -> Option<u32> {
        self.graph.as_ref().map(|graph| graph.sample_rate)
    }

    /// Whether analysis objects were ever constructed for this session
    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn detection_state(&self) -> DetectionState {
        self.classifier
            .as_ref()
            .map(BlowClassifier::state)
            .unwrap_or_else(DetectionState::waiting)
    }

    /// Sub-band RMS seen on the most recent analysis frame
    pub fn last_rms(&self) -> f32 {
        self.classifier
            .as_ref()
            .map_or(0.0, BlowClassifier::last_rms)
    }

    pub fn detected_at(&self) -> Option<Instant> {
        self.classifier
            .as_ref()
            .and_then(BlowClassifier::detected_at)
    }

    pub fn mounted_at(&self) -> Instant {
        self.mounted_at
    }

    pub fn analysis_started_at(&self) -> Option<Instant> {
        self.analysis_started_at
    }

    /// Time from mount to detection
    pub fn detected_after_mount(&self) -> Option<Duration> {
        self.detected_at()
            .map(|at| at.saturating_duration_since(self.mounted_at))
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn activation_due(&self, now: Instant) -> bool {
        match self.activation {
            Activation::Immediate => true,
            Activation::AfterDelay { delay_ms } => {
                now.saturating_duration_since(self.mounted_at) >= Duration::from_millis(delay_ms)
            }
            Activation::AfterTrackLoop => self.track.loops_completed() > self.loops_at_mount,
        }
    }

    /// Request the microphone and build the capture graph
    fn activate(&mut self, now: Instant) {
        let audio = &self.config.audio;
        let (capture, analysis) =
            BufferPool::new(audio.buffer_pool_size, audio.buffer_size).split_for_threads();

        log::info!("[Session] Activation condition met, requesting microphone");
        let stream = match self.backend.request_stream(capture) {
            Ok(stream) => stream,
            Err(err) => {
                if err == SessionError::PermissionDenied {
                    self.consent = ConsentState::Denied;
                    log::warn!("[Session] Microphone permission denied; detection disabled");
                    self.publish(now, SessionEventKind::PermissionDenied, None);
                } else {
                    log_session_error(&err, "request_stream");
                }
                self.disable(err);
                return;
            }
        };
        self.consent = ConsentState::Granted;

        let mut capture_handle = stream.handle;
        // Teardown requested while the prompt was open: release right away
        if self.stop_handle.is_stop_requested() {
            capture_handle.close();
            self.stop();
            return;
        }

        self.publish(
            now,
            SessionEventKind::PermissionGranted,
            Some(format!("{} Hz", stream.sample_rate)),
        );

        let built = FrequencyFilter::apply(&self.config.filter, stream.sample_rate).and_then(
            |filter| SpectralAnalyzer::new(&self.config.analyzer).map(|analyzer| (filter, analyzer)),
        );
        let (filter, analyzer) = match built {
            Ok(parts) => parts,
            Err(err) => {
                capture_handle.close();
                log_session_error(&err, "build graph");
                self.disable(err);
                return;
            }
        };

        self.graph = Some(AudioGraph {
            capture: capture_handle,
            channels: analysis,
            filter,
            analyzer,
            sample_rate: stream.sample_rate,
        });
        self.classifier = Some(BlowClassifier::from_config(&self.config.detector));
        self.phase = SessionPhase::Active;
        self.analysis_started_at = Some(now);
        self.publish(
            now,
            SessionEventKind::AnalysisStarted,
            Some(format!("filter={:?}", self.config.filter)),
        );
        tracing::info!("[Session] Analysis started at {} Hz", stream.sample_rate);

        if self.ducking.on_analysis_start() {
            let detail = format!("{:.2}", self.ducking.ducked_volume());
            self.publish(now, SessionEventKind::Ducked, Some(detail));
        }
    }

    fn analyze(&mut self, now: Instant) -> Result<SessionPhase, SessionError> {
        let (Some(graph), Some(classifier)) = (self.graph.as_mut(), self.classifier.as_mut())
        else {
            return Err(SessionError::StaleSampleAccess {
                operation: "analyze without capture graph".to_string(),
            });
        };

        graph.pump();
        let frame = graph.analyzer.sample();
        let previous = classifier.state().status;
        let state = classifier.tick(frame, now);
        let rms = classifier.last_rms();
        self.frames_analyzed += 1;

        match (previous, state.status) {
            (DetectionStatus::Waiting, DetectionStatus::Sustaining) => {
                self.publish(now, SessionEventKind::SustainStarted, Some(format!("rms={:.1}", rms)));
            }
            (DetectionStatus::Sustaining, DetectionStatus::Waiting) => {
                self.publish(now, SessionEventKind::SustainReset, Some(format!("rms={:.1}", rms)));
            }
            (_, DetectionStatus::Detected) => self.on_detected(now, rms),
            _ => {}
        }

        Ok(self.phase)
    }

    fn on_detected(&mut self, now: Instant, rms: f32) {
        self.phase = SessionPhase::Detected;
        self.blown_out.send_replace(true);

        self.publish(now, SessionEventKind::Detected, Some(format!("rms={:.1}", rms)));
        if self.ducking.on_detected() {
            self.publish(now, SessionEventKind::Restored, Some("detection".to_string()));
        }
    }

    fn disable(&mut self, err: SessionError) {
        self.phase = SessionPhase::Disabled;
        self.failure = Some(err);
    }

    fn release_graph(&mut self) -> bool {
        match self.graph.take() {
            Some(mut graph) => {
                graph.capture.close();
                true
            }
            None => false,
        }
    }

    fn publish(&self, now: Instant, kind: SessionEventKind, detail: Option<String>) {
        let timestamp_ms = now.saturating_duration_since(self.mounted_at).as_millis() as u64;
        let mut event = SessionEvent::new(timestamp_ms, kind);
        event.detail = detail;
        self.telemetry.publish(event);
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
