use super::*;
use crate::analysis::filter::FilterConfig;
use crate::config::Preset;
use crate::engine::backend::{FixtureCaptureBackend, ManualClock};
use crate::engine::scheduler::{ManualTickSource, SamplingScheduler, ScheduleOutcome};
use crate::playback::StubTrack;
use crate::testing::{signals, FixturePlayback};

/// One display refresh at 60 Hz
const FRAME: Duration = Duration::from_nanos(16_666_667);
const RATE: u32 = 48_000;

struct Harness {
    clock: Arc<ManualClock>,
    backend: FixtureCaptureBackend,
    track: Rc<StubTrack>,
    manager: SessionManager,
}

fn harness_with(config: AppConfig, backend: FixtureCaptureBackend, track: StubTrack) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let track = Rc::new(track);
    let manager = SessionManager::new(
        config,
        Rc::new(backend.clone()),
        track.clone(),
        clock.clone(),
    );
    Harness {
        clock,
        backend,
        track,
        manager,
    }
}

fn harness(config: AppConfig, backend: FixtureCaptureBackend) -> Harness {
    harness_with(config, backend, StubTrack::new())
}

impl Harness {
    fn playback(&self, pcm: Vec<f32>) -> FixturePlayback {
        FixturePlayback::new(self.backend.clone(), self.clock.clone(), FRAME, pcm)
    }

    fn advance(&self, by: Duration) -> Instant {
        self.clock.advance(by)
    }
}

#[test]
fn test_permission_denied_disables_detection() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::denied());

    let mut session = h.manager.start(Activation::Immediate).unwrap();
    assert_eq!(session.phase(), SessionPhase::Disabled);
    assert_eq!(session.consent(), ConsentState::Denied);
    assert_eq!(session.failure(), Some(&SessionError::PermissionDenied));
    assert!(!session.has_analysis_graph());
    assert!(!session.has_classifier());
    assert!(!session.is_blown_out());
    assert_eq!(h.backend.requests(), 1);
    assert!(h.track.volume_history().is_empty(), "no ducking without analysis");

    let mut ticks = ManualTickSource::new(h.clock.clone(), FRAME).with_limit(120);
    let outcome = SamplingScheduler::new().run(&mut session, &mut ticks).unwrap();
    assert_eq!(outcome, ScheduleOutcome::Disabled(SessionError::PermissionDenied));
    assert_eq!(ticks.issued(), 0);
    assert!(!session.is_blown_out());

    let telemetry = session.telemetry_snapshot();
    assert_eq!(telemetry.count(SessionEventKind::PermissionDenied), 1);
    assert_eq!(telemetry.count(SessionEventKind::AnalysisStarted), 0);
}

#[test]
fn test_step_after_disable_is_stale_access() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::denied());
    let mut session = h.manager.start(Activation::Immediate).unwrap();

    let err = session.step(h.advance(FRAME)).unwrap_err();
    assert!(matches!(err, SessionError::StaleSampleAccess { .. }));
}

#[test]
fn test_teardown_before_activation_never_requests_microphone() {
    let h = harness(Preset::Classic.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h
        .manager
        .start(Activation::AfterDelay { delay_ms: 3000 })
        .unwrap();

    assert_eq!(session.step(h.advance(Duration::from_secs(1))).unwrap(), SessionPhase::Armed);
    session.stop();

    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert_eq!(session.consent(), ConsentState::NotRequested);
    assert_eq!(h.backend.requests(), 0);
    assert!(!h.manager.is_active());
    assert!(session.failure().is_none());
}

#[test]
fn test_delay_activation_waits_for_deadline() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h
        .manager
        .start(Activation::AfterDelay { delay_ms: 3000 })
        .unwrap();

    assert_eq!(session.step(h.advance(Duration::from_millis(2999))).unwrap(), SessionPhase::Armed);
    assert_eq!(h.backend.requests(), 0);

    assert_eq!(session.step(h.advance(Duration::from_millis(1))).unwrap(), SessionPhase::Active);
    assert_eq!(h.backend.requests(), 1);
    assert_eq!(session.consent(), ConsentState::Granted);
    assert_eq!(session.sample_rate(), Some(RATE));
    assert!((h.track.volume() - 0.2).abs() < 1e-6);
}

#[test]
fn test_track_loop_activation() {
    let h = harness(Preset::Highpass.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::AfterTrackLoop).unwrap();
    assert_eq!(h.track.play_calls(), 1);

    for _ in 0..10 {
        assert_eq!(session.step(h.advance(FRAME)).unwrap(), SessionPhase::Armed);
    }
    h.track.finish_loop();
    assert_eq!(session.step(h.advance(FRAME)).unwrap(), SessionPhase::Active);
    assert!(session.has_analysis_graph());
}

#[test]
fn test_sustained_noise_is_detected_after_required_duration() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    assert_eq!(session.phase(), SessionPhase::Active);

    let pcm = signals::white_noise(42, 0.5, signals::samples_for(1500, RATE));
    let mut playback = h.playback(pcm);
    let outcome = SamplingScheduler::new().run(&mut session, &mut playback).unwrap();

    let ScheduleOutcome::Detected { at } = outcome else {
        panic!("expected detection, got {:?}", outcome);
    };
    let after = at - session.mounted_at();
    assert!(after >= Duration::from_millis(1000), "too early: {:?}", after);
    assert!(after <= Duration::from_millis(1100), "too late: {:?}", after);
    assert!(session.is_blown_out());
    assert_eq!(session.phase(), SessionPhase::Detected);

    // Sampling ended with the detecting frame
    assert_eq!(playback.frames(), session.frames_analyzed());
    assert!(playback.frames() < 80);
    assert!(matches!(
        session.step(h.advance(FRAME)),
        Err(SessionError::StaleSampleAccess { .. })
    ));

    assert_eq!(h.track.volume_history(), vec![0.2, 1.0]);
    let telemetry = session.telemetry_snapshot();
    assert_eq!(telemetry.count(SessionEventKind::Detected), 1);
    assert_eq!(telemetry.count(SessionEventKind::Restored), 1);
}

#[test]
fn test_short_burst_is_not_a_blow() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();

    let pcm = signals::blow_fixture(RATE, 0, 200, 1500, 0.5, 3);
    let mut playback = h.playback(pcm);
    let outcome = SamplingScheduler::new().run(&mut session, &mut playback).unwrap();

    assert_eq!(outcome, ScheduleOutcome::TicksExhausted);
    assert!(!session.is_blown_out());
    assert_eq!(session.phase(), SessionPhase::Active);

    let telemetry = session.telemetry_snapshot();
    assert_eq!(telemetry.count(SessionEventKind::SustainStarted), 1);
    assert_eq!(telemetry.count(SessionEventKind::SustainReset), 1);
    assert_eq!(telemetry.count(SessionEventKind::Detected), 0);
    assert_eq!(h.track.volume_history(), vec![0.2], "still ducked while listening");
}

#[test]
fn test_sound_before_activation_is_ignored() {
    let h = harness(Preset::Classic.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h
        .manager
        .start(Activation::AfterDelay { delay_ms: 3000 })
        .unwrap();

    // Noise from mount onwards; only the part after the microphone opens counts
    let pcm = signals::white_noise(9, 0.5, signals::samples_for(5000, RATE));
    let mut playback = h.playback(pcm);
    let outcome = SamplingScheduler::new().run(&mut session, &mut playback).unwrap();

    assert!(matches!(outcome, ScheduleOutcome::Detected { .. }));
    let after = session.detected_after_mount().unwrap();
    assert!(after >= Duration::from_millis(4000), "counted pre-activation sound: {:?}", after);
    assert!(after <= Duration::from_millis(4100));
    assert!(h.backend.dropped_samples() == 0);
}

#[test]
fn test_second_start_while_live_is_rejected() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut first = h.manager.start(Activation::Immediate).unwrap();

    assert!(matches!(
        h.manager.start(Activation::Immediate),
        Err(SessionError::AlreadyActive)
    ));

    first.stop();
    assert!(!h.manager.is_active());
    let second = h.manager.start(Activation::Immediate).unwrap();
    assert_eq!(second.phase(), SessionPhase::Active);
    assert_eq!(h.backend.requests(), 2);
}

#[test]
fn test_invalid_filter_fails_before_microphone_request() {
    let mut config = Preset::Instant.config();
    config.filter = FilterConfig::Highpass { cutoff_hz: -300.0 };
    let h = harness(config, FixtureCaptureBackend::granted(RATE));

    let result = h.manager.start(Activation::Immediate);
    assert!(matches!(
        result,
        Err(SessionError::InvalidFilterParameter { .. })
    ));
    assert_eq!(h.backend.requests(), 0);
    assert_eq!(h.track.play_calls(), 0);
    assert!(!h.manager.is_active());
}

#[test]
fn test_filter_above_nyquist_disables_and_releases_stream() {
    let mut config = Preset::Instant.config();
    config.filter = FilterConfig::Highpass { cutoff_hz: 30_000.0 };
    let h = harness(config, FixtureCaptureBackend::granted(RATE));

    let session = h.manager.start(Activation::Immediate).unwrap();
    assert_eq!(session.phase(), SessionPhase::Disabled);
    assert!(matches!(
        session.failure(),
        Some(SessionError::InvalidFilterParameter { .. })
    ));
    assert!(!session.has_analysis_graph());
    assert!(!h.backend.is_streaming());
}

#[test]
fn test_stop_requested_before_run() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    assert!(h.backend.is_streaming());

    session.stop_handle().request_stop();
    let mut ticks = ManualTickSource::new(h.clock.clone(), FRAME).with_limit(10);
    let outcome = SamplingScheduler::new().run(&mut session, &mut ticks).unwrap();

    assert_eq!(outcome, ScheduleOutcome::Stopped);
    assert_eq!(ticks.issued(), 0);
    assert_eq!(session.frames_analyzed(), 0);
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert!(!h.backend.is_streaming());
}

#[test]
fn test_stop_restores_ducked_track_once() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    session.step(h.advance(FRAME)).unwrap();

    session.stop();
    session.stop();
    assert_eq!(h.track.volume_history(), vec![0.2, 1.0]);
    assert!(!session.has_analysis_graph());
    assert!(!session.is_blown_out());
    assert_eq!(
        session.telemetry_snapshot().count(SessionEventKind::Stopped),
        1
    );
}

#[test]
fn test_failing_track_does_not_block_detection() {
    let h = harness_with(
        Preset::Instant.config(),
        FixtureCaptureBackend::granted(RATE),
        StubTrack::failing(),
    );
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    assert_eq!(session.phase(), SessionPhase::Active);

    let pcm = signals::white_noise(5, 0.5, signals::samples_for(1500, RATE));
    let mut playback = h.playback(pcm);
    let outcome = SamplingScheduler::new().run(&mut session, &mut playback).unwrap();
    assert!(matches!(outcome, ScheduleOutcome::Detected { .. }));
}

#[test]
fn test_dropping_session_releases_everything() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let session = h.manager.start(Activation::Immediate).unwrap();
    assert!(h.manager.is_active());

    drop(session);
    assert!(!h.manager.is_active());
    assert!(!h.backend.is_streaming());
    assert_eq!(h.track.volume(), 1.0);
}

#[test]
fn test_blown_out_receiver_sees_single_transition() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    let mut blown_out = session.subscribe_blown_out();
    assert!(!*blown_out.borrow_and_update());

    let pcm = signals::white_noise(11, 0.5, signals::samples_for(1500, RATE));
    let mut playback = h.playback(pcm);
    SamplingScheduler::new().run(&mut session, &mut playback).unwrap();

    assert!(blown_out.has_changed().unwrap());
    assert!(*blown_out.borrow_and_update());
    session.stop();
    assert!(*blown_out.borrow(), "teardown does not clear the flag");
}

#[test]
fn test_stop_handle_ends_directly_driven_session() {
    let h = harness(Preset::Instant.config(), FixtureCaptureBackend::granted(RATE));
    let mut session = h.manager.start(Activation::Immediate).unwrap();
    let noise = signals::white_noise(5, 0.5, signals::samples_for(100, RATE));

    h.backend.feed(&noise[..800]);
    assert_eq!(session.step(h.advance(FRAME)).unwrap(), SessionPhase::Active);
    assert_eq!(session.frames_analyzed(), 1);

    session.stop_handle().request_stop();
    h.backend.feed(&noise[800..1600]);
    let err = session.step(h.advance(FRAME)).unwrap_err();

    assert!(matches!(err, SessionError::StaleSampleAccess { .. }));
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert_eq!(session.frames_analyzed(), 1, "no analysis after the stop request");
    assert!(!session.has_analysis_graph());
    assert!(!h.backend.is_streaming());
    assert!(!h.manager.is_active());
    assert_eq!(h.track.volume_history(), vec![0.2, 1.0]);
    assert_eq!(session.telemetry_snapshot().count(SessionEventKind::Stopped), 1);
}
