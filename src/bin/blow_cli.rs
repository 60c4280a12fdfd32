use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use blow_detector::audio::read_wav_mono;
use blow_detector::config::{Activation, AppConfig, Preset};
use blow_detector::engine::{
    FixtureCaptureBackend, ManualClock, SamplingScheduler, ScheduleOutcome, SessionManager,
    SessionPhase,
};
use blow_detector::playback::StubTrack;
use blow_detector::telemetry::SessionEvent;
use blow_detector::testing::FixturePlayback;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "blow_cli",
    about = "Sustained-blow detection harness: offline WAV fixtures and live microphone"
)]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TuningArgs {
    /// Named tuning preset
    #[arg(long, conflicts_with = "config")]
    preset: Option<Preset>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Activation override: immediate, track-loop or delay:<ms>
    #[arg(long)]
    activation: Option<Activation>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a WAV recording through the full pipeline and print a JSON report
    Detect {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Keep sampling this long after the recording ends (silence)
        #[arg(long, default_value_t = 500)]
        tail_ms: u64,
        /// Simulated background track loop length, for track-loop activation
        #[arg(long, default_value_t = 4000)]
        track_loop_ms: u64,
        /// Exit with code 2 unless the outcome matches
        #[arg(long)]
        expect: Option<Expectation>,
        /// Also write the report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Listen on the default microphone until a blow or the timeout
    Live {
        #[command(flatten)]
        tuning: TuningArgs,
        /// Looping background track (WAV)
        #[arg(long)]
        track: Option<PathBuf>,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Print every preset's configuration as JSON
    Presets,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Expectation {
    Detected,
    Silent,
}

#[derive(Serialize)]
struct DetectReport {
    input: String,
    preset: Option<String>,
    sample_rate: u32,
    duration_ms: u64,
    activation: Activation,
    outcome: String,
    detected: bool,
    /// Milliseconds from session mount to detection
    detected_at_ms: Option<u64>,
    frames_analyzed: u64,
    final_phase: SessionPhase,
    events: Vec<SessionEvent>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    blow_detector::init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Detect {
            input,
            tuning,
            tail_ms,
            track_loop_ms,
            expect,
            output,
        } => run_detect(&input, &tuning, tail_ms, track_loop_ms, expect, output),
        Commands::Live {
            tuning,
            track,
            timeout_secs,
        } => run_live(&tuning, track, timeout_secs),
        Commands::Presets => run_presets(),
    }
}

fn resolve_config(tuning: &TuningArgs) -> Result<(AppConfig, Activation)> {
    let config = match (&tuning.preset, &tuning.config) {
        (Some(preset), _) => preset.config(),
        (None, Some(path)) => AppConfig::load_from_file(path),
        (None, None) => AppConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    let activation = tuning.activation.unwrap_or(config.activation);
    Ok((config, activation))
}

fn run_detect(
    input: &Path,
    tuning: &TuningArgs,
    tail_ms: u64,
    track_loop_ms: u64,
    expect: Option<Expectation>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let (config, activation) = resolve_config(tuning)?;
    let clip = read_wav_mono(input).with_context(|| format!("reading {}", input.display()))?;
    let duration_ms = (clip.duration_secs() * 1000.0).round() as u64;
    let sample_rate = clip.sample_rate;

    let clock = Arc::new(ManualClock::new());
    let backend = FixtureCaptureBackend::granted(sample_rate);
    let track = Rc::new(StubTrack::with_loop_length(
        Duration::from_millis(track_loop_ms),
        clock.clone(),
    ));
    let period = config.scheduler.frame_period()?;
    let manager = SessionManager::new(config, Rc::new(backend.clone()), track, clock.clone());

    let mut session = manager
        .start(activation)
        .context("starting detection session")?;
    let mut playback = FixturePlayback::new(backend, clock, period, clip.samples)
        .with_tail(Duration::from_millis(tail_ms));
    let outcome = SamplingScheduler::new()
        .run(&mut session, &mut playback)
        .context("sampling fixture")?;

    let detected = matches!(outcome, ScheduleOutcome::Detected { .. });
    let detected_at_ms = session
        .detected_after_mount()
        .map(|after| after.as_millis() as u64);
    let frames_analyzed = session.frames_analyzed();
    let final_phase = session.phase();
    session.stop();

    let report = DetectReport {
        input: input.display().to_string(),
        preset: tuning.preset.map(|preset| preset.name().to_string()),
        sample_rate,
        duration_ms,
        activation,
        outcome: describe_outcome(&outcome),
        detected,
        detected_at_ms,
        frames_analyzed,
        final_phase,
        events: session.telemetry_snapshot().recent,
    };

    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    if let Some(path) = output {
        fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
    }

    match expect {
        Some(Expectation::Detected) if !detected => {
            eprintln!("expected a blow, none detected");
            Ok(ExitCode::from(2))
        }
        Some(Expectation::Silent) if detected => {
            eprintln!("expected no blow, detected at {:?} ms", detected_at_ms);
            Ok(ExitCode::from(2))
        }
        _ => Ok(ExitCode::from(0)),
    }
}

fn describe_outcome(outcome: &ScheduleOutcome) -> String {
    match outcome {
        ScheduleOutcome::Detected { .. } => "detected".to_string(),
        ScheduleOutcome::Disabled(err) => format!("disabled: {}", err),
        ScheduleOutcome::Stopped => "stopped".to_string(),
        ScheduleOutcome::TicksExhausted => "ticks_exhausted".to_string(),
    }
}

#[cfg(not(target_os = "android"))]
fn run_live(tuning: &TuningArgs, track_path: Option<PathBuf>, timeout_secs: u64) -> Result<ExitCode> {
    use blow_detector::engine::{CpalCaptureBackend, IntervalTickSource, SystemTimeSource};
    use blow_detector::error::log_track_error;
    use blow_detector::playback::{BackgroundTrack, CpalTrackPlayer, SilentTrack};

    let (config, activation) = resolve_config(tuning)?;

    let track: Rc<dyn BackgroundTrack> = match track_path {
        Some(path) => match CpalTrackPlayer::from_wav(&path) {
            Ok(player) => Rc::new(player),
            Err(err) => {
                log_track_error(&err, "loading background track");
                Rc::new(SilentTrack::new())
            }
        },
        None => Rc::new(SilentTrack::new()),
    };

    let period = config.scheduler.frame_period()?;
    let manager = SessionManager::new(
        config,
        Rc::new(CpalCaptureBackend::new()),
        track,
        Arc::new(SystemTimeSource::default()),
    );
    let mut session = manager
        .start(activation)
        .context("starting live session")?;

    let mut events = session.telemetry().subscribe();
    let printer = std::thread::spawn(move || loop {
        match events.blocking_recv() {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(err) => log::warn!("[blow_cli] Failed to encode event: {}", err),
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("[blow_cli] Event printer skipped {} events", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    });

    let stop = session.stop_handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(timeout_secs));
        stop.request_stop();
    });

    let mut ticks = IntervalTickSource::new(period);
    let outcome = SamplingScheduler::new()
        .run(&mut session, &mut ticks)
        .context("sampling microphone")?;
    let detected = matches!(outcome, ScheduleOutcome::Detected { .. });
    let summary = serde_json::json!({
        "outcome": describe_outcome(&outcome),
        "detected": detected,
        "detected_at_ms": session.detected_after_mount().map(|d| d.as_millis() as u64),
        "frames_analyzed": session.frames_analyzed(),
    });
    drop(session);
    join_event_printer(printer);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(if detected { 0 } else { 3 }))
}

/// Wait for the event printer; returns false if it panicked
#[cfg(not(target_os = "android"))]
fn join_event_printer(printer: std::thread::JoinHandle<()>) -> bool {
    match printer.join() {
        Ok(()) => true,
        Err(_) => {
            log::warn!("[blow_cli] Event printer thread panicked");
            false
        }
    }
}

#[cfg(target_os = "android")]
fn run_live(_: &TuningArgs, _: Option<PathBuf>, _: u64) -> Result<ExitCode> {
    anyhow::bail!("live capture is not available on this platform")
}

fn run_presets() -> Result<ExitCode> {
    let presets: serde_json::Map<String, serde_json::Value> = Preset::ALL
        .iter()
        .map(|preset| Ok((preset.name().to_string(), serde_json::to_value(preset.config())?)))
        .collect::<Result<_, serde_json::Error>>()?;
    println!("{}", serde_json::to_string_pretty(&presets)?);
    Ok(ExitCode::from(0))
}

#[cfg(all(test, not(target_os = "android")))]
mod tests {
    use super::*;

    #[test]
    fn test_printer_panic_is_reported() {
        let printer = std::thread::spawn(|| panic!("encoder blew up"));
        assert!(!join_event_printer(printer));
    }

    #[test]
    fn test_printer_clean_exit() {
        let printer = std::thread::spawn(|| {});
        assert!(join_event_printer(printer));
    }
}
