//! Configuration management for blow detection tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration on thresholds and filter settings without
//! recompilation. Named presets cover the parameterizations observed in
//! practice: they differ only in filter kind, sub-band, threshold, ducking
//! level and activation policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::filter::FilterConfig;
use crate::analysis::frame::SubBandWindow;
use crate::analysis::spectrum::{MAX_FFT_SIZE, MIN_FFT_SIZE};
use crate::error::SessionError;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub ducking: DuckingConfig,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Blow classifier tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Sub-band RMS must exceed this value (0-255 byte scale)
    pub threshold: f32,
    /// Continuous above-threshold time required before detection
    pub required_duration_ms: u64,
    /// Bins considered blow-relevant
    pub sub_band: SubBandWindow,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            required_duration_ms: 1000,
            sub_band: SubBandWindow::default(),
        }
    }
}

/// Spectral analyzer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Transform window in samples (power of two)
    pub fft_size: usize,
    /// Weight of the previous frame in the per-bin average, in [0, 1)
    pub smoothing_time_constant: f32,
    /// Magnitude mapped to byte 0
    pub min_decibels: f32,
    /// Magnitude mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(invalid(
                "analyzer.fft_size",
                format!(
                    "must be a power of two in {}..={} (got {})",
                    MIN_FFT_SIZE, MAX_FFT_SIZE, self.fft_size
                ),
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(invalid(
                "analyzer.smoothing_time_constant",
                format!("must be in [0, 1) (got {})", self.smoothing_time_constant),
            ));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(invalid(
                "analyzer.min_decibels",
                format!(
                    "must be below max_decibels ({} >= {})",
                    self.min_decibels, self.max_decibels
                ),
            ));
        }
        Ok(())
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Background track ducking level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuckingConfig {
    /// Track volume while the microphone is analyzed (fraction of full scale)
    pub ducked_volume: f32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self { ducked_volume: 0.2 }
    }
}

/// When analysis starts relative to mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Activation {
    /// As soon as the session starts
    Immediate,
    /// After a fixed wall-clock delay, letting start-up noise settle
    AfterDelay { delay_ms: u64 },
    /// Once the background track finishes its first cycle
    AfterTrackLoop,
}

impl Default for Activation {
    fn default() -> Self {
        Activation::AfterDelay { delay_ms: 3000 }
    }
}

impl Activation {
    pub fn delay(&self) -> Option<Duration> {
        match *self {
            Activation::AfterDelay { delay_ms } => Some(Duration::from_millis(delay_ms)),
            _ => None,
        }
    }
}

impl FromStr for Activation {
    type Err = String;

    /// Parses `immediate`, `track-loop` or `delay:<ms>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Activation::Immediate),
            "track-loop" | "after-track-loop" => Ok(Activation::AfterTrackLoop),
            other => {
                let ms = other
                    .strip_prefix("delay:")
                    .ok_or_else(|| format!("unknown activation '{}'", other))?;
                let delay_ms = ms
                    .parse::<u64>()
                    .map_err(|err| format!("invalid delay '{}': {}", ms, err))?;
                Ok(Activation::AfterDelay { delay_ms })
            }
        }
    }
}

/// Sampling cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Display refresh rate driving the analyzer
    pub frame_rate_hz: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
        }
    }
}

/// Accepted display refresh rates in Hz
pub const FRAME_RATE_RANGE: std::ops::RangeInclusive<f32> = 1.0..=1000.0;

impl SchedulerConfig {
    /// Time between analysis frames.
    ///
    /// # Errors
    /// `InvalidTuning` when the rate is outside [`FRAME_RATE_RANGE`].
    pub fn frame_period(&self) -> Result<Duration, SessionError> {
        if !FRAME_RATE_RANGE.contains(&self.frame_rate_hz) {
            return Err(invalid(
                "scheduler.frame_rate_hz",
                format!(
                    "must be within {}..={} (got {})",
                    FRAME_RATE_RANGE.start(),
                    FRAME_RATE_RANGE.end(),
                    self.frame_rate_hz
                ),
            ));
        }
        Duration::try_from_secs_f32(1.0 / self.frame_rate_hz).map_err(|err| {
            invalid("scheduler.frame_rate_hz", err.to_string())
        })
    }
}

/// Capture buffer pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Number of buffers circulating between capture and analysis
    pub buffer_pool_size: usize,
    /// Capacity of each buffer in mono samples
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 32,
            buffer_size: 2048,
        }
    }
}

impl Default for AppConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Preset::Classic.config()
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/blow_config.json")
    }

    /// Check every tuning value before a session requests the microphone.
    ///
    /// # Errors
    /// * `InvalidFilterParameter` - non-positive cutoff/center/Q
    /// * `InvalidTuning` - anything else out of range
    pub fn validate(&self) -> Result<(), SessionError> {
        self.filter.validate()?;
        self.analyzer.validate()?;
        self.detector.sub_band.validate(self.analyzer.bin_count())?;

        if !(0.0..=255.0).contains(&self.detector.threshold) {
            return Err(invalid(
                "detector.threshold",
                format!("must be within 0..=255 (got {})", self.detector.threshold),
            ));
        }
        if !(0.0..=1.0).contains(&self.ducking.ducked_volume) {
            return Err(invalid(
                "ducking.ducked_volume",
                format!("must be within [0, 1] (got {})", self.ducking.ducked_volume),
            ));
        }
        self.scheduler.frame_period()?;
        if self.audio.buffer_pool_size == 0 || self.audio.buffer_size == 0 {
            return Err(invalid(
                "audio",
                "buffer_pool_size and buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> SessionError {
    SessionError::InvalidTuning {
        field: field.to_string(),
        reason,
    }
}

/// Named tunings of the one detector design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Unfiltered, lowest 50 bins, T=50, 3s start delay, no ducking
    Classic,
    /// High-pass at 300 Hz, lowest 20 bins, T=55, starts after the first track loop
    Highpass,
    /// Band-pass around 500 Hz, middle slice, T=60, 2s start delay
    Bandpass,
    /// Unfiltered, lowest 20 bins, T=60, immediate start
    Instant,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Classic,
        Preset::Highpass,
        Preset::Bandpass,
        Preset::Instant,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Classic => "classic",
            Preset::Highpass => "highpass",
            Preset::Bandpass => "bandpass",
            Preset::Instant => "instant",
        }
    }

    pub fn config(&self) -> AppConfig {
        let base = AppConfig {
            detector: DetectorConfig::default(),
            filter: FilterConfig::None,
            analyzer: AnalyzerConfig::default(),
            ducking: DuckingConfig::default(),
            activation: Activation::default(),
            scheduler: SchedulerConfig::default(),
            audio: AudioConfig::default(),
        };

        match self {
            Preset::Classic => AppConfig {
                ducking: DuckingConfig { ducked_volume: 1.0 },
                ..base
            },
            Preset::Highpass => AppConfig {
                detector: DetectorConfig {
                    threshold: 55.0,
                    required_duration_ms: 1000,
                    sub_band: SubBandWindow::new(0, 20),
                },
                filter: FilterConfig::Highpass { cutoff_hz: 300.0 },
                ducking: DuckingConfig { ducked_volume: 0.2 },
                activation: Activation::AfterTrackLoop,
                ..base
            },
            Preset::Bandpass => AppConfig {
                detector: DetectorConfig {
                    threshold: 60.0,
                    required_duration_ms: 1000,
                    sub_band: SubBandWindow::new(5, 25),
                },
                filter: FilterConfig::Bandpass {
                    center_hz: 500.0,
                    q: 1.0,
                },
                ducking: DuckingConfig { ducked_volume: 0.1 },
                activation: Activation::AfterDelay { delay_ms: 2000 },
                ..base
            },
            Preset::Instant => AppConfig {
                detector: DetectorConfig {
                    threshold: 60.0,
                    required_duration_ms: 1000,
                    sub_band: SubBandWindow::new(0, 20),
                },
                ducking: DuckingConfig { ducked_volume: 0.2 },
                activation: Activation::Immediate,
                ..base
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .iter()
            .copied()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| format!("unknown preset '{}'", s))
    }
}
