// Filter module - optional signal conditioning ahead of spectral analysis
//
// Background music concentrates its energy in bass and melody bands. A
// high-pass stage suppresses content below the cutoff; a band-pass stage
// isolates the broadband airflow signature of a blow around its center.
//
// Coefficients follow the RBJ audio-EQ cookbook and are evaluated in
// transposed direct form II.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::SessionError;

/// Butterworth Q used for the high-pass stage
const HIGHPASS_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Conditioning stage configuration, fixed for a session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Pass the microphone signal through unchanged
    #[default]
    None,
    /// Attenuate energy below `cutoff_hz`
    Highpass { cutoff_hz: f32 },
    /// Keep a band centered at `center_hz` with selectivity `q`
    Bandpass { center_hz: f32, q: f32 },
}

impl FilterConfig {
    /// Reject non-positive or non-finite parameters.
    ///
    /// Runs at session construction, before any capture stream is requested.
    pub fn validate(&self) -> Result<(), SessionError> {
        match *self {
            FilterConfig::None => Ok(()),
            FilterConfig::Highpass { cutoff_hz } => require_positive("cutoff_hz", cutoff_hz),
            FilterConfig::Bandpass { center_hz, q } => {
                require_positive("center_hz", center_hz)?;
                require_positive("q", q)
            }
        }
    }

    /// Corner/center frequency of the stage, if any
    pub fn frequency_hz(&self) -> Option<f32> {
        match *self {
            FilterConfig::None => None,
            FilterConfig::Highpass { cutoff_hz } => Some(cutoff_hz),
            FilterConfig::Bandpass { center_hz, .. } => Some(center_hz),
        }
    }
}

fn require_positive(parameter: &str, value: f32) -> Result<(), SessionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SessionError::InvalidFilterParameter {
            parameter: parameter.to_string(),
            value,
        })
    }
}

/// Second-order IIR section
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn highpass(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        Self::normalized(b0, b1, b2, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Band-pass with constant 0 dB peak gain
    pub fn bandpass(center_hz: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Conditioning stage placed between the capture source and the analyzer.
#[derive(Debug, Clone)]
pub enum FrequencyFilter {
    Passthrough,
    Biquad(Biquad),
}

impl FrequencyFilter {
    /// Build the stage for `config` against the capture sample rate.
    ///
    /// Besides the sign checks of [`FilterConfig::validate`], the stage
    /// frequency must sit below Nyquist for the actual device rate.
    pub fn apply(config: &FilterConfig, sample_rate: u32) -> Result<Self, SessionError> {
        config.validate()?;

        if let Some(freq) = config.frequency_hz() {
            let nyquist = sample_rate as f32 / 2.0;
            if freq >= nyquist {
                return Err(SessionError::InvalidFilterParameter {
                    parameter: "frequency_hz".to_string(),
                    value: freq,
                });
            }
        }

        let sr = sample_rate as f32;
        Ok(match *config {
            FilterConfig::None => FrequencyFilter::Passthrough,
            FilterConfig::Highpass { cutoff_hz } => {
                FrequencyFilter::Biquad(Biquad::highpass(cutoff_hz, HIGHPASS_Q, sr))
            }
            FilterConfig::Bandpass { center_hz, q } => {
                FrequencyFilter::Biquad(Biquad::bandpass(center_hz, q, sr))
            }
        })
    }

    /// Filter a block of mono samples in place
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        match self {
            FrequencyFilter::Passthrough => {}
            FrequencyFilter::Biquad(biquad) => {
                for sample in samples.iter_mut() {
                    *sample = biquad.process(*sample);
                }
            }
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, FrequencyFilter::Passthrough)
    }
}
