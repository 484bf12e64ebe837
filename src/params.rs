//! Ensemble Parameters
//!
//! The control surface of the ensemble in engineering units, with
//! validation, clamping, and JSON documents for presets.
//!
//! ```rust
//! use brigade::params::{EnsembleParams, StageCount};
//!
//! let params = EnsembleParams::default()
//!     .with_stages(StageCount::S1024)
//!     .with_feedback(0.3);
//! assert!(params.validate().is_ok());
//! ```

use crate::modulation::{MAX_LFO_RATE, MIN_LFO_RATE};
use core::f64::consts::PI;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Default anti-aliasing and output filter pitch, about 6 kHz at the output
pub const DEFAULT_FILTER_PITCH: f64 = 45.2326448;

/// Pitch range accepted for the filter parameters, semitones from A440
pub const FILTER_PITCH_RANGE: (f64, f64) = (-60.0, 70.0);

/// Clock rate range, kHz
pub const CLOCK_RATE_RANGE: (f64, f64) = (1.0, 100.0);

/// Upper bound on the anti-aliasing cutoff pushed into the delay lines
pub const MAX_ANTI_ALIAS_HZ: f64 = 25000.0;

/// Feedback gain at `feedback = 1`; two lines sum into each path, so this
/// stays below one half
pub const MAX_FEEDBACK_GAIN: f64 = 0.49;

/// Number of buckets in the emulated chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum StageCount {
    S128,
    S256,
    S512,
    S1024,
    S2048,
    S4096,
}

impl StageCount {
    pub const ALL: [StageCount; 6] = [
        StageCount::S128,
        StageCount::S256,
        StageCount::S512,
        StageCount::S1024,
        StageCount::S2048,
        StageCount::S4096,
    ];

    pub const fn stages(self) -> usize {
        match self {
            StageCount::S128 => 128,
            StageCount::S256 => 256,
            StageCount::S512 => 512,
            StageCount::S1024 => 1024,
            StageCount::S2048 => 2048,
            StageCount::S4096 => 4096,
        }
    }

    /// Display name of the chip variant
    pub fn name(self) -> &'static str {
        match self {
            StageCount::S128 => "BBD 128 Stages",
            StageCount::S256 => "BBD 256 Stages",
            StageCount::S512 => "BBD 512 Stages",
            StageCount::S1024 => "BBD 1024 Stages",
            StageCount::S2048 => "BBD 2048 Stages",
            StageCount::S4096 => "BBD 4096 Stages",
        }
    }
}

impl Default for StageCount {
    fn default() -> Self {
        StageCount::S256
    }
}

impl TryFrom<u32> for StageCount {
    type Error = ParamError;

    fn try_from(stages: u32) -> Result<Self, Self::Error> {
        StageCount::ALL
            .into_iter()
            .find(|s| s.stages() == stages as usize)
            .ok_or(ParamError::UnknownStageCount(stages))
    }
}

impl From<StageCount> for u32 {
    fn from(stages: StageCount) -> u32 {
        stages.stages() as u32
    }
}

impl fmt::Display for StageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from validating a parameter set
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    NonFinite {
        field: &'static str,
    },
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    UnknownStageCount(u32),
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::NonFinite { field } => write!(f, "{} is not a finite number", field),
            ParamError::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{} = {} is outside [{}, {}]", field, value, min, max),
            ParamError::UnknownStageCount(n) => {
                write!(f, "no BBD variant with {} stages", n)
            }
        }
    }
}

impl std::error::Error for ParamError {}

/// Ensemble control values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    /// Chip variant
    pub stages: StageCount,

    /// Bucket clock rate at the center delay, kHz
    pub clock_rate_khz: f64,

    /// Anti-aliasing filter pitch, semitones relative to A440
    pub anti_alias_pitch: f64,

    /// LFO rates, Hz
    pub lfo1_rate_hz: f64,
    pub lfo2_rate_hz: f64,

    /// LFO depths, 0..1
    pub lfo1_depth: f64,
    pub lfo2_depth: f64,

    /// Output saturation blend, 0..1
    pub saturation: f64,

    /// Feedback amount, 0..1
    pub feedback: f64,

    /// Output correction lowpass pitch; `None` bypasses the filter
    pub output_filter_pitch: Option<f64>,
}

impl EnsembleParams {
    /// Factory preset
    pub fn new() -> Self {
        Self {
            stages: StageCount::S256,
            clock_rate_khz: 40.0,
            anti_alias_pitch: DEFAULT_FILTER_PITCH,
            lfo1_rate_hz: 0.18,
            lfo2_rate_hz: 5.52,
            lfo1_depth: 1.0,
            lfo2_depth: 0.6,
            saturation: 0.0,
            feedback: 0.0,
            output_filter_pitch: Some(DEFAULT_FILTER_PITCH),
        }
    }

    pub fn with_stages(mut self, stages: StageCount) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_clock_rate(mut self, khz: f64) -> Self {
        self.clock_rate_khz = khz;
        self
    }

    pub fn with_lfo_rates(mut self, lfo1_hz: f64, lfo2_hz: f64) -> Self {
        self.lfo1_rate_hz = lfo1_hz;
        self.lfo2_rate_hz = lfo2_hz;
        self
    }

    pub fn with_lfo_depths(mut self, lfo1: f64, lfo2: f64) -> Self {
        self.lfo1_depth = lfo1;
        self.lfo2_depth = lfo2;
        self
    }

    pub fn with_saturation(mut self, amount: f64) -> Self {
        self.saturation = amount;
        self
    }

    pub fn with_feedback(mut self, amount: f64) -> Self {
        self.feedback = amount;
        self
    }

    pub fn with_anti_alias_pitch(mut self, pitch: f64) -> Self {
        self.anti_alias_pitch = pitch;
        self
    }

    pub fn with_output_filter(mut self, pitch: Option<f64>) -> Self {
        self.output_filter_pitch = pitch;
        self
    }

    fn ranges(&self) -> [(&'static str, f64, (f64, f64)); 9] {
        [
            ("clock_rate_khz", self.clock_rate_khz, CLOCK_RATE_RANGE),
            ("anti_alias_pitch", self.anti_alias_pitch, FILTER_PITCH_RANGE),
            ("lfo1_rate_hz", self.lfo1_rate_hz, (MIN_LFO_RATE, MAX_LFO_RATE)),
            ("lfo2_rate_hz", self.lfo2_rate_hz, (MIN_LFO_RATE, MAX_LFO_RATE)),
            ("lfo1_depth", self.lfo1_depth, (0.0, 1.0)),
            ("lfo2_depth", self.lfo2_depth, (0.0, 1.0)),
            ("saturation", self.saturation, (0.0, 1.0)),
            ("feedback", self.feedback, (0.0, 1.0)),
            (
                "output_filter_pitch",
                self.output_filter_pitch.unwrap_or(DEFAULT_FILTER_PITCH),
                FILTER_PITCH_RANGE,
            ),
        ]
    }

    /// Check every field is finite and in range.
    pub fn validate(&self) -> Result<(), ParamError> {
        for (field, value, (min, max)) in self.ranges() {
            if !value.is_finite() {
                return Err(ParamError::NonFinite { field });
            }
            if value < min || value > max {
                return Err(ParamError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Copy with every field clamped into range; NaN falls back to the
    /// factory value.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::new();
        let fix = |value: f64, fallback: f64, (min, max): (f64, f64)| {
            if value.is_nan() {
                fallback
            } else {
                value.clamp(min, max)
            }
        };

        Self {
            stages: self.stages,
            clock_rate_khz: fix(self.clock_rate_khz, defaults.clock_rate_khz, CLOCK_RATE_RANGE),
            anti_alias_pitch: fix(
                self.anti_alias_pitch,
                defaults.anti_alias_pitch,
                FILTER_PITCH_RANGE,
            ),
            lfo1_rate_hz: fix(
                self.lfo1_rate_hz,
                defaults.lfo1_rate_hz,
                (MIN_LFO_RATE, MAX_LFO_RATE),
            ),
            lfo2_rate_hz: fix(
                self.lfo2_rate_hz,
                defaults.lfo2_rate_hz,
                (MIN_LFO_RATE, MAX_LFO_RATE),
            ),
            lfo1_depth: fix(self.lfo1_depth, defaults.lfo1_depth, (0.0, 1.0)),
            lfo2_depth: fix(self.lfo2_depth, defaults.lfo2_depth, (0.0, 1.0)),
            saturation: fix(self.saturation, defaults.saturation, (0.0, 1.0)),
            feedback: fix(self.feedback, defaults.feedback, (0.0, 1.0)),
            output_filter_pitch: self
                .output_filter_pitch
                .map(|p| fix(p, DEFAULT_FILTER_PITCH, FILTER_PITCH_RANGE)),
        }
    }

    /// Center delay in seconds, `stages / (2·clock)`
    pub fn center_delay(&self) -> f64 {
        let clock_khz = self.clock_rate_khz.max(CLOCK_RATE_RANGE.0);
        self.stages.stages() as f64 / (2.0 * clock_khz) * 0.001
    }

    /// Feedback path gain, `0.49·sqrt(feedback)`
    pub fn feedback_gain(&self) -> f64 {
        MAX_FEEDBACK_GAIN * self.feedback.clamp(0.0, 1.0).sqrt()
    }

    /// Cutoff pushed into the delay lines' filter banks, in Hz.
    ///
    /// Tracks the clock rate so slower clocks get a darker anti-aliasing
    /// filter, and is capped at [`MAX_ANTI_ALIAS_HZ`].
    pub fn anti_alias_cutoff(&self) -> f64 {
        let clock_khz = self.clock_rate_khz.max(0.01);
        let freq = 2.0 * PI * 400.0 * pitch_ratio(self.anti_alias_pitch);
        let adjusted = freq * libm::pow(clock_khz * 0.01, 0.75);
        adjusted.min(MAX_ANTI_ALIAS_HZ)
    }

    /// Corner of the output correction lowpass, or `None` when bypassed
    pub fn output_filter_hz(&self) -> Option<f64> {
        self.output_filter_pitch.map(|p| 440.0 * pitch_ratio(p))
    }

    /// Serialize to JSON string
    #[cfg(feature = "alloc")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "alloc")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Frequency ratio of a pitch offset in semitones
#[inline]
pub fn pitch_ratio(semitones: f64) -> f64 {
    libm::exp2(semitones / 12.0)
}
