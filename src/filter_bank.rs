//! # BBD Anti-Aliasing and Reconstruction Filter Banks
//!
//! A bucket-brigade chip sits between two analog filters: an anti-aliasing
//! filter in front of the sampling switch and a reconstruction filter after
//! the last bucket. Both are modelled here as four parallel one-pole complex
//! sections whose root/pole pairs were fitted to measurements of real
//! hardware. The fitted constants live in [`INPUT_FILTER`] and
//! [`OUTPUT_FILTER`]; at runtime they are only scaled to the requested cutoff
//! and exponentiated.
//!
//! ## Two Time Bases
//!
//! The banks integrate their continuous state once per host sample, but they
//! are *read* (input bank) or *written* (output bank) on every tick of the
//! bucket clock, which runs at an unrelated rate. The per-tick gain factor
//! `Gcalc` depends on where the tick lands inside the host period (`tn`):
//!
//! ```text
//! input:  Gcalc(tn) = gCoef · pole_corr^tn
//! output: Gcalc(tn) = gCoef · pole_corr · pole_corr^(-tn)
//! ```
//!
//! Evaluating that power on every tick would be too slow, so the bank caches
//! a unit rotation `Aplus` for one tick spacing and advances `Gcalc` by
//! multiplication ([`InputFilterBank::calc_g`]). The exact power is only
//! evaluated on retune ([`InputFilterBank::set_time`]).

use crate::lane::{fast_exp_lane, ComplexLane, LANES};
use num_complex::Complex64;

/// Fixed physical model of one filter bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    /// Residues of the partial-fraction expansion
    pub roots: [Complex64; LANES],
    /// Poles, in rad/s at the reference cutoff
    pub poles: [Complex64; LANES],
    /// Cutoff the roots and poles were measured at, in Hz
    pub reference_hz: f64,
}

impl FilterSpec {
    /// Roots as a lane
    pub fn root_lane(&self) -> ComplexLane {
        ComplexLane::new(self.roots)
    }

    /// Poles as a lane
    pub fn pole_lane(&self) -> ComplexLane {
        ComplexLane::new(self.poles)
    }

    /// DC gain of the analog prototype, `Re Σ(-r/p)`.
    ///
    /// Independent of the cutoff scale factor since roots and poles scale
    /// together.
    pub fn dc_gain(&self) -> f64 {
        self.roots
            .iter()
            .zip(self.poles.iter())
            .map(|(r, p)| (-*r / *p).re)
            .sum()
    }
}

/// Anti-aliasing filter in front of the bucket chain (measured at 9.9 kHz).
pub const INPUT_FILTER: FilterSpec = FilterSpec {
    roots: [
        Complex64::new(-10329.2715, -329.848),
        Complex64::new(-10329.2715, 329.848),
        Complex64::new(366.990557, -1811.4318),
        Complex64::new(366.990557, 1811.4318),
    ],
    poles: [
        Complex64::new(-55482.0, -25082.0),
        Complex64::new(-55482.0, 25082.0),
        Complex64::new(-26292.0, -59437.0),
        Complex64::new(-26292.0, 59437.0),
    ],
    reference_hz: 9900.0,
};

/// Reconstruction filter after the bucket chain (measured at 9.5 kHz).
pub const OUTPUT_FILTER: FilterSpec = FilterSpec {
    roots: [
        Complex64::new(-11256.0, -99566.0),
        Complex64::new(-11256.0, 99566.0),
        Complex64::new(-13802.0, -24606.0),
        Complex64::new(-13802.0, 24606.0),
    ],
    poles: [
        Complex64::new(-51468.0, -21437.0),
        Complex64::new(-51468.0, 21437.0),
        Complex64::new(-26276.0, -59699.0),
        Complex64::new(-26276.0, 59699.0),
    ],
    reference_hz: 9500.0,
};

/// State shared by both bank flavours.
#[derive(Debug, Clone)]
struct BankState {
    spec: &'static FilterSpec,
    sample_period: f64,
    /// Per-host-sample pole decay, `exp(pole · scale · Ts)`
    pole_corr: ComplexLane,
    /// Phase angle of `pole_corr`
    angle: [f64; LANES],
    /// Gain coefficient `Gcalc` is derived from
    g_coef: ComplexLane,
    /// Re-references `Gcalc` after one host period elapses
    roll: ComplexLane,
    /// Rotation per bucket tick pair
    a_plus: ComplexLane,
    g_calc: ComplexLane,
    x: ComplexLane,
    delta: f64,
}

impl BankState {
    fn new(spec: &'static FilterSpec, sample_rate: f64) -> Self {
        Self {
            spec,
            sample_period: 1.0 / sample_rate,
            pole_corr: ComplexLane::ZERO,
            angle: [0.0; LANES],
            g_coef: ComplexLane::ZERO,
            roll: ComplexLane::ONE,
            a_plus: ComplexLane::ONE,
            g_calc: ComplexLane::ZERO,
            x: ComplexLane::ZERO,
            delta: 0.0,
        }
    }

    /// Scale poles to `target_hz` and return the scaled pole lane
    fn retune(&mut self, target_hz: f64) -> ComplexLane {
        let scale = target_hz / self.spec.reference_hz;
        let poles = self.spec.pole_lane() * scale;
        self.pole_corr = (poles * self.sample_period).exp();
        self.angle = self.pole_corr.arg();
        poles
    }

    fn rotation(&self, sign: f64, amount: f64) -> ComplexLane {
        fast_exp_lane(self.angle.map(|a| sign * a * amount))
    }
}

/// Anti-aliasing bank: filters host-rate input, sampled on even bucket ticks.
#[derive(Debug, Clone)]
pub struct InputFilterBank {
    state: BankState,
}

impl InputFilterBank {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            state: BankState::new(&INPUT_FILTER, sample_rate),
        }
    }

    /// Change the host sample rate. Call [`set_freq`](Self::set_freq) after.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.state.sample_period = 1.0 / sample_rate;
    }

    /// Retune the bank to a new cutoff.
    ///
    /// This is the expensive path (one complex exponential per lane). Leaves
    /// `Gcalc` stale: follow with [`set_time`](Self::set_time) and
    /// [`set_delta`](Self::set_delta).
    pub fn set_freq(&mut self, target_hz: f64) {
        let s = &mut self.state;
        let poles = s.retune(target_hz);
        let roots = s.spec.root_lane() * (target_hz / s.spec.reference_hz);
        // Step-invariant residues: holds the DC gain at the analog value
        s.g_coef = roots * (s.pole_corr - ComplexLane::ONE);
        s.g_coef = s.g_coef.zip_with(poles, |g, p| g / p);
        s.roll = s.rotation(-1.0, s.sample_period);
    }

    /// Recompute `Gcalc` exactly for the clock phase `tn`.
    pub fn set_time(&mut self, tn: f64) {
        let s = &mut self.state;
        s.g_calc = s.g_coef * s.pole_corr.powf(tn);
    }

    /// Cache the rotation for a tick spacing of `delta` seconds.
    pub fn set_delta(&mut self, delta: f64) {
        let s = &mut self.state;
        s.delta = delta;
        s.a_plus = s.rotation(1.0, delta);
    }

    /// Advance `Gcalc` by one cached rotation.
    #[inline]
    pub fn calc_g(&mut self) {
        self.state.g_calc *= self.state.a_plus;
    }

    /// The value a bucket samples on this tick, `Σ Re(Gcalc · x)`.
    #[inline]
    pub fn sample(&self) -> f64 {
        self.state.g_calc.dot_real(&self.state.x)
    }

    /// Account for one elapsed host period in `Gcalc`.
    #[inline]
    pub fn end_period(&mut self) {
        self.state.g_calc *= self.state.roll;
    }

    /// Integrate one host-rate input sample.
    #[inline]
    pub fn process(&mut self, u: f64) {
        let s = &mut self.state;
        s.x = s.pole_corr * s.x + u;
    }

    /// Clear the integrator, keeping the tuning.
    pub fn reset(&mut self) {
        self.state.x = ComplexLane::ZERO;
    }

    pub fn state(&self) -> &ComplexLane {
        &self.state.x
    }

    pub fn g_calc(&self) -> &ComplexLane {
        &self.state.g_calc
    }

    pub fn delta(&self) -> f64 {
        self.state.delta
    }
}

/// Reconstruction bank: integrates bucket-to-bucket differences collected on
/// odd ticks and produces the smoothed host-rate output.
#[derive(Debug, Clone)]
pub struct OutputFilterBank {
    state: BankState,
    h0: f64,
}

impl OutputFilterBank {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            state: BankState::new(&OUTPUT_FILTER, sample_rate),
            h0: OUTPUT_FILTER.dc_gain(),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.state.sample_period = 1.0 / sample_rate;
    }

    /// Retune the bank to a new cutoff. See [`InputFilterBank::set_freq`].
    pub fn set_freq(&mut self, target_hz: f64) {
        let s = &mut self.state;
        let poles = s.retune(target_hz);
        let roots = s.spec.root_lane() * (target_hz / s.spec.reference_hz);
        let residues = roots.zip_with(poles, |r, p| r / p);
        s.g_coef = residues * s.pole_corr;
        s.roll = s.rotation(1.0, s.sample_period);
    }

    pub fn set_time(&mut self, tn: f64) {
        let s = &mut self.state;
        s.g_calc = s.g_coef * s.pole_corr.powf(-tn);
    }

    pub fn set_delta(&mut self, delta: f64) {
        let s = &mut self.state;
        s.delta = delta;
        s.a_plus = s.rotation(-1.0, delta);
    }

    #[inline]
    pub fn calc_g(&mut self) {
        self.state.g_calc *= self.state.a_plus;
    }

    /// Current per-tick gain factor
    #[inline]
    pub fn g_calc(&self) -> &ComplexLane {
        &self.state.g_calc
    }

    #[inline]
    pub fn end_period(&mut self) {
        self.state.g_calc *= self.state.roll;
    }

    /// Integrate the deltas accumulated during one host period.
    #[inline]
    pub fn process(&mut self, accumulated: ComplexLane) {
        let s = &mut self.state;
        s.x = s.pole_corr * s.x + accumulated;
    }

    /// Band-limited correction term, `Σ Re(x)`
    #[inline]
    pub fn output(&self) -> f64 {
        self.state.x.real_sum()
    }

    /// DC gain compensation applied to the held bucket value
    #[inline]
    pub fn h0(&self) -> f64 {
        self.h0
    }

    pub fn reset(&mut self) {
        self.state.x = ComplexLane::ZERO;
    }

    pub fn state(&self) -> &ComplexLane {
        &self.state.x
    }

    pub fn delta(&self) -> f64 {
        self.state.delta
    }
}
