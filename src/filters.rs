//! Second-Order Filter Sections
//!
//! Topology-preserving-transform state-variable sections used around the BBD
//! lines: the 50 Hz Butterworth DC blocker in the feedback path and the
//! 12 dB/oct reconstruction lowpass on the ensemble output.

use crate::combinator::Module;
use core::f64::consts::PI;

/// Response of a [`Biquad`] section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// One TPT state-variable section with lowpass or highpass output mix.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    cutoff: f64,
    q: f64,
    sample_rate: f64,
    a1: f64,
    a2: f64,
    a3: f64,
    m0: f64,
    m1: f64,
    m2: f64,
    ic1eq: f64,
    ic2eq: f64,
}

impl Biquad {
    pub fn new(kind: FilterKind, sample_rate: f64, cutoff: f64, q: f64) -> Self {
        let mut filter = Self {
            kind,
            cutoff,
            q,
            sample_rate,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            m0: 0.0,
            m1: 0.0,
            m2: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        filter.update_coefficients();
        filter
    }

    pub fn lowpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        Self::new(FilterKind::Lowpass, sample_rate, cutoff, q)
    }

    pub fn highpass(sample_rate: f64, cutoff: f64, q: f64) -> Self {
        Self::new(FilterKind::Highpass, sample_rate, cutoff, q)
    }

    /// Move the corner frequency, keeping filter memory
    pub fn set_cutoff(&mut self, cutoff: f64) {
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.update_coefficients();
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    fn update_coefficients(&mut self) {
        let q = self.q.max(0.01);
        let freq = self.cutoff.clamp(1.0, self.sample_rate * 0.499);

        let g = (PI * freq / self.sample_rate).tan();
        let k = 1.0 / q;

        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;

        let (m0, m1, m2) = match self.kind {
            FilterKind::Lowpass => (0.0, 0.0, 1.0),
            FilterKind::Highpass => (1.0, -k, -1.0),
        };
        self.m0 = m0;
        self.m1 = m1;
        self.m2 = m2;
    }
}

impl Module for Biquad {
    type In = f64;
    type Out = f64;

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let v3 = x - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        self.m0 * x + self.m1 * v1 + self.m2 * v2
    }

    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }
}

/// Corner of the feedback-path DC blocker
pub const DC_BLOCK_HZ: f64 = 50.0;

/// Section Q values of a 4th-order Butterworth response
pub const BUTTERWORTH_Q: [f64; 2] = [1.0 / 0.7654, 1.0 / 1.8478];

/// 4th-order Butterworth highpass at [`DC_BLOCK_HZ`]: two cascaded sections.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    sections: [Biquad; 2],
}

impl DcBlocker {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sections: BUTTERWORTH_Q.map(|q| Biquad::highpass(sample_rate, DC_BLOCK_HZ, q)),
        }
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl Module for DcBlocker {
    type In = f64;
    type Out = f64;

    #[inline]
    fn tick(&mut self, x: f64) -> f64 {
        let y = self.sections[0].tick(x);
        self.sections[1].tick(y)
    }

    fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        for section in &mut self.sections {
            section.set_sample_rate(sample_rate);
        }
    }
}
