//! Delay-Time Modulation
//!
//! Two sine LFOs, each read at three phase offsets (0°, 120°, 240°). The six
//! values drive the three delay taps of the ensemble.

use core::f64::consts::TAU;

/// Slowest allowed LFO rate in Hz
pub const MIN_LFO_RATE: f64 = 0.005;
/// Fastest allowed LFO rate in Hz
pub const MAX_LFO_RATE: f64 = 40.0;

/// Phase offsets of the three taps, in cycles
pub const TAP_OFFSETS: [f64; 3] = [0.0, 1.0 / 3.0, 2.0 / 3.0];

/// Sine low-frequency oscillator.
///
/// Reading is side-effect free ([`value`](Lfo::value)); the phase only moves
/// in [`post_process`](Lfo::post_process), once per sample.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f64,
    rate: f64,
    depth: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            rate: 1.0,
            depth: 1.0,
            sample_rate,
        }
    }

    /// Builder-style rate setter
    pub fn with_rate(mut self, hz: f64) -> Self {
        self.set_rate(hz);
        self
    }

    /// Builder-style depth setter
    pub fn with_depth(mut self, depth: f64) -> Self {
        self.set_depth(depth);
        self
    }

    /// Set the rate in Hz, limited to `[MIN_LFO_RATE, MAX_LFO_RATE]`
    pub fn set_rate(&mut self, hz: f64) {
        self.rate = if hz.is_nan() {
            MIN_LFO_RATE
        } else {
            hz.clamp(MIN_LFO_RATE, MAX_LFO_RATE)
        };
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = if depth.is_nan() {
            0.0
        } else {
            depth.clamp(0.0, 1.0)
        };
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Current output, `depth · sin(2π·phase)`
    #[inline]
    pub fn value(&self) -> f64 {
        self.value_at(0.0)
    }

    /// Output at a phase offset given in cycles
    #[inline]
    pub fn value_at(&self, offset: f64) -> f64 {
        self.depth * ((self.phase + offset) * TAU).sin()
    }

    /// Advance the phase by one sample.
    #[inline]
    pub fn post_process(&mut self) {
        self.phase = (self.phase + self.rate / self.sample_rate).fract();
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

/// Two independent LFOs with three phase-offset taps each.
#[derive(Debug, Clone)]
pub struct ModulationPair {
    lfos: [Lfo; 2],
}

impl ModulationPair {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lfos: [Lfo::new(sample_rate), Lfo::new(sample_rate)],
        }
    }

    /// Set rate (Hz) and depth of both LFOs
    pub fn configure(&mut self, rates: [f64; 2], depths: [f64; 2]) {
        for ((lfo, rate), depth) in self.lfos.iter_mut().zip(rates).zip(depths) {
            lfo.set_rate(rate);
            lfo.set_depth(depth);
        }
    }

    /// The six modulation values, `[lfo][tap]`
    #[inline]
    pub fn values(&self) -> [[f64; 3]; 2] {
        self.lfos
            .each_ref()
            .map(|lfo| TAP_OFFSETS.map(|offset| lfo.value_at(offset)))
    }

    /// Advance both LFOs by one sample.
    #[inline]
    pub fn post_process(&mut self) {
        for lfo in &mut self.lfos {
            lfo.post_process();
        }
    }

    pub fn lfo(&self, index: usize) -> &Lfo {
        &self.lfos[index]
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for lfo in &mut self.lfos {
            lfo.set_sample_rate(sample_rate);
        }
    }

    pub fn reset(&mut self) {
        for lfo in &mut self.lfos {
            lfo.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_lfo_rate_clamp() {
        let mut lfo = Lfo::new(48000.0);
        lfo.set_rate(0.0);
        assert_eq!(lfo.rate(), MIN_LFO_RATE);
        lfo.set_rate(1000.0);
        assert_eq!(lfo.rate(), MAX_LFO_RATE);
        lfo.set_rate(f64::NAN);
        assert_eq!(lfo.rate(), MIN_LFO_RATE);
    }

    #[test]
    fn test_lfo_period() {
        let sr = 1000.0;
        let mut lfo = Lfo::new(sr).with_rate(10.0).with_depth(1.0);

        // Quarter period reaches the peak
        for _ in 0..25 {
            lfo.post_process();
        }
        assert_abs_diff_eq!(lfo.value(), 1.0, epsilon = 1e-9);

        // Full period returns to the start
        for _ in 0..75 {
            lfo.post_process();
        }
        assert_abs_diff_eq!(lfo.value(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_value_does_not_advance() {
        let lfo = Lfo::new(48000.0).with_rate(5.0);
        let a = lfo.value();
        let b = lfo.value();
        assert_eq!(a, b);
        assert_eq!(lfo.phase(), 0.0);
    }

    #[test]
    fn test_depth_scales_output() {
        let mut lfo = Lfo::new(400.0).with_rate(1.0).with_depth(0.6);
        for _ in 0..100 {
            lfo.post_process();
        }
        assert_abs_diff_eq!(lfo.value(), 0.6, epsilon = 1e-9);
    }

    #[test]
    fn test_taps_are_120_degrees_apart() {
        let mut pair = ModulationPair::new(48000.0);
        pair.configure([0.18, 5.52], [1.0, 0.6]);
        for _ in 0..1234 {
            pair.post_process();
        }

        for (lfo, taps) in pair.values().iter().enumerate() {
            // Three equally spaced sines sum to zero
            assert_abs_diff_eq!(taps.iter().sum::<f64>(), 0.0, epsilon = 1e-9);

            let depth = pair.lfo(lfo).depth();
            for tap in taps {
                assert!(tap.abs() <= depth + 1e-12);
            }
        }
    }

    #[test]
    fn test_reset() {
        let mut pair = ModulationPair::new(48000.0);
        pair.configure([10.0, 20.0], [1.0, 1.0]);
        for _ in 0..100 {
            pair.post_process();
        }
        pair.reset();
        assert_eq!(pair.lfo(0).phase(), 0.0);
        assert_eq!(pair.lfo(1).phase(), 0.0);
    }
}
