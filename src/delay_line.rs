//! # Bucket-Brigade Delay Line
//!
//! [`BbdDelayLine`] emulates one BBD chip with `N` buckets. Two clocks are
//! involved: the host sample clock (period `Ts`) and the chip's bucket
//! clock (period `Ts_bbd`), which is derived from the requested delay time
//! and changes whenever the delay is modulated.
//!
//! ## Clock-Tick Loop
//!
//! Each call to [`process`](BbdDelayLine::process) runs every bucket-clock
//! tick that falls inside the current host period:
//!
//! ```text
//! even tick: bucket[ptr] = Σ Re(Gin · xin)   ; sample the anti-aliasing bank
//!            ptr = (ptr + 1) mod N
//! odd tick:  y = bucket[ptr]
//!            acc += Gout · (y - y_old)       ; feed the reconstruction bank
//!            y_old = y
//! ```
//!
//! `tn` tracks where the next tick lands relative to the host sample
//! boundary. After the loop one host period is subtracted and the remainder
//! carries into the next call, so the two clocks stay phase-continuous while
//! the bucket clock rate moves every sample.
//!
//! The output is the held bucket value plus the band-limited estimate of
//! how much it is about to change:
//!
//! ```text
//! y = dc_trim · (H0 · y_old + Σ Re(xout))
//! ```

use crate::combinator::Module;
use crate::filter_bank::{InputFilterBank, OutputFilterBank, INPUT_FILTER, OUTPUT_FILTER};
use crate::lane::ComplexLane;
use alloc::vec;
use alloc::vec::Vec;

/// Most bucket-clock ticks allowed in one host sample; bounds the delay
/// from below
pub const MAX_TICKS_PER_SAMPLE: f64 = 512.0;

/// Longest accepted delay time, seconds
pub const MAX_DELAY_SECONDS: f64 = 10.0;

/// Accepted anti-aliasing cutoff range, Hz
pub const FILTER_FREQ_RANGE: (f64, f64) = (1.0, 200_000.0);

/// Cutoff and delay a freshly created line starts with
pub const DEFAULT_FILTER_FREQ: f64 = 10_000.0;
pub const DEFAULT_DELAY: f64 = 0.005;

/// One emulated bucket-brigade chip with `N` stages (64..=8192).
#[derive(Debug, Clone)]
pub struct BbdDelayLine<const N: usize> {
    sample_period: f64,
    bbd_period: f64,
    tn: f64,
    even_on: bool,
    buffer: Vec<f64>,
    ptr: usize,
    y_old: f64,
    dc_trim: f64,
    input_bank: InputFilterBank,
    output_bank: OutputFilterBank,
    filter_freq: f64,
    delay_time: f64,
}

impl<const N: usize> BbdDelayLine<N> {
    const STAGES_IN_RANGE: () = assert!(N >= 64 && N <= 8192, "BBD stage count must be 64..=8192");

    /// Number of buckets
    pub const STAGES: usize = N;

    pub fn new(sample_rate: f64) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::STAGES_IN_RANGE;

        let mut line = Self {
            sample_period: 1.0 / sample_rate,
            bbd_period: DEFAULT_DELAY / (2.0 * N as f64),
            tn: 0.0,
            even_on: true,
            buffer: vec![0.0; N],
            ptr: 0,
            y_old: 0.0,
            dc_trim: 1.0 / (INPUT_FILTER.dc_gain() * OUTPUT_FILTER.dc_gain()),
            input_bank: InputFilterBank::new(sample_rate),
            output_bank: OutputFilterBank::new(sample_rate),
            filter_freq: DEFAULT_FILTER_FREQ,
            delay_time: DEFAULT_DELAY,
        };
        line.prepare(sample_rate);
        line
    }

    /// Set up for a host sample rate and clear all state.
    ///
    /// Keeps the current cutoff and delay time, re-deriving everything that
    /// depends on the host period.
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_period = 1.0 / sample_rate;
        self.input_bank.set_sample_rate(sample_rate);
        self.output_bank.set_sample_rate(sample_rate);
        self.clear();
        self.set_delay_time(self.delay_time);
        self.set_filter_freq(self.filter_freq);
    }

    fn clear(&mut self) {
        self.tn = 0.0;
        self.even_on = true;
        self.ptr = 0;
        self.y_old = 0.0;
        self.buffer.fill(0.0);
        self.input_bank.reset();
        self.output_bank.reset();
    }

    /// Shortest delay the line accepts at the current host rate
    pub fn min_delay(&self) -> f64 {
        2.0 * N as f64 * self.sample_period / MAX_TICKS_PER_SAMPLE
    }

    /// Set the delay time in seconds.
    ///
    /// Cheap enough to call every sample: one multiply per lane plus the
    /// rotation approximation, no transcendental calls. The value is limited
    /// to `[min_delay(), MAX_DELAY_SECONDS]`; NaN maps to the minimum.
    #[inline]
    pub fn set_delay_time(&mut self, seconds: f64) {
        let seconds = seconds.max(self.min_delay()).min(MAX_DELAY_SECONDS);
        self.delay_time = seconds;
        self.bbd_period = seconds / (2.0 * N as f64);

        let delta = 2.0 * self.bbd_period;
        self.input_bank.set_delta(delta);
        self.output_bank.set_delta(delta);
    }

    /// Retune both filter banks to `hz`.
    ///
    /// Expensive (complex exponentials and powers per lane); throttle it
    /// rather than calling every sample.
    pub fn set_filter_freq(&mut self, hz: f64) {
        let hz = hz.max(FILTER_FREQ_RANGE.0).min(FILTER_FREQ_RANGE.1);
        self.filter_freq = hz;

        let delta = 2.0 * self.bbd_period;
        self.input_bank.set_freq(hz);
        self.input_bank.set_time(self.tn);
        self.input_bank.set_delta(delta);

        self.output_bank.set_freq(hz);
        self.output_bank.set_time(self.tn);
        self.output_bank.set_delta(delta);
    }

    /// Run one host sample through the chip.
    #[inline]
    pub fn process(&mut self, u: f64) -> f64 {
        let mut acc = ComplexLane::ZERO;

        while self.tn < self.sample_period {
            if self.even_on {
                self.input_bank.calc_g();
                self.buffer[self.ptr] = self.input_bank.sample();
                self.ptr += 1;
                if self.ptr == N {
                    self.ptr = 0;
                }
            } else {
                let y = self.buffer[self.ptr];
                let delta = y - self.y_old;
                self.y_old = y;
                self.output_bank.calc_g();
                acc += *self.output_bank.g_calc() * delta;
            }

            self.even_on = !self.even_on;
            self.tn += self.bbd_period;
        }
        self.tn -= self.sample_period;

        self.input_bank.end_period();
        self.output_bank.end_period();

        self.input_bank.process(u);
        self.output_bank.process(acc);

        self.dc_trim * (self.output_bank.h0() * self.y_old + self.output_bank.output())
    }

    /// Sub-sample offset between the host clock and the next bucket tick,
    /// in seconds
    pub fn clock_phase(&self) -> f64 {
        self.tn
    }

    pub fn sample_period(&self) -> f64 {
        self.sample_period
    }

    /// Bucket clock period, seconds
    pub fn bbd_period(&self) -> f64 {
        self.bbd_period
    }

    /// Bucket clock ticks per host sample
    pub fn ticks_per_sample(&self) -> f64 {
        self.sample_period / self.bbd_period
    }

    /// Bucket clock frequency, Hz
    pub fn clock_rate(&self) -> f64 {
        1.0 / self.bbd_period
    }

    pub fn delay_time(&self) -> f64 {
        self.delay_time
    }

    pub fn filter_freq(&self) -> f64 {
        self.filter_freq
    }
}

impl<const N: usize> Default for BbdDelayLine<N> {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl<const N: usize> Module for BbdDelayLine<N> {
    type In = f64;
    type Out = f64;

    #[inline]
    fn tick(&mut self, input: f64) -> f64 {
        self.process(input)
    }

    fn reset(&mut self) {
        self.clear();
        self.set_filter_freq(self.filter_freq);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.prepare(sample_rate);
    }
}
