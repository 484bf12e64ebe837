//! # BBD Ensemble
//!
//! A stereo chorus/ensemble built from four [`BbdDelayLine`]s, two per
//! channel, in the style of the classic string-ensemble BBD circuits.
//!
//! ## Signal Flow
//!
//! ```text
//!        ┌──────────── feedback · DC blocker ◄───────────┐
//!        ▼                                                │
//! in ─► ×0.75 ─► soft clip ─┬─► BBD (t1) ─┐               │
//!                           └─► BBD (t2) ─┴─► Σ ──────────┤
//!                                              │          │
//!                                   saturation ┴─► ×-8 dB ─► lowpass ─► out
//! ```
//!
//! The right channel mirrors the left with taps `t2` and `t3`: the middle
//! tap is shared, which couples the channels into one stereo image instead
//! of two unrelated mono choruses.
//!
//! ## Delay Taps
//!
//! Two LFOs are each read at 0°, 120° and 240°. Tap `k` is
//!
//! ```text
//! t_k = del1 · lfo1[k] + del2 · lfo2[k] + center
//! center = stages / (2 · clock)
//! del1, del2 = (0.6 ms, 0.2 ms) · 0.95 · center / 0.8 ms
//! ```
//!
//! so the modulation never swings a tap below 5 % of the center delay.
//!
//! ## Control Rate
//!
//! Audio runs in blocks of [`BLOCK_SIZE`]. Parameters are read at the top of
//! each block and the expensive filter retune ([`BbdDelayLine::set_filter_freq`])
//! only happens every [`RETUNE_INTERVAL`] blocks.

use crate::analog::{saturation, Saturator, DEFAULT_DRIVE};
use crate::combinator::{Module, ModuleExt, Parallel};
use crate::delay_line::{BbdDelayLine, DEFAULT_DELAY, DEFAULT_FILTER_FREQ};
use crate::filters::{Biquad, DcBlocker};
use crate::modulation::ModulationPair;
use crate::params::{EnsembleParams, StageCount};
use crate::rng::NoiseFloor;
use log::{debug, trace, warn};

/// Samples per control block
pub const BLOCK_SIZE: usize = 32;

/// Blocks between anti-aliasing retunes
pub const RETUNE_INTERVAL: u32 = 4;

/// Input trim ahead of the soft clipper (about -3 dB)
pub const INPUT_TRIM: f64 = 0.75;

/// Output trim after summing the taps, dB
pub const OUTPUT_TRIM_DB: f64 = -8.0;

/// Base modulation offsets, seconds
pub const DELAY1: f64 = 0.6e-3;
pub const DELAY2: f64 = 0.2e-3;

/// Q of the output correction lowpass
pub const RECONSTRUCTION_Q: f64 = 0.7071;

/// Four delay lines of one chip variant, wired L1, L2, R1, R2.
#[derive(Debug, Clone)]
pub struct DelayQuad<const N: usize> {
    lines: [BbdDelayLine<N>; 4],
}

impl<const N: usize> DelayQuad<N> {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lines: core::array::from_fn(|_| BbdDelayLine::new(sample_rate)),
        }
    }

    pub fn lines(&self) -> &[BbdDelayLine<N>; 4] {
        &self.lines
    }
}

/// Per-variant operations the ensemble needs from a [`DelayQuad`].
pub trait DelayBank: Send {
    /// Assign taps `[t1, t2, t3]` as L1 = t1, L2 = t2, R1 = t2, R2 = t3
    fn set_taps(&mut self, taps: [f64; 3]);

    /// Run one stereo sample through all four lines
    fn process(&mut self, left: f64, right: f64) -> [f64; 4];

    fn set_filter_freq(&mut self, hz: f64);

    fn filter_freq(&self) -> f64;

    /// Delay times of the four lines, L1, L2, R1, R2, seconds
    fn delay_times(&self) -> [f64; 4];

    /// Back to the power-on tuning with empty buckets
    fn init(&mut self);

    fn prepare(&mut self, sample_rate: f64);
}

impl<const N: usize> DelayBank for DelayQuad<N> {
    #[inline]
    fn set_taps(&mut self, [t1, t2, t3]: [f64; 3]) {
        self.lines[0].set_delay_time(t1);
        self.lines[1].set_delay_time(t2);
        self.lines[2].set_delay_time(t2);
        self.lines[3].set_delay_time(t3);
    }

    #[inline]
    fn process(&mut self, left: f64, right: f64) -> [f64; 4] {
        [
            self.lines[0].process(left),
            self.lines[1].process(left),
            self.lines[2].process(right),
            self.lines[3].process(right),
        ]
    }

    fn set_filter_freq(&mut self, hz: f64) {
        for line in &mut self.lines {
            line.set_filter_freq(hz);
        }
    }

    fn filter_freq(&self) -> f64 {
        self.lines[0].filter_freq()
    }

    fn delay_times(&self) -> [f64; 4] {
        core::array::from_fn(|i| self.lines[i].delay_time())
    }

    fn init(&mut self) {
        for line in &mut self.lines {
            line.reset();
            line.set_filter_freq(DEFAULT_FILTER_FREQ);
            line.set_delay_time(DEFAULT_DELAY);
        }
    }

    fn prepare(&mut self, sample_rate: f64) {
        for line in &mut self.lines {
            line.prepare(sample_rate);
        }
    }
}

/// One [`DelayQuad`] per chip variant, allocated up front so switching the
/// stage count never allocates.
#[derive(Debug, Clone)]
struct StageBanks {
    s128: DelayQuad<128>,
    s256: DelayQuad<256>,
    s512: DelayQuad<512>,
    s1024: DelayQuad<1024>,
    s2048: DelayQuad<2048>,
    s4096: DelayQuad<4096>,
}

impl StageBanks {
    fn new(sample_rate: f64) -> Self {
        Self {
            s128: DelayQuad::new(sample_rate),
            s256: DelayQuad::new(sample_rate),
            s512: DelayQuad::new(sample_rate),
            s1024: DelayQuad::new(sample_rate),
            s2048: DelayQuad::new(sample_rate),
            s4096: DelayQuad::new(sample_rate),
        }
    }

    fn get(&self, stages: StageCount) -> &dyn DelayBank {
        match stages {
            StageCount::S128 => &self.s128,
            StageCount::S256 => &self.s256,
            StageCount::S512 => &self.s512,
            StageCount::S1024 => &self.s1024,
            StageCount::S2048 => &self.s2048,
            StageCount::S4096 => &self.s4096,
        }
    }

    fn get_mut(&mut self, stages: StageCount) -> &mut dyn DelayBank {
        match stages {
            StageCount::S128 => &mut self.s128,
            StageCount::S256 => &mut self.s256,
            StageCount::S512 => &mut self.s512,
            StageCount::S1024 => &mut self.s1024,
            StageCount::S2048 => &mut self.s2048,
            StageCount::S4096 => &mut self.s4096,
        }
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut dyn DelayBank)) {
        for stages in StageCount::ALL {
            f(self.get_mut(stages));
        }
    }
}

/// Values held constant for one block
#[derive(Debug, Clone, Copy)]
struct BlockControls {
    stages: StageCount,
    center: f64,
    del1: f64,
    del2: f64,
    feedback_gain: f64,
    output_gain: f64,
    output_filter: bool,
}

impl BlockControls {
    fn from_params(params: &EnsembleParams) -> Self {
        let center = params.center_delay();
        let scale = 0.95 * center / (DELAY1 + DELAY2);
        Self {
            stages: params.stages,
            center,
            del1: scale * DELAY1,
            del2: scale * DELAY2,
            feedback_gain: params.feedback_gain(),
            output_gain: libm::pow(10.0, OUTPUT_TRIM_DB / 20.0),
            output_filter: params.output_filter_pitch.is_some(),
        }
    }
}

/// Everything besides the delay lines: modulation, feedback, shaping
#[derive(Debug, Clone)]
struct EnsembleState {
    modulation: ModulationPair,
    feedback: (f64, f64),
    dc_blockers: Parallel<DcBlocker, DcBlocker>,
    saturator: Saturator,
    reconstruction: Parallel<Biquad, Biquad>,
    noise: [NoiseFloor; 2],
    controls: BlockControls,
    taps: [f64; 3],
}

impl EnsembleState {
    fn new(sample_rate: f64, params: &EnsembleParams) -> Self {
        let cutoff = params.output_filter_hz().unwrap_or(DEFAULT_FILTER_FREQ);
        let noise = NoiseFloor::default();
        let noise_right = noise.split();

        Self {
            modulation: ModulationPair::new(sample_rate),
            feedback: (0.0, 0.0),
            dc_blockers: DcBlocker::new(sample_rate).parallel(DcBlocker::new(sample_rate)),
            saturator: Saturator::new(sample_rate),
            reconstruction: Biquad::lowpass(sample_rate, cutoff, RECONSTRUCTION_Q)
                .parallel(Biquad::lowpass(sample_rate, cutoff, RECONSTRUCTION_Q)),
            noise: [noise, noise_right],
            controls: BlockControls::from_params(params),
            taps: [DEFAULT_DELAY; 3],
        }
    }

    /// Read parameters for the next block
    fn load_controls(&mut self, params: &EnsembleParams) {
        self.modulation.configure(
            [params.lfo1_rate_hz, params.lfo2_rate_hz],
            [params.lfo1_depth, params.lfo2_depth],
        );
        self.saturator.set_drive(params.saturation);
        if let Some(hz) = params.output_filter_hz() {
            self.reconstruction.left.set_cutoff(hz);
            self.reconstruction.right.set_cutoff(hz);
        }
        self.controls = BlockControls::from_params(params);
    }

    #[inline]
    fn run<B: DelayBank + ?Sized>(&mut self, bank: &mut B, left: &mut [f64], right: &mut [f64]) {
        let c = self.controls;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (fb_l, fb_r) = self.feedback;
            let in_l = saturation::soft_clip(INPUT_TRIM * *l + fb_l) + self.noise[0].next();
            let in_r = saturation::soft_clip(INPUT_TRIM * *r + fb_r) + self.noise[1].next();

            let [lfo1, lfo2] = self.modulation.values();
            let taps: [f64; 3] = core::array::from_fn(|k| c.del1 * lfo1[k] + c.del2 * lfo2[k] + c.center);
            bank.set_taps(taps);
            self.taps = taps;

            let outs = bank.process(in_l, in_r);

            let fb = (
                c.feedback_gain * (outs[0] + outs[1]),
                c.feedback_gain * (outs[2] + outs[3]),
            );
            self.feedback = self.dc_blockers.tick(fb);

            let [s0, s1, s2, s3] = self.saturator.process_quad(outs);
            let mut wet = ((s0 + s1) * c.output_gain, (s2 + s3) * c.output_gain);
            if c.output_filter {
                wet = self.reconstruction.tick(wet);
            }

            *l = wet.0;
            *r = wet.1;
            self.modulation.post_process();
        }
    }

    fn reset(&mut self) {
        self.modulation.reset();
        self.feedback = (0.0, 0.0);
        self.dc_blockers.reset();
        self.reconstruction.reset();
        self.saturator.reset();
        self.saturator.set_drive(DEFAULT_DRIVE);
        for noise in &mut self.noise {
            noise.reset();
        }
        self.taps = [DEFAULT_DELAY; 3];
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.modulation.set_sample_rate(sample_rate);
        self.dc_blockers.set_sample_rate(sample_rate);
        self.saturator.set_sample_rate(sample_rate);
        self.reconstruction.set_sample_rate(sample_rate);
    }
}

/// Stereo BBD ensemble effect.
///
/// ```rust
/// use brigade::ensemble::Ensemble;
/// use brigade::params::EnsembleParams;
///
/// let mut ensemble = Ensemble::new(48000.0).with_params(EnsembleParams::default().with_feedback(0.3));
/// let mut left = vec![0.0; 256];
/// let mut right = vec![0.0; 256];
/// left[0] = 1.0;
/// right[0] = 1.0;
/// ensemble.process_block(&mut left, &mut right);
/// assert!(left.iter().all(|x| x.is_finite()));
/// ```
#[derive(Debug, Clone)]
pub struct Ensemble {
    params: EnsembleParams,
    sample_rate: f64,
    banks: StageBanks,
    state: EnsembleState,
    block_counter: u32,
    block_pos: usize,
}

impl Ensemble {
    pub fn new(sample_rate: f64) -> Self {
        let params = EnsembleParams::default();
        let mut ensemble = Self {
            banks: StageBanks::new(sample_rate),
            state: EnsembleState::new(sample_rate, &params),
            params,
            sample_rate,
            block_counter: 0,
            block_pos: 0,
        };
        ensemble.init();
        ensemble
    }

    /// Builder-style parameter setter
    pub fn with_params(mut self, params: EnsembleParams) -> Self {
        self.set_params(params);
        self
    }

    /// Replace the parameter set; out-of-range values are clamped.
    ///
    /// Takes effect at the next block boundary, including a change of
    /// stage count.
    pub fn set_params(&mut self, params: EnsembleParams) {
        let sanitized = params.sanitized();
        if sanitized != params {
            if let Err(err) = params.validate() {
                warn!("ensemble parameters clamped: {}", err);
            }
        }
        if sanitized.stages != self.params.stages {
            debug!("ensemble switching to {}", sanitized.stages);
        }
        self.params = sanitized;
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Reallocate nothing, re-derive everything that depends on the host
    /// rate, and return to the power-on state.
    pub fn prepare(&mut self, sample_rate: f64) {
        debug!("preparing ensemble at {} Hz", sample_rate);
        self.sample_rate = sample_rate;
        self.banks.for_each(|bank| bank.prepare(sample_rate));
        self.state.set_sample_rate(sample_rate);
        self.init();
    }

    /// Power-on state: lines at 10 kHz / 5 ms, empty feedback, counters zero.
    fn init(&mut self) {
        self.banks.for_each(|bank| bank.init());
        self.state.reset();
        self.block_counter = 0;
        self.block_pos = 0;
    }

    /// Current feedback path gain
    pub fn feedback_gain(&self) -> f64 {
        self.params.feedback_gain()
    }

    /// Delay taps `[t1, t2, t3]` of the most recent sample, seconds
    pub fn taps(&self) -> [f64; 3] {
        self.state.taps
    }

    /// Stage count of the block in progress
    pub fn active_stages(&self) -> StageCount {
        self.state.controls.stages
    }

    /// Cutoff the active delay lines are tuned to
    pub fn anti_alias_cutoff(&self) -> f64 {
        self.banks.get(self.active_stages()).filter_freq()
    }

    /// Delay times of the active lines, L1, L2, R1, R2, seconds
    pub fn delay_times(&self) -> [f64; 4] {
        self.banks.get(self.active_stages()).delay_times()
    }

    fn begin_block(&mut self) {
        self.state.load_controls(&self.params);

        if self.block_counter == RETUNE_INTERVAL - 1 {
            let stages = self.active_stages();
            let cutoff = self.params.anti_alias_cutoff();
            trace!("retuning {} to {:.1} Hz", stages, cutoff);
            self.banks.get_mut(stages).set_filter_freq(cutoff);
            self.block_counter = 0;
        } else {
            self.block_counter += 1;
        }
    }

    /// Process stereo audio in place.
    ///
    /// Buffers may have any length; block boundaries carry across calls, so
    /// splitting a buffer differently gives identical output. Both channels
    /// must be the same length: release builds process only the shorter
    /// one's length and leave the rest of the longer buffer untouched.
    pub fn process_block(&mut self, left: &mut [f64], right: &mut [f64]) {
        debug_assert_eq!(left.len(), right.len());
        let len = left.len().min(right.len());
        let mut start = 0;

        while start < len {
            if self.block_pos == 0 {
                self.begin_block();
            }
            let n = (BLOCK_SIZE - self.block_pos).min(len - start);
            let l = &mut left[start..start + n];
            let r = &mut right[start..start + n];

            let state = &mut self.state;
            let stages = state.controls.stages;
            match stages {
                StageCount::S128 => state.run(&mut self.banks.s128, l, r),
                StageCount::S256 => state.run(&mut self.banks.s256, l, r),
                StageCount::S512 => state.run(&mut self.banks.s512, l, r),
                StageCount::S1024 => state.run(&mut self.banks.s1024, l, r),
                StageCount::S2048 => state.run(&mut self.banks.s2048, l, r),
                StageCount::S4096 => state.run(&mut self.banks.s4096, l, r),
            }

            self.block_pos = (self.block_pos + n) % BLOCK_SIZE;
            start += n;
        }
    }
}

impl Default for Ensemble {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl Module for Ensemble {
    type In = (f64, f64);
    type Out = (f64, f64);

    fn tick(&mut self, (left, right): (f64, f64)) -> (f64, f64) {
        let mut l = [left];
        let mut r = [right];
        self.process_block(&mut l, &mut r);
        (l[0], r[0])
    }

    fn reset(&mut self) {
        self.init();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.prepare(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;
    use core::f64::consts::TAU;

    fn render(ensemble: &mut Ensemble, input: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut left = input.to_vec();
        let mut right = input.to_vec();
        for (l, r) in left.chunks_mut(512).zip(right.chunks_mut(512)) {
            ensemble.process_block(l, r);
        }
        (left, right)
    }

    fn impulse(len: usize) -> Vec<f64> {
        let mut x = vec![0.0; len];
        x[0] = 1.0;
        x
    }

    #[test]
    fn test_defaults() {
        let ensemble = Ensemble::new(48000.0);
        assert_eq!(ensemble.params(), &EnsembleParams::default());
        assert_eq!(ensemble.feedback_gain(), 0.0);
        assert_eq!(ensemble.anti_alias_cutoff(), DEFAULT_FILTER_FREQ);
    }

    #[test]
    fn test_retunes_on_fourth_block() {
        let mut ensemble = Ensemble::new(48000.0);
        let mut l = [0.0; BLOCK_SIZE];
        let mut r = [0.0; BLOCK_SIZE];

        for _ in 0..3 {
            ensemble.process_block(&mut l, &mut r);
            assert_eq!(ensemble.anti_alias_cutoff(), DEFAULT_FILTER_FREQ);
        }
        ensemble.process_block(&mut l, &mut r);
        let expected = ensemble.params().anti_alias_cutoff();
        assert_eq!(ensemble.anti_alias_cutoff(), expected);
    }

    #[test]
    fn test_taps_stay_positive_and_share_middle() {
        let params = EnsembleParams::default().with_lfo_rates(40.0, 40.0).with_lfo_depths(1.0, 1.0);
        let mut ensemble = Ensemble::new(48000.0).with_params(params.clone());
        let center = params.center_delay();

        let mut l = [0.1; 16];
        let mut r = [0.1; 16];
        for _ in 0..600 {
            ensemble.process_block(&mut l, &mut r);
            for t in ensemble.taps() {
                assert!(t >= 0.05 * center - 1e-12, "tap {} below floor", t);
                assert!(t <= 1.95 * center + 1e-12);
            }
        }

        // Middle tap drives both L2 and R1
        let mut e = Ensemble::new(48000.0).with_params(params.with_stages(StageCount::S1024));
        let mut l = [0.0; 100];
        let mut r = [0.0; 100];
        e.process_block(&mut l, &mut r);
        assert_eq!(e.active_stages(), StageCount::S1024);
        let [l1, l2, r1, r2] = e.delay_times();
        assert_eq!(l2, r1);
        assert_ne!(l1, r2);
    }

    #[test]
    fn test_wet_signal_is_delayed() {
        let mut ensemble = Ensemble::new(48000.0);
        let (left, right) = render(&mut ensemble, &impulse(4800));

        // Shortest tap starts near 0.8 ms (about 40 samples)
        assert!(left[..30].iter().all(|v| v.abs() < 1e-9));
        assert!(right[..30].iter().all(|v| v.abs() < 1e-9));
        assert!(left.iter().any(|v| v.abs() > 0.01));
        assert!(right.iter().any(|v| v.abs() > 0.01));
    }

    #[test]
    fn test_max_feedback_decays_monotonically() {
        let sr = 48000.0;
        let mut ensemble = Ensemble::new(sr).with_params(EnsembleParams::default().with_feedback(1.0));
        assert!((ensemble.feedback_gain() - 0.49).abs() < 1e-12);

        let (left, right) = render(&mut ensemble, &impulse(48000));

        let window = 4096;
        let energies: Vec<f64> = left
            .chunks(window)
            .zip(right.chunks(window))
            .take(8)
            .map(|(l, r)| l.iter().chain(r.iter()).map(|v| v * v).sum())
            .collect();
        for pair in energies.windows(2) {
            assert!(pair[1] < pair[0], "energy rose: {:?}", energies);
        }

        // Below -60 dBFS well within half a second
        let late = 4 * window;
        assert!(left[late..].iter().chain(right[late..].iter()).all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn test_stability_over_random_parameters() {
        let mut rng = Rng::from_seed(0xbbd);
        let sr = 48000.0;

        for _ in 0..8 {
            let stages = StageCount::ALL[(rng.next_u64() % 6) as usize];
            let params = EnsembleParams::default()
                .with_stages(stages)
                .with_clock_rate(rng.range(1.0, 100.0))
                .with_lfo_rates(rng.range(0.005, 40.0), rng.range(0.005, 40.0))
                .with_lfo_depths(rng.next_f64(), rng.next_f64())
                .with_saturation(rng.next_f64())
                .with_feedback(rng.next_f64())
                .with_anti_alias_pitch(rng.range(0.0, 70.0));
            let mut ensemble = Ensemble::new(sr).with_params(params.clone());

            let input: Vec<f64> = (0..6000).map(|_| rng.next_f64_bipolar()).collect();
            let (left, right) = render(&mut ensemble, &input);

            for v in left.iter().chain(right.iter()) {
                assert!(v.is_finite() && v.abs() < 4.0, "{} with {:?}", v, params);
            }
        }
    }

    #[test]
    fn test_full_scale_square_with_feedback_stays_bounded() {
        let params = EnsembleParams::default()
            .with_stages(StageCount::S128)
            .with_clock_rate(100.0)
            .with_feedback(1.0)
            .with_output_filter(None);
        let mut ensemble = Ensemble::new(48000.0).with_params(params);
        let input: Vec<f64> = (0..48000).map(|i| if (i / 24) % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (left, right) = render(&mut ensemble, &input);
        assert!(left.iter().chain(right.iter()).all(|v| v.is_finite() && v.abs() < 4.0));
    }

    #[test]
    fn test_deterministic() {
        let params = EnsembleParams::default().with_feedback(0.5).with_saturation(0.7);
        let input: Vec<f64> = (0..9000).map(|i| (TAU * 330.0 * i as f64 / 48000.0).sin()).collect();

        let mut a = Ensemble::new(48000.0).with_params(params.clone());
        let mut b = Ensemble::new(48000.0).with_params(params);
        let out_a = render(&mut a, &input);
        let out_b = render(&mut b, &input);

        assert!(out_a.0.iter().zip(out_b.0.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
        assert!(out_a.1.iter().zip(out_b.1.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_block_splitting_does_not_change_output() {
        let input: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.03).sin()).collect();

        let mut whole = Ensemble::new(48000.0);
        let mut l1 = input.clone();
        let mut r1 = input.clone();
        whole.process_block(&mut l1, &mut r1);

        let mut per_sample = Ensemble::new(48000.0);
        let out: Vec<(f64, f64)> = input.iter().map(|&x| per_sample.tick((x, x))).collect();

        for (i, (l, r)) in out.iter().enumerate() {
            assert_eq!(l.to_bits(), l1[i].to_bits());
            assert_eq!(r.to_bits(), r1[i].to_bits());
        }
    }

    #[test]
    fn test_output_filter_bypass_changes_output() {
        let input: Vec<f64> = (0..4800).map(|i| if i % 3 == 0 { 0.8 } else { -0.4 }).collect();

        let mut filtered = Ensemble::new(48000.0);
        let mut bypassed = Ensemble::new(48000.0)
            .with_params(EnsembleParams::default().with_output_filter(None));
        let a = render(&mut filtered, &input).0;
        let b = render(&mut bypassed, &input).0;

        // The lowpass removes the 16 kHz content of the input pattern
        let hf = |x: &[f64]| x.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>();
        assert!(hf(&a[2400..]) < hf(&b[2400..]));
    }

    #[test]
    fn test_set_params_clamps() {
        let mut ensemble = Ensemble::new(48000.0);
        ensemble.set_params(EnsembleParams::default().with_feedback(2.0).with_clock_rate(-1.0));
        assert_eq!(ensemble.params().feedback, 1.0);
        assert_eq!(ensemble.params().clock_rate_khz, 1.0);
    }

    #[test]
    fn test_stage_switch_mid_stream() {
        let mut ensemble = Ensemble::new(48000.0);
        let input: Vec<f64> = (0..2048).map(|i| (i as f64 * 0.05).sin()).collect();
        render(&mut ensemble, &input);

        ensemble.set_params(EnsembleParams::default().with_stages(StageCount::S4096));
        let (left, _) = render(&mut ensemble, &input);
        assert!(left.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_stage_switch_waits_for_block_boundary() {
        let input: Vec<f64> = (0..6000).map(|i| 0.5 * (i as f64 * 0.031).sin()).collect();
        let switched = EnsembleParams::default().with_stages(StageCount::S1024);

        let run = |switch_at: usize| {
            let mut ensemble = Ensemble::new(48000.0);
            let mut left = input.clone();
            let mut right = input.clone();
            let (l0, l1) = left.split_at_mut(switch_at);
            let (r0, r1) = right.split_at_mut(switch_at);
            ensemble.process_block(l0, r0);

            ensemble.set_params(switched.clone());
            if switch_at % BLOCK_SIZE != 0 {
                // Still mid-block: the old variant keeps running
                assert_eq!(ensemble.active_stages(), StageCount::S256);
            }
            ensemble.process_block(l1, r1);
            assert_eq!(ensemble.active_stages(), StageCount::S1024);
            (left, right)
        };

        // 3010 is 2 samples into a block, 3040 is the next boundary
        let mid_block = run(3010);
        let at_boundary = run(3040);
        for (a, b) in mid_block.0.iter().zip(at_boundary.0.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in mid_block.1.iter().zip(at_boundary.1.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_mismatched_buffer_lengths_panic_in_debug() {
        let mut ensemble = Ensemble::new(48000.0);
        let mut left = [0.0; 64];
        let mut right = [0.0; 48];
        ensemble.process_block(&mut left, &mut right);
    }

    #[test]
    fn test_reset_returns_to_silence() {
        let mut ensemble = Ensemble::new(48000.0).with_params(EnsembleParams::default().with_feedback(0.8));
        let input: Vec<f64> = (0..4000).map(|i| (i as f64 * 0.02).sin()).collect();
        render(&mut ensemble, &input);

        ensemble.reset();
        assert_eq!(ensemble.anti_alias_cutoff(), DEFAULT_FILTER_FREQ);
        let (left, right) = render(&mut ensemble, &[0.0; 2000]);
        assert!(left.iter().chain(right.iter()).all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_prepare_changes_rate() {
        let mut ensemble = Ensemble::new(44100.0);
        ensemble.prepare(96000.0);
        assert_eq!(ensemble.sample_rate(), 96000.0);
        let (left, _) = render(&mut ensemble, &impulse(9600));
        assert!(left.iter().all(|v| v.is_finite()));
        assert!(left.iter().any(|v| v.abs() > 0.01));
    }
}
