//! # Processing Modules and Composition
//!
//! Every stateful stage in the engine (delay lines, filter sections, the
//! saturator, the whole ensemble) implements [`Module`]: one input sample in,
//! one output sample out, with state carried between calls.
//!
//! Small stages compose with [`ModuleExt`]:
//!
//! ```text
//! a.then(b)        // serial:   b(a(x))
//! a.parallel(b)    // dual-mono: (a(l), b(r))
//! a.map(f)         // post-map: f(a(x))
//! ```
//!
//! Composition is monomorphized, so a chain compiles to the same code as the
//! hand-written nested calls.
//!
//! ## Example
//!
//! ```rust
//! use brigade::combinator::{Module, ModuleExt};
//! use brigade::filters::Biquad;
//!
//! let sr = 48000.0;
//! let mut band = Biquad::highpass(sr, 200.0, 0.7071).then(Biquad::lowpass(sr, 4000.0, 0.7071));
//! let y = band.tick(1.0);
//! assert!(y.is_finite());
//! ```

/// A signal processing module with typed input and output.
///
/// Modules are **stateful processors**: `tick` computes one step of the
/// transformation and may update internal state (filter memory, bucket
/// contents, oscillator phase).
///
/// # Thread Safety
///
/// All modules must be `Send` so they can be moved onto the audio thread.
pub trait Module: Send {
    /// Input signal type (e.g., `f64` for mono, `(f64, f64)` for stereo)
    type In;
    /// Output signal type
    type Out;

    /// Process a single sample, advancing internal state by one time step.
    fn tick(&mut self, input: Self::In) -> Self::Out;

    /// Process a block of samples.
    ///
    /// The default implementation calls `tick` in a loop; modules with
    /// per-block bookkeeping may override it.
    fn process(&mut self, input: &[Self::In], output: &mut [Self::Out])
    where
        Self::In: Clone,
    {
        for (i, o) in input.iter().zip(output.iter_mut()) {
            *o = self.tick(i.clone());
        }
    }

    /// Reset internal state to initial conditions without reallocating.
    fn reset(&mut self);

    /// Notify module of sample rate changes.
    ///
    /// Modules with time-dependent behavior recalculate coefficients here.
    fn set_sample_rate(&mut self, _sample_rate: f64) {}
}

/// Extension trait providing combinator methods for all modules
pub trait ModuleExt: Module + Sized {
    /// Chain this module with another (sequential composition)
    fn then<M: Module<In = Self::Out>>(self, next: M) -> Chain<Self, M> {
        Chain {
            first: self,
            second: next,
        }
    }

    /// Run two modules side by side on a tuple input
    fn parallel<M: Module>(self, other: M) -> Parallel<Self, M> {
        Parallel {
            left: self,
            right: other,
        }
    }

    /// Transform output with a pure function
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Out) -> U,
    {
        Map { module: self, f }
    }
}

// Blanket implementation for all modules
impl<M: Module> ModuleExt for M {}

/// Sequential composition: processes through first module, then second
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Module for Chain<A, B>
where
    A: Module,
    B: Module<In = A::Out>,
{
    type In = A::In;
    type Out = B::Out;

    #[inline]
    fn tick(&mut self, input: Self::In) -> Self::Out {
        self.second.tick(self.first.tick(input))
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.first.set_sample_rate(sample_rate);
        self.second.set_sample_rate(sample_rate);
    }
}

/// Parallel composition: two independent signals, one module each
#[derive(Debug, Clone)]
pub struct Parallel<A, B> {
    pub left: A,
    pub right: B,
}

impl<A, B> Module for Parallel<A, B>
where
    A: Module,
    B: Module,
{
    type In = (A::In, B::In);
    type Out = (A::Out, B::Out);

    #[inline]
    fn tick(&mut self, (a, b): Self::In) -> Self::Out {
        (self.left.tick(a), self.right.tick(b))
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.left.set_sample_rate(sample_rate);
        self.right.set_sample_rate(sample_rate);
    }
}

/// Transform output with a pure function
pub struct Map<M, F> {
    pub module: M,
    pub f: F,
}

impl<M, F, U> Module for Map<M, F>
where
    M: Module,
    F: Fn(M::Out) -> U + Send,
{
    type In = M::In;
    type Out = U;

    #[inline]
    fn tick(&mut self, input: Self::In) -> Self::Out {
        (self.f)(self.module.tick(input))
    }

    fn reset(&mut self) {
        self.module.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.module.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Simple test module that multiplies by a constant
    struct Gain {
        factor: f64,
    }

    impl Module for Gain {
        type In = f64;
        type Out = f64;

        fn tick(&mut self, input: Self::In) -> Self::Out {
            input * self.factor
        }

        fn reset(&mut self) {}
    }

    // Counts samples so reset propagation is observable
    struct Counter {
        count: u32,
    }

    impl Module for Counter {
        type In = f64;
        type Out = f64;

        fn tick(&mut self, input: Self::In) -> Self::Out {
            self.count += 1;
            input
        }

        fn reset(&mut self) {
            self.count = 0;
        }
    }

    #[test]
    fn test_chain() {
        let mut chain = Gain { factor: 2.0 }.then(Gain { factor: 3.0 });
        assert!((chain.tick(1.0) - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_parallel() {
        let mut par = Gain { factor: 2.0 }.parallel(Gain { factor: 3.0 });
        let (a, b) = par.tick((1.0, 1.0));
        assert!((a - 2.0).abs() < 1e-10);
        assert!((b - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_map() {
        let mut mapped = Gain { factor: 2.0 }.map(|x| x + 1.0);
        assert!((mapped.tick(1.0) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_default_block_process() {
        let mut gain = Gain { factor: 0.5 };
        let input = [1.0, 2.0, 4.0];
        let mut output = [0.0; 3];
        gain.process(&input, &mut output);
        assert_eq!(output, [0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_reset_propagates() {
        let mut chain = Counter { count: 0 }.then(Counter { count: 0 });
        chain.tick(1.0);
        chain.tick(1.0);
        assert_eq!(chain.first.count, 2);
        chain.reset();
        assert_eq!(chain.first.count, 0);
        assert_eq!(chain.second.count, 0);
    }
}
