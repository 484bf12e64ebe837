//! # Brigade: Bucket-Brigade Delay Emulation
//!
//! `brigade` models analog bucket-brigade delay (BBD) chips and the stereo
//! chorus/ensemble circuits built around them. The delay line is not a
//! fractional-delay buffer: it runs its own clock, samples the input through a
//! continuous-time anti-aliasing filter at each clock tick, shifts charge
//! through `N` buckets and reconstructs the output through a second
//! continuous-time filter. Clock rate, delay time and filter character all
//! interact the way they do on the real chip.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: Complex filter banks** - [`lane`] holds four complex values per
//!   operation; [`filter_bank`] builds the input and output filters as sums of
//!   first-order complex sections evaluated at arbitrary instants
//! - **Layer 2: Delay line** - [`delay_line::BbdDelayLine`] drives both banks
//!   from a bucket clock derived from the requested delay time
//! - **Layer 3: Ensemble** - [`ensemble::Ensemble`] runs four delay lines with
//!   LFO-modulated taps, feedback, saturation and output filtering
//!
//! Supporting stages ([`filters`], [`analog`], [`modulation`]) implement the
//! same [`Module`] trait and compose with the combinators in [`combinator`].
//! The output saturation is a small wave digital circuit built from the
//! elements in [`wdf`].
//!
//! ## Quick Start
//!
//! ```rust
//! use brigade::prelude::*;
//!
//! let params = EnsembleParams::default()
//!     .with_stages(StageCount::S512)
//!     .with_feedback(0.4);
//! let mut ensemble = Ensemble::new(48000.0).with_params(params);
//!
//! let mut left = vec![0.0; 512];
//! let mut right = vec![0.0; 512];
//! left[0] = 1.0;
//! ensemble.process_block(&mut left, &mut right);
//!
//! // A single mono delay line
//! let mut line = BbdDelayLine::<1024>::new(48000.0);
//! line.set_delay_time(0.02);
//! let y = line.process(0.5);
//! assert!(y.is_finite());
//! ```

extern crate alloc;

pub mod analog;
pub mod combinator;
pub mod delay_line;
pub mod ensemble;
pub mod filter_bank;
pub mod filters;
pub mod lane;
pub mod modulation;
pub mod params;
pub mod rng;
pub mod wdf;

/// Prelude module for convenient imports
pub mod prelude {
    // Combinators
    pub use crate::combinator::{Chain, Map, Module, ModuleExt, Parallel};

    // Complex arithmetic
    pub use crate::lane::{fast_exp, ComplexLane, LANES};

    // Filter banks
    pub use crate::filter_bank::{
        FilterSpec, InputFilterBank, OutputFilterBank, INPUT_FILTER, OUTPUT_FILTER,
    };

    // Delay line
    pub use crate::delay_line::BbdDelayLine;

    // Ensemble
    pub use crate::ensemble::{DelayBank, DelayQuad, Ensemble, BLOCK_SIZE};
    pub use crate::params::{EnsembleParams, ParamError, StageCount};

    // Supporting stages
    pub use crate::analog::{saturation, OutputStage, Saturator};
    pub use crate::filters::{Biquad, DcBlocker, FilterKind};
    pub use crate::modulation::{Lfo, ModulationPair};
    pub use crate::rng::{NoiseFloor, Rng};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
