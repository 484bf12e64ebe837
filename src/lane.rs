//! # Four-Lane Complex Arithmetic
//!
//! The BBD filter banks are four parallel one-pole complex sections. Every
//! piece of bank state (integrator, gain factor, rotation increment) is a
//! group of four complex numbers that is always updated elementwise, so it is
//! stored as a [`ComplexLane`]: a plain `[Complex64; 4]` with operator impls
//! the compiler can vectorize on its own.
//!
//! Only real parts ever leave a lane as audio, through [`ComplexLane::real_sum`].

use core::f64::consts::{PI, TAU};
use core::ops::{Add, AddAssign, Mul, MulAssign, Sub};
use num_complex::Complex64;

/// Number of complex sections per lane
pub const LANES: usize = 4;

/// Four complex values updated in lockstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexLane(pub [Complex64; LANES]);

impl ComplexLane {
    /// All lanes zero
    pub const ZERO: Self = Self([Complex64::new(0.0, 0.0); LANES]);

    /// All lanes one
    pub const ONE: Self = Self([Complex64::new(1.0, 0.0); LANES]);

    #[inline]
    pub const fn new(values: [Complex64; LANES]) -> Self {
        Self(values)
    }

    /// The same value in every lane
    #[inline]
    pub const fn splat(value: Complex64) -> Self {
        Self([value; LANES])
    }

    /// Build a lane from real and imaginary parts
    #[inline]
    pub fn from_parts(re: [f64; LANES], im: [f64; LANES]) -> Self {
        Self(core::array::from_fn(|i| Complex64::new(re[i], im[i])))
    }

    /// Real parts of each lane
    #[inline]
    pub fn re(&self) -> [f64; LANES] {
        core::array::from_fn(|i| self.0[i].re)
    }

    /// Imaginary parts of each lane
    #[inline]
    pub fn im(&self) -> [f64; LANES] {
        core::array::from_fn(|i| self.0[i].im)
    }

    /// Apply a function to every lane
    #[inline]
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(Complex64) -> Complex64,
    {
        Self(self.0.map(f))
    }

    /// Combine two lanes elementwise
    #[inline]
    pub fn zip_with<F>(self, other: Self, f: F) -> Self
    where
        F: Fn(Complex64, Complex64) -> Complex64,
    {
        Self(core::array::from_fn(|i| f(self.0[i], other.0[i])))
    }

    /// Raise every lane to a real power (principal branch)
    #[inline]
    pub fn powf(self, exponent: f64) -> Self {
        self.map(|z| z.powf(exponent))
    }

    /// Exact complex exponential of every lane
    #[inline]
    pub fn exp(self) -> Self {
        self.map(|z| z.exp())
    }

    /// Argument (phase angle) of every lane, in `(-π, π]`
    #[inline]
    pub fn arg(&self) -> [f64; LANES] {
        core::array::from_fn(|i| self.0[i].arg())
    }

    /// Horizontal complex sum of the four lanes
    #[inline]
    pub fn sum(&self) -> Complex64 {
        self.0[0] + self.0[1] + self.0[2] + self.0[3]
    }

    /// Horizontal sum of the real parts
    #[inline]
    pub fn real_sum(&self) -> f64 {
        self.0[0].re + self.0[1].re + self.0[2].re + self.0[3].re
    }

    /// `Σ Re(self · other)` without materializing the product lane
    #[inline]
    pub fn dot_real(&self, other: &Self) -> f64 {
        let mut acc = 0.0;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            acc += a.re * b.re - a.im * b.im;
        }
        acc
    }
}

impl Default for ComplexLane {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for ComplexLane {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Sub for ComplexLane {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl Mul for ComplexLane {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.zip_with(rhs, |a, b| a * b)
    }
}

impl Mul<f64> for ComplexLane {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        self.map(|a| a * rhs)
    }
}

impl Add<f64> for ComplexLane {
    type Output = Self;

    /// Adds a real scalar to every lane
    #[inline]
    fn add(self, rhs: f64) -> Self {
        self.map(|a| a + rhs)
    }
}

impl AddAssign for ComplexLane {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += *b;
        }
    }
}

impl MulAssign for ComplexLane {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a *= *b;
        }
    }
}

/// Fast approximation of `exp(jθ)` for a real angle.
///
/// The angle is wrapped into `[-π, π)` and cosine/sine come from two
/// rational approximations, each accurate to about `1e-5` over the whole
/// period. No transcendental function is called, so this is cheap enough
/// for the per-sample rotation updates in the filter banks.
#[inline]
pub fn fast_exp(theta: f64) -> Complex64 {
    let x = theta - TAU * libm::floor((theta + PI) / TAU);
    let x2 = x * x;

    let cos = -(-39251520.0 + x2 * (18471600.0 + x2 * (-1075032.0 + 14615.0 * x2)))
        / (39251520.0 + x2 * (1154160.0 + x2 * (16632.0 + x2 * 127.0)));
    let sin = -x * (-11511339840.0 + x2 * (1640635920.0 + x2 * (-52785432.0 + x2 * 479249.0)))
        / (11511339840.0 + x2 * (277920720.0 + x2 * (3177720.0 + x2 * 18361.0)));

    Complex64::new(cos, sin)
}

/// [`fast_exp`] applied to four angles at once.
#[inline]
pub fn fast_exp_lane(theta: [f64; LANES]) -> ComplexLane {
    ComplexLane(theta.map(fast_exp))
}
