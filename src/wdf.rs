//! # Wave Digital Filter Elements
//!
//! One-port elements and three-port adaptors for building small wave digital
//! filter (WDF) trees, plus a diode root solved in closed form with the
//! Wright omega function.
//!
//! A tree is built bottom-up from nested adaptors, so its whole shape is a
//! concrete type and every sample is a fixed sequence of inlined calls:
//!
//! 1. [`WdfPort::reflected`] on the top adaptor gathers waves leaves-up
//! 2. the root turns that wave into its own reflection
//! 3. [`WdfPort::incident`] on the top adaptor scatters it back down
//!
//! Waves are voltage waves: `a = v + R·i`, `b = v - R·i`, so every port's
//! voltage is `(a + b) / 2`.

/// One port of a WDF tree, seen from its parent adaptor.
pub trait WdfPort: Send {
    /// Port resistance seen looking into this element, ohms
    fn port_resistance(&self) -> f64;

    /// Compute and latch the wave this port sends upward
    fn reflected(&mut self) -> f64;

    /// Wave latched by the last call to [`WdfPort::reflected`]
    fn last_reflected(&self) -> f64;

    /// Accept the wave coming down from the parent
    fn incident(&mut self, a: f64);

    /// Recompute rate-dependent impedances (reactive elements, adaptors)
    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    /// Clear stored waves
    fn reset(&mut self) {}
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// Resistor, a matched termination: `b = 0`.
#[derive(Debug, Clone, Copy)]
pub struct Resistor {
    resistance: f64,
}

impl Resistor {
    pub fn new(resistance: f64) -> Self {
        Self { resistance }
    }
}

impl WdfPort for Resistor {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        0.0
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        0.0
    }

    #[inline]
    fn incident(&mut self, _a: f64) {}
}

/// Capacitor discretized with the alpha transform.
///
/// `alpha = 1` is the bilinear transform and `alpha = 0` backward Euler;
/// values in between damp the Nyquist ringing of the bilinear version.
///
/// ```text
/// R = 1 / ((1 + α) · fs · C)
/// b[n] = (1 - α)/2 · b[n-1] + (1 + α)/2 · a[n-1]
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Capacitor {
    capacitance: f64,
    alpha: f64,
    resistance: f64,
    a: f64,
    b: f64,
}

impl Capacitor {
    pub fn new(capacitance: f64, sample_rate: f64, alpha: f64) -> Self {
        Self {
            capacitance,
            alpha,
            resistance: Self::impedance(capacitance, sample_rate, alpha),
            a: 0.0,
            b: 0.0,
        }
    }

    fn impedance(capacitance: f64, sample_rate: f64, alpha: f64) -> f64 {
        1.0 / ((1.0 + alpha) * capacitance * sample_rate)
    }

    /// Voltage across the capacitor after the last scatter
    #[inline]
    pub fn voltage(&self) -> f64 {
        0.5 * (self.a + self.b)
    }
}

impl WdfPort for Capacitor {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.b = 0.5 * (1.0 - self.alpha) * self.b + 0.5 * (1.0 + self.alpha) * self.a;
        self.b
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        self.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.a = a;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.resistance = Self::impedance(self.capacitance, sample_rate, self.alpha);
    }

    fn reset(&mut self) {
        self.a = 0.0;
        self.b = 0.0;
    }
}

/// Voltage source with a series resistance: `b = Vs`.
#[derive(Debug, Clone, Copy)]
pub struct ResistiveVoltageSource {
    resistance: f64,
    voltage: f64,
}

impl ResistiveVoltageSource {
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            voltage: 0.0,
        }
    }

    #[inline]
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }
}

impl WdfPort for ResistiveVoltageSource {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.voltage
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        self.voltage
    }

    #[inline]
    fn incident(&mut self, _a: f64) {}

    fn reset(&mut self) {
        self.voltage = 0.0;
    }
}

/// Current source with a parallel resistance: `b = 2·R·Is`.
#[derive(Debug, Clone, Copy)]
pub struct ResistiveCurrentSource {
    resistance: f64,
    current: f64,
}

impl ResistiveCurrentSource {
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            current: 0.0,
        }
    }

    #[inline]
    pub fn set_current(&mut self, current: f64) {
        self.current = current;
    }
}

impl WdfPort for ResistiveCurrentSource {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        2.0 * self.resistance * self.current
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        2.0 * self.resistance * self.current
    }

    #[inline]
    fn incident(&mut self, _a: f64) {}

    fn reset(&mut self) {
        self.current = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Adaptors
// ---------------------------------------------------------------------------

/// Swaps the terminals of the wrapped port.
#[derive(Debug, Clone, Copy)]
pub struct Inverter<P> {
    pub port: P,
}

impl<P: WdfPort> Inverter<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }
}

impl<P: WdfPort> WdfPort for Inverter<P> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.port.port_resistance()
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        -self.port.reflected()
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        -self.port.last_reflected()
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.port.incident(-a);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.port.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        self.port.reset();
    }
}

/// Three-port series adaptor: `R = R1 + R2`.
#[derive(Debug, Clone, Copy)]
pub struct WdfSeries<P1, P2> {
    pub port1: P1,
    pub port2: P2,
    resistance: f64,
    port1_reflect: f64,
    port2_reflect: f64,
    b: f64,
}

impl<P1: WdfPort, P2: WdfPort> WdfSeries<P1, P2> {
    pub fn new(port1: P1, port2: P2) -> Self {
        let mut adaptor = Self {
            port1,
            port2,
            resistance: 0.0,
            port1_reflect: 0.0,
            port2_reflect: 0.0,
            b: 0.0,
        };
        adaptor.update_impedance();
        adaptor
    }

    fn update_impedance(&mut self) {
        let r1 = self.port1.port_resistance();
        let r2 = self.port2.port_resistance();
        self.resistance = r1 + r2;
        self.port1_reflect = r1 / self.resistance;
        self.port2_reflect = r2 / self.resistance;
    }
}

impl<P1: WdfPort, P2: WdfPort> WdfPort for WdfSeries<P1, P2> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.b = -(self.port1.reflected() + self.port2.reflected());
        self.b
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        self.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        let b1 = self.port1.last_reflected();
        let b2 = self.port2.last_reflected();
        let sum = a + b1 + b2;
        self.port1.incident(b1 - self.port1_reflect * sum);
        self.port2.incident(b2 - self.port2_reflect * sum);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.port1.set_sample_rate(sample_rate);
        self.port2.set_sample_rate(sample_rate);
        self.update_impedance();
    }

    fn reset(&mut self) {
        self.port1.reset();
        self.port2.reset();
        self.b = 0.0;
    }
}

/// Three-port parallel adaptor: `G = G1 + G2`.
#[derive(Debug, Clone, Copy)]
pub struct WdfParallel<P1, P2> {
    pub port1: P1,
    pub port2: P2,
    resistance: f64,
    port1_reflect: f64,
    port2_reflect: f64,
    b: f64,
}

impl<P1: WdfPort, P2: WdfPort> WdfParallel<P1, P2> {
    pub fn new(port1: P1, port2: P2) -> Self {
        let mut adaptor = Self {
            port1,
            port2,
            resistance: 0.0,
            port1_reflect: 0.0,
            port2_reflect: 0.0,
            b: 0.0,
        };
        adaptor.update_impedance();
        adaptor
    }

    fn update_impedance(&mut self) {
        let g1 = 1.0 / self.port1.port_resistance();
        let g2 = 1.0 / self.port2.port_resistance();
        let g = g1 + g2;
        self.resistance = 1.0 / g;
        self.port1_reflect = g1 / g;
        self.port2_reflect = g2 / g;
    }
}

impl<P1: WdfPort, P2: WdfPort> WdfPort for WdfParallel<P1, P2> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.b = self.port1_reflect * self.port1.reflected()
            + self.port2_reflect * self.port2.reflected();
        self.b
    }

    #[inline]
    fn last_reflected(&self) -> f64 {
        self.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        let diff = self.port2.last_reflected() - self.port1.last_reflected();
        self.port1.incident(a + diff * self.port2_reflect);
        self.port2.incident(a - diff * self.port1_reflect);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.port1.set_sample_rate(sample_rate);
        self.port2.set_sample_rate(sample_rate);
        self.update_impedance();
    }

    fn reset(&mut self) {
        self.port1.reset();
        self.port2.reset();
        self.b = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Shockley diode terminating a tree, solved without iteration.
///
/// With `R` the port resistance of the tree below:
///
/// ```text
/// b = a + 2·R·Is - 2·Vt·ω(ln(R·Is/Vt) + (a + R·Is)/Vt)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DiodeRoot {
    saturation_current: f64,
    thermal_voltage: f64,
    r_is: f64,
    log_r_is: f64,
}

impl DiodeRoot {
    pub fn new(saturation_current: f64, thermal_voltage: f64, port_resistance: f64) -> Self {
        let mut diode = Self {
            saturation_current,
            thermal_voltage,
            r_is: 0.0,
            log_r_is: 0.0,
        };
        diode.connect(port_resistance);
        diode
    }

    /// Precompute the terms that only change with the tree impedance
    pub fn connect(&mut self, port_resistance: f64) {
        self.r_is = port_resistance * self.saturation_current;
        self.log_r_is = libm::log(self.r_is / self.thermal_voltage);
    }

    /// Reflected wave for incident wave `a`
    #[inline]
    pub fn reflect(&self, a: f64) -> f64 {
        let vt = self.thermal_voltage;
        let w = wright_omega(self.log_r_is + (a + self.r_is) / vt);
        a + 2.0 * self.r_is - 2.0 * vt * w
    }
}

/// Wright omega function `ω(x)`, the solution of `ω + ln ω = x`.
///
/// Piecewise cubic first guess refined by two Newton steps, within about
/// `3e-4` relative error across the real line.
#[inline]
pub fn wright_omega(x: f64) -> f64 {
    const X1: f64 = -3.341459552768620;
    const X2: f64 = 8.0;
    const A: f64 = -1.314293149877800e-3;
    const B: f64 = 4.775931364975583e-2;
    const C: f64 = 3.631952663804445e-1;
    const D: f64 = 6.313183464296682e-1;

    let mut y = if x < X1 {
        0.0
    } else if x < X2 {
        D + x * (C + x * (B + x * A))
    } else {
        x - libm::log(x)
    };

    for _ in 0..2 {
        y -= (y - libm::exp(x - y)) / (y + 1.0);
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FS: f64 = 48000.0;

    #[test]
    fn test_wright_omega_solves_its_equation() {
        for x in [-2.0, -0.5, 0.0, 1.0, 3.0, 7.5, 12.0, 40.0] {
            let w = wright_omega(x);
            assert!(w > 0.0);
            assert_relative_eq!(w + w.ln(), x, epsilon = 5e-3, max_relative = 1e-3);
        }
        assert_relative_eq!(wright_omega(1.0), 1.0, epsilon = 2e-3);
    }

    #[test]
    fn test_wright_omega_far_negative_is_exponential() {
        // ω(x) → e^x as x → -∞
        assert_relative_eq!(wright_omega(-12.0), (-12.0f64).exp(), max_relative = 1e-3);
    }

    #[test]
    fn test_capacitor_impedance_follows_rate() {
        let mut c = Capacitor::new(1e-6, FS, 1.0);
        assert_relative_eq!(c.port_resistance(), 1.0 / (2.0 * 1e-6 * FS), max_relative = 1e-12);
        c.set_sample_rate(2.0 * FS);
        assert_relative_eq!(c.port_resistance(), 1.0 / (4.0 * 1e-6 * FS), max_relative = 1e-12);
    }

    #[test]
    fn test_adaptor_impedances() {
        let series = WdfSeries::new(Resistor::new(1000.0), Resistor::new(2000.0));
        assert_relative_eq!(series.port_resistance(), 3000.0);

        let parallel = WdfParallel::new(Resistor::new(1000.0), Resistor::new(1000.0));
        assert_relative_eq!(parallel.port_resistance(), 500.0);
    }

    #[test]
    fn test_rc_lowpass_step_response() {
        // Source through R into C, closed by a short circuit (b = -a)
        let r = 1000.0;
        let cap = 1e-6;
        let mut tree = WdfSeries::new(
            ResistiveVoltageSource::new(r),
            Capacitor::new(cap, FS, 1.0),
        );

        let tau = r * cap;
        let mut v = 0.0;
        let n = (5.0 * tau * FS) as usize;
        for _ in 0..n {
            tree.port1.set_voltage(1.0);
            let a = tree.reflected();
            tree.incident(-a);
            v = tree.port2.voltage();
        }
        // Around the shorted loop the capacitor charges toward -Vs
        assert_relative_eq!(v.abs(), 1.0 - (-5.0f64).exp(), epsilon = 0.01);
    }

    #[test]
    fn test_diode_root_matches_shockley() {
        let is = 1e-10;
        let vt = 0.02585;
        let r = 2700.0;
        let diode = DiodeRoot::new(is, vt, r);

        for a in [-1.0, 0.0, 0.3, 1.0, 2.0] {
            let b = diode.reflect(a);
            let v = 0.5 * (a + b);
            let i = 0.5 * (a - b) / r;
            let shockley = is * ((v / vt).exp() - 1.0);
            assert_relative_eq!(i, shockley, epsilon = 1e-9, max_relative = 1e-2);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tree = WdfParallel::new(Capacitor::new(1e-9, FS, 0.4), Resistor::new(1e3));
        tree.incident(1.0);
        tree.reflected();
        assert!(tree.last_reflected() != 0.0);
        tree.reset();
        assert_eq!(tree.last_reflected(), 0.0);
        assert_eq!(tree.reflected(), 0.0);
    }
}
