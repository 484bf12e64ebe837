//! Analog Nonlinearities
//!
//! The soft clipper ahead of the bucket chain and the [`Saturator`] that
//! colours the four delay outputs with a circuit model of the BBD output
//! transistor.

use crate::combinator::Module;
use crate::wdf::{
    Capacitor, DiodeRoot, Inverter, ResistiveCurrentSource, ResistiveVoltageSource, Resistor,
    WdfParallel, WdfPort, WdfSeries,
};

/// Static waveshaping functions
pub mod saturation {
    /// Input clip limit of [`soft_clip`]
    pub const SOFT_CLIP_LIMIT: f64 = 1.5;

    /// Cubic soft clipper, `x - 4/27·x³` on `[-1.5, 1.5]`.
    ///
    /// Reaches exactly ±1 with zero slope at the clip limit, so the output
    /// never exceeds unity for any input.
    #[inline]
    pub fn soft_clip(x: f64) -> f64 {
        let x = x.clamp(-SOFT_CLIP_LIMIT, SOFT_CLIP_LIMIT);
        x - (4.0 / 27.0) * x * x * x
    }
}

// Component values of the output stage
const GATE_RESISTANCE: f64 = 2.7e3;
const GATE_SOURCE_CAP: f64 = 1.6e-12;
const GATE_DRAIN_CAP: f64 = 1.7e-12;
const DRAIN_SOURCE_CAP: f64 = 0.33e-12;
const INPUT_RESISTANCE: f64 = 1.0e-9;
const LEAKAGE_RESISTANCE: f64 = 1.0e9;
const CAP_ALPHA: f64 = 0.4;

const DIODE_IS: f64 = 1.0e-10;
const DIODE_VT: f64 = 0.02585;

// Leakage current law, `sign(x)·2 nA·|x|^0.33`
const LEAKAGE_SCALE: f64 = 2.0e-9;
const LEAKAGE_EXPONENT: f64 = 0.33;
const LEAKAGE_RANGE: f64 = 5.0;
const LEAKAGE_STEP: f64 = 2.0 * LEAKAGE_RANGE / 65536.0;

/// Drive the ensemble starts with
pub const DEFAULT_DRIVE: f64 = 0.5;

/// Gate resistor in series with the gate node network:
///
/// ```text
/// Rg ─ ( -Vin ‖ ( Cgs ‖ ( Cgd ─ ( Cds ‖ I_leak ) ) ) )
/// ```
type StageTree = WdfSeries<
    Resistor,
    WdfParallel<
        Inverter<ResistiveVoltageSource>,
        WdfParallel<
            Capacitor,
            WdfSeries<Capacitor, WdfParallel<Capacitor, ResistiveCurrentSource>>,
        >,
    >,
>;

/// Wave-digital model of the transistor that buffers a BBD output.
///
/// The delay output drives the gate through a resistor; the three
/// inter-electrode capacitances, a gate diode and a leakage current that
/// depends on both gate and drain voltage shape what reaches the drain. The
/// capacitor states make the response depend on frequency: low frequencies
/// are lifted and compressed, high frequencies pass a little below unity.
///
/// Input is the gate voltage, output the drain voltage.
#[derive(Debug, Clone)]
pub struct OutputStage {
    tree: StageTree,
    diode: DiodeRoot,
    drain: f64,
}

impl OutputStage {
    pub fn new(sample_rate: f64) -> Self {
        let cap = |c: f64| Capacitor::new(c, sample_rate, CAP_ALPHA);

        let drain = WdfParallel::new(
            cap(DRAIN_SOURCE_CAP),
            ResistiveCurrentSource::new(LEAKAGE_RESISTANCE),
        );
        let gate = WdfParallel::new(
            cap(GATE_SOURCE_CAP),
            WdfSeries::new(cap(GATE_DRAIN_CAP), drain),
        );
        let input = WdfParallel::new(
            Inverter::new(ResistiveVoltageSource::new(INPUT_RESISTANCE)),
            gate,
        );
        let tree = WdfSeries::new(Resistor::new(GATE_RESISTANCE), input);
        let diode = DiodeRoot::new(DIODE_IS, DIODE_VT, tree.port_resistance());

        Self {
            tree,
            diode,
            drain: 0.0,
        }
    }

    /// Drain voltage after the last sample
    pub fn drain_voltage(&self) -> f64 {
        self.drain
    }

    #[inline]
    fn input(&mut self) -> &mut ResistiveVoltageSource {
        &mut self.tree.port2.port1.port
    }

    #[inline]
    fn leakage(&mut self) -> &mut ResistiveCurrentSource {
        &mut self.tree.port2.port2.port2.port2.port2
    }

    #[inline]
    fn drain_cap(&self) -> &Capacitor {
        &self.tree.port2.port2.port2.port2.port1
    }
}

/// Leakage current for gate voltage `vg` and drain voltage `vd`.
///
/// The argument is truncated toward zero on a 65536-point grid over
/// `[-5, 5]`, which leaves a dead band around zero. Without it the infinite
/// slope of `|x|^0.33` at the origin sustains a limit cycle on silence.
#[inline]
fn leakage_current(vg: f64, vd: f64) -> f64 {
    let x = (0.1 * vg - 0.001 * vd).clamp(-LEAKAGE_RANGE, LEAKAGE_RANGE);
    let magnitude = libm::floor(libm::fabs(x) / LEAKAGE_STEP) * LEAKAGE_STEP;
    if magnitude == 0.0 {
        return 0.0;
    }
    libm::copysign(LEAKAGE_SCALE * libm::pow(magnitude, LEAKAGE_EXPONENT), x)
}

impl Module for OutputStage {
    type In = f64;
    type Out = f64;

    #[inline]
    fn tick(&mut self, gate: f64) -> f64 {
        let drain = self.drain;
        self.input().set_voltage(gate);
        self.leakage().set_current(leakage_current(gate, drain));

        let a = self.tree.reflected();
        let b = self.diode.reflect(a);
        self.tree.incident(b);

        self.drain = self.drain_cap().voltage();
        self.drain
    }

    fn reset(&mut self) {
        self.tree.reset();
        self.drain = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.tree.set_sample_rate(sample_rate);
        self.diode.connect(self.tree.port_resistance());
    }
}

/// Four [`OutputStage`]s blended with the dry delay outputs:
/// `drive·Vd + (1 - drive)·Vg`.
#[derive(Debug, Clone)]
pub struct Saturator {
    stages: [OutputStage; 4],
    drive: f64,
}

impl Saturator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            stages: core::array::from_fn(|_| OutputStage::new(sample_rate)),
            drive: DEFAULT_DRIVE,
        }
    }

    /// Builder-style drive setter
    pub fn with_drive(mut self, drive: f64) -> Self {
        self.set_drive(drive);
        self
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.0, 1.0);
    }

    pub fn drive(&self) -> f64 {
        self.drive
    }

    /// Shape four delay outputs at once.
    ///
    /// The circuit keeps running at zero drive so raising it later does
    /// not start from a cold state.
    #[inline]
    pub fn process_quad(&mut self, x: [f64; 4]) -> [f64; 4] {
        let drive = self.drive;
        core::array::from_fn(|i| {
            let wet = self.stages[i].tick(x[i]);
            drive * wet + (1.0 - drive) * x[i]
        })
    }
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl Module for Saturator {
    type In = [f64; 4];
    type Out = [f64; 4];

    #[inline]
    fn tick(&mut self, input: [f64; 4]) -> [f64; 4] {
        self.process_quad(input)
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        for stage in &mut self.stages {
            stage.set_sample_rate(sample_rate);
        }
    }
}
