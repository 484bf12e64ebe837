//! How-To: Render Audio Through the Ensemble
//!
//! Runs a short sawtooth chord through each BBD chip variant, prints level
//! statistics, then round-trips a parameter set through JSON.
//!
//! Run with: cargo run --example chorus_render

use brigade::prelude::*;

fn saw_chord(len: usize, sample_rate: f64) -> Vec<f64> {
    let freqs = [220.0, 277.18, 329.63];
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate;
            freqs
                .iter()
                .map(|f| 2.0 * (t * f).fract() - 1.0)
                .sum::<f64>()
                * 0.2
        })
        .collect()
}

fn stats(buffer: &[f64]) -> (f64, f64) {
    let peak = buffer.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    let rms = (buffer.iter().map(|x| x * x).sum::<f64>() / buffer.len() as f64).sqrt();
    (peak, rms)
}

fn main() {
    let sample_rate = 48000.0;
    let len = sample_rate as usize;
    let input = saw_chord(len, sample_rate);

    println!("=== BBD Ensemble Render ===\n");
    let (peak, rms) = stats(&input);
    println!("Dry input:  peak {:.3}  rms {:.3}\n", peak, rms);

    for stages in StageCount::ALL {
        let params = EnsembleParams::default()
            .with_stages(stages)
            .with_feedback(0.25)
            .with_saturation(0.4);
        let center_ms = params.center_delay() * 1000.0;

        let mut ensemble = Ensemble::new(sample_rate).with_params(params);
        let mut left = input.clone();
        let mut right = input.clone();
        for (l, r) in left.chunks_mut(256).zip(right.chunks_mut(256)) {
            ensemble.process_block(l, r);
        }

        let (peak_l, rms_l) = stats(&left);
        let (peak_r, rms_r) = stats(&right);
        println!(
            "{:>5}: center {:6.2} ms  L peak {:.3} rms {:.3}  R peak {:.3} rms {:.3}",
            stages.name(),
            center_ms,
            peak_l,
            rms_l,
            peak_r,
            rms_r
        );
    }

    println!("\n--- Single delay line ---");
    let mut line = BbdDelayLine::<1024>::new(sample_rate);
    line.set_delay_time(0.02);
    println!(
        "1024 stages at 20 ms: clock {:.1} kHz, {:.2} ticks per sample",
        line.clock_rate() / 1000.0,
        line.ticks_per_sample()
    );

    println!("\n--- Parameter round trip ---");
    let params = EnsembleParams::default()
        .with_stages(StageCount::S1024)
        .with_clock_rate(25.0)
        .with_lfo_rates(0.5, 6.0)
        .with_output_filter(None);
    let json = params.to_json().expect("Serialization failed");
    println!("{}", json);

    let loaded = EnsembleParams::from_json(&json).expect("Deserialization failed");
    match loaded.validate() {
        Ok(()) => println!("Loaded parameters are valid"),
        Err(err) => println!("Loaded parameters rejected: {}", err),
    }
}
