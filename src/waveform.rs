//! Converter winding waveform synthesis.
//!
//! Produces one switching period of a discretized current or voltage
//! waveform. Sample 0 is the start of the switch on-interval before the
//! winding phase shift is applied; phase is realised as a circular sample
//! rotation, never by interpolation.
//!
//! Every non-zero waveform is rescaled so its discrete RMS equals the
//! requested target exactly.

use crate::config::{ConductionMode, ShapeConstants};

/// Duty clamp applied by the synthesizer itself.
const DUTY_MIN: f64 = 0.02;
const DUTY_MAX: f64 = 0.98;

/// Synthesize one period of winding current.
///
/// CCM: linear ramp across the on-interval around the on-interval average,
/// `i_avg * (1 + r * (2u - 1))`, zero for the rest of the period.
/// DCM: triangular pulse across the on-interval with analytic peak
/// `rms * sqrt(k / duty)`, zero for the rest of the period.
pub fn synthesize_current(
    rms_target: f64,
    duty: f64,
    mode: ConductionMode,
    phase_deg: f64,
    n_samples: usize,
    shape: &ShapeConstants,
) -> Vec<f64> {
    if rms_target.is_nan() || rms_target <= 0.0 || n_samples == 0 {
        return vec![0.0; n_samples];
    }
    let duty = clamp_duty(duty);
    let d_count = on_samples(duty, n_samples);
    let denom = d_count.saturating_sub(1).max(1) as f64;

    let mut values = vec![0.0; n_samples];
    match mode {
        ConductionMode::Dcm => {
            let peak = rms_target * (shape.dcm_peak_factor / duty.max(1e-9)).sqrt();
            for (n, v) in values.iter_mut().take(d_count).enumerate() {
                let u = n as f64 / denom;
                *v = peak * (1.0 - (2.0 * u - 1.0).abs());
            }
        }
        ConductionMode::Ccm => {
            let r = shape.ccm_ripple_ratio;
            let i_avg_on = rms_target / (duty * (1.0 + r * r / 3.0)).max(1e-12).sqrt();
            for (n, v) in values.iter_mut().take(d_count).enumerate() {
                let u = n as f64 / denom;
                *v = i_avg_on * (1.0 + r * (2.0 * u - 1.0));
            }
        }
    }

    scale_to_rms(&mut values, rms_target);
    rotate_phase(&mut values, phase_deg);
    values
}

/// Synthesize one period of winding voltage.
///
/// Winding 0 (primary) is a two-level wave, +1 during the on-interval and
/// `-duty / (1 - duty)` otherwise, so its average is zero (volt-second
/// balance). Other windings get a plain on/off pulse. Both are scaled to the
/// target RMS afterwards.
pub fn synthesize_voltage(
    rms_target: f64,
    duty: f64,
    winding_index: usize,
    phase_deg: f64,
    n_samples: usize,
) -> Vec<f64> {
    if rms_target.is_nan() || rms_target <= 0.0 || n_samples == 0 {
        return vec![0.0; n_samples];
    }
    let duty = clamp_duty(duty);
    let d_count = on_samples(duty, n_samples);

    let mut values = if winding_index == 0 {
        let v_off = -duty / (1.0 - duty).max(1e-6);
        (0..n_samples)
            .map(|n| if n < d_count { 1.0 } else { v_off })
            .collect::<Vec<_>>()
    } else {
        (0..n_samples)
            .map(|n| if n < d_count { -1.0 } else { 0.0 })
            .collect::<Vec<_>>()
    };

    scale_to_rms(&mut values, rms_target);
    rotate_phase(&mut values, phase_deg);
    values
}

/// Root-mean-square of a sample sequence. Empty input gives 0.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let acc: f64 = values.iter().map(|v| v * v).sum();
    (acc / values.len() as f64).sqrt()
}

/// Rotate right by `round(phase_deg / 360 * n)` samples, modulo n.
pub fn rotate_phase(values: &mut [f64], phase_deg: f64) {
    let n = values.len();
    if n == 0 || !phase_deg.is_finite() {
        return;
    }
    let shift = ((phase_deg / 360.0) * n as f64).round() as i64;
    let s = shift.rem_euclid(n as i64) as usize;
    values.rotate_right(s);
}

fn clamp_duty(duty: f64) -> f64 {
    if duty.is_finite() {
        duty.clamp(DUTY_MIN, DUTY_MAX)
    } else {
        0.4
    }
}

fn on_samples(duty: f64, n_samples: usize) -> usize {
    ((duty * n_samples as f64).round() as usize).clamp(1, n_samples)
}

fn scale_to_rms(values: &mut [f64], target: f64) {
    let base = rms(values);
    if base > 1e-12 {
        let k = target / base;
        values.iter_mut().for_each(|v| *v *= k);
    }
}
