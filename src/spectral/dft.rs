//! Direct discrete Fourier transform at harmonic orders.

use num_complex::Complex64;
use std::f64::consts::{PI, SQRT_2};

/// A single harmonic as an RMS phasor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicPhasor {
    /// Harmonic number (1 = fundamental).
    pub order: usize,
    /// RMS amplitude.
    pub amplitude: f64,
    /// Phase in degrees, (-180, 180].
    pub phase_deg: f64,
}

impl HarmonicPhasor {
    /// Rectangular (real, imaginary) form of the RMS phasor.
    pub fn to_complex(&self) -> Complex64 {
        Complex64::from_polar(self.amplitude, self.phase_deg.to_radians())
    }
}

/// Fourier phasors of one period of samples for orders `1..=max_order`.
///
/// `c_k = (1/N) Σ x[n] exp(-2πi k n / N)`; the RMS amplitude of the real
/// harmonic is `√2 |c_k|`. Empty input gives an empty spectrum.
pub fn dft_harmonics(samples: &[f64], max_order: usize) -> Vec<HarmonicPhasor> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let inv_n = 1.0 / n as f64;

    (1..=max_order)
        .map(|k| {
            let coeff: Complex64 = samples
                .iter()
                .enumerate()
                .map(|(idx, &x)| {
                    // Reduce k·n mod N before scaling to keep the angle small.
                    let m = (k * idx) % n;
                    let ang = -2.0 * PI * m as f64 * inv_n;
                    Complex64::from_polar(x, ang)
                })
                .sum::<Complex64>()
                * inv_n;
            HarmonicPhasor {
                order: k,
                amplitude: SQRT_2 * coeff.norm(),
                phase_deg: normalize_phase(coeff.arg().to_degrees()),
            }
        })
        .collect()
}

/// Total harmonic distortion as a ratio: `sqrt(A2² + A3² + ...) / A1`.
///
/// Returns 0 when the fundamental is absent or zero.
pub fn thd(harmonics: &[HarmonicPhasor]) -> f64 {
    let fundamental = harmonics
        .iter()
        .find(|h| h.order == 1)
        .map(|h| h.amplitude)
        .unwrap_or(0.0);
    if fundamental <= 1e-15 {
        return 0.0;
    }
    let rest: f64 = harmonics
        .iter()
        .filter(|h| h.order > 1)
        .map(|h| h.amplitude * h.amplitude)
        .sum();
    rest.sqrt() / fundamental
}

/// Map -180 onto 180 so phases lie in (-180, 180].
fn normalize_phase(deg: f64) -> f64 {
    if deg <= -180.0 {
        deg + 360.0
    } else {
        deg
    }
}
