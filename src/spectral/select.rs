//! Adaptive harmonic truncation.
//!
//! Orders are walked upward from the fundamental, accumulating squared RMS
//! amplitude over all windings. The walk stops only when both
//!
//! 1. the cumulative energy fraction reaches the target, and
//! 2. the last `small_consecutive` orders were all "small" on every winding
//!    (below `small_pct` percent of that winding's fundamental),
//!
//! so a run of small harmonics followed by a significant outlier does not
//! truncate the spectrum early. Once the walk stops, the trailing small run
//! that confirmed it is trimmed again while coverage stays on target.

use super::dft::HarmonicPhasor;

/// Total energy at or below this is treated as an empty spectrum.
const ENERGY_FLOOR: f64 = 1e-18;

/// Choose the ordered set of harmonic orders to retain.
///
/// `per_winding[w][k]` is the phasor of order `k + 1` on winding `w`; all
/// windings must share the same length. The result is sorted, unique and
/// always contains order 1. A degenerate spectrum (no windings, no orders,
/// or zero energy) yields `[1]`.
pub fn select_harmonic_orders(
    per_winding: &[Vec<HarmonicPhasor>],
    target_energy_pct: f64,
    small_pct: f64,
    small_consecutive: usize,
) -> Vec<usize> {
    let max_order = per_winding.iter().map(Vec::len).min().unwrap_or(0);
    if max_order == 0 {
        return vec![1];
    }

    let total_energy: f64 = per_winding
        .iter()
        .flat_map(|w| w[..max_order].iter())
        .map(|h| h.amplitude * h.amplitude)
        .sum();
    if total_energy <= ENERGY_FLOOR {
        return vec![1];
    }

    let thresholds: Vec<f64> = per_winding
        .iter()
        .map(|w| w[0].amplitude * small_pct / 100.0)
        .collect();
    let target = target_energy_pct.clamp(50.0, 100.0) / 100.0;
    let needed_small = small_consecutive.max(1);

    // (order, energy at that order, every winding small)
    let mut walked: Vec<(usize, f64, bool)> = Vec::with_capacity(max_order);
    let mut cumulative = 0.0;
    let mut consecutive_small = 0usize;
    let mut terminated = false;

    for k in 0..max_order {
        let mut energy_k = 0.0;
        let mut all_small = true;
        for (w, spectrum) in per_winding.iter().enumerate() {
            let amp = spectrum[k].amplitude;
            energy_k += amp * amp;
            if amp >= thresholds[w] {
                all_small = false;
            }
        }
        cumulative += energy_k;
        walked.push((k + 1, energy_k, all_small));

        consecutive_small = if all_small { consecutive_small + 1 } else { 0 };

        if cumulative / total_energy >= target && consecutive_small >= needed_small {
            terminated = true;
            break;
        }
    }

    // The small run that confirmed termination carries no needed energy;
    // drop it again as long as coverage stays on target.
    if terminated {
        while let Some(&(order, energy_k, all_small)) = walked.last() {
            if order == 1 || !all_small || (cumulative - energy_k) / total_energy < target {
                break;
            }
            cumulative -= energy_k;
            walked.pop();
        }
    }

    let mut keep: Vec<usize> = walked.into_iter().map(|(order, _, _)| order).collect();
    if !keep.contains(&1) {
        keep.push(1);
    }
    keep.sort_unstable();
    keep.dedup();
    keep
}

/// Fraction of total spectral energy (all windings) captured by `orders`.
pub fn energy_fraction(per_winding: &[Vec<HarmonicPhasor>], orders: &[usize]) -> f64 {
    let energy = |h: &HarmonicPhasor| h.amplitude * h.amplitude;
    let total: f64 = per_winding.iter().flatten().map(energy).sum();
    if total <= ENERGY_FLOOR {
        return 0.0;
    }
    let kept: f64 = per_winding
        .iter()
        .flatten()
        .filter(|h| orders.contains(&h.order))
        .map(energy)
        .sum();
    kept / total
}
