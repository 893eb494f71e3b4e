//! Harmonic analysis of synthesized waveforms.
//!
//! - **DFT** - direct-summation Fourier coefficients at integer multiples of
//!   the switching frequency, reported as RMS phasors
//! - **Selection** - energy-driven truncation of the harmonic set
//!
//! Spectra are small (order ≤ 200, N ≤ 4096), so the O(N·K) direct sum is
//! used instead of an FFT; it yields exactly the requested orders with no
//! bin mapping.

mod dft;
mod select;

pub use dft::{dft_harmonics, thd, HarmonicPhasor};
pub use select::{energy_fraction, select_harmonic_orders};
