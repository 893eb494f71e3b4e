//! Device loss oracle interface.
//!
//! The magnetic-device solver that turns a device description plus an
//! excitation into losses lives outside this crate. Everything here talks to
//! it through [`DeviceOracle`], and every call is fallible: callers degrade
//! (omit the summary, fall back to a proxy score) instead of aborting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::spectral::{dft_harmonics, thd};
use crate::waveform::rms;

/// Harmonic count used when the waveform processor estimates THD.
const SUMMARY_THD_ORDERS: usize = 50;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("device loss oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle rejected input: {0}")]
    Rejected(String),
}

/// Time-domain samples for one winding.
#[derive(Debug, Clone, PartialEq)]
pub struct WindingExcitation {
    pub name: String,
    pub current: Vec<f64>,
    pub voltage: Vec<f64>,
}

/// One operating point's excitation as submitted to the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleExcitation {
    pub name: String,
    pub topology: String,
    pub frequency_hz: f64,
    /// Sample instants over one period (s).
    pub time: Vec<f64>,
    pub windings: Vec<WindingExcitation>,
}

impl OracleExcitation {
    fn check_shape(&self) -> Result<(), OracleError> {
        if self.windings.is_empty() {
            return Err(OracleError::Rejected("excitation has no windings".into()));
        }
        let n = self.time.len();
        if n == 0 {
            return Err(OracleError::Rejected("excitation has no samples".into()));
        }
        for w in &self.windings {
            if w.current.len() != n || w.voltage.len() != n {
                return Err(OracleError::Rejected(format!(
                    "winding {} has {} current / {} voltage samples, expected {}",
                    w.name,
                    w.current.len(),
                    w.voltage.len(),
                    n
                )));
            }
        }
        Ok(())
    }
}

/// Processed-waveform figures for one winding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindingSummary {
    pub name: String,
    pub current_rms: f64,
    pub current_thd: f64,
    pub current_duty: f64,
    pub voltage_rms: f64,
    pub voltage_thd: f64,
}

/// Oracle view of an operating point's waveforms, or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSummary {
    pub ok: bool,
    pub error: String,
    pub windings: Vec<WindingSummary>,
}

impl ProcessedSummary {
    pub fn failed(err: &OracleError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
            windings: Vec::new(),
        }
    }
}

/// Winding losses as reported by the oracle.
#[derive(Debug, Clone, PartialEq)]
pub enum WindingLosses {
    /// Keyed by winding name.
    ByName(BTreeMap<String, f64>),
    /// In winding order.
    Positional(Vec<f64>),
}

/// The external device solver.
pub trait DeviceOracle: Sync {
    /// Short identifier recorded in artifact provenance.
    fn name(&self) -> &str;

    /// Validate and summarize an excitation.
    fn summarize(&self, excitation: &OracleExcitation) -> Result<ProcessedSummary, OracleError>;

    /// Compute winding losses of `device` under `excitation` at `ambient_c`.
    fn winding_losses(
        &self,
        device: &Value,
        excitation: &OracleExcitation,
        ambient_c: f64,
    ) -> Result<WindingLosses, OracleError>;
}

/// No solver linked. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl DeviceOracle for Unavailable {
    fn name(&self) -> &str {
        "none"
    }

    fn summarize(&self, _excitation: &OracleExcitation) -> Result<ProcessedSummary, OracleError> {
        Err(OracleError::Unavailable("no device solver configured".into()))
    }

    fn winding_losses(
        &self,
        _device: &Value,
        _excitation: &OracleExcitation,
        _ambient_c: f64,
    ) -> Result<WindingLosses, OracleError> {
        Err(OracleError::Unavailable("no device solver configured".into()))
    }
}

/// Local waveform processing without a loss model.
///
/// Summaries (RMS, THD, current duty cycle) are computed directly from the
/// samples. Loss requests fail, so prescreening falls back to the proxy score.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaveformProcessor;

impl DeviceOracle for WaveformProcessor {
    fn name(&self) -> &str {
        "processor"
    }

    fn summarize(&self, excitation: &OracleExcitation) -> Result<ProcessedSummary, OracleError> {
        excitation.check_shape()?;
        let n = excitation.time.len();
        let orders = SUMMARY_THD_ORDERS.min((n / 2).saturating_sub(1)).max(1);

        let windings = excitation
            .windings
            .iter()
            .map(|w| WindingSummary {
                name: w.name.clone(),
                current_rms: rms(&w.current),
                current_thd: thd(&dft_harmonics(&w.current, orders)),
                current_duty: conduction_fraction(&w.current),
                voltage_rms: rms(&w.voltage),
                voltage_thd: thd(&dft_harmonics(&w.voltage, orders)),
            })
            .collect();

        Ok(ProcessedSummary {
            ok: true,
            error: String::new(),
            windings,
        })
    }

    fn winding_losses(
        &self,
        _device: &Value,
        _excitation: &OracleExcitation,
        _ambient_c: f64,
    ) -> Result<WindingLosses, OracleError> {
        Err(OracleError::Unavailable(
            "waveform processor has no loss model".into(),
        ))
    }
}

/// Fraction of the period where the signal is meaningfully non-zero.
fn conduction_fraction(samples: &[f64]) -> f64 {
    let peak = samples.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if samples.is_empty() || peak <= 0.0 {
        return 0.0;
    }
    let floor = peak * 1e-6;
    samples.iter().filter(|v| v.abs() > floor).count() as f64 / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn excitation(current: Vec<f64>, voltage: Vec<f64>) -> OracleExcitation {
        let n = current.len();
        OracleExcitation {
            name: "op".into(),
            topology: "2-switch forward".into(),
            frequency_hz: 100e3,
            time: (0..n).map(|i| i as f64 / (n as f64 * 100e3)).collect(),
            windings: vec![WindingExcitation {
                name: "P".into(),
                current,
                voltage,
            }],
        }
    }

    #[test]
    fn test_processor_summarizes_pulse() {
        let current: Vec<f64> = (0..200).map(|i| if i < 50 { 2.0 } else { 0.0 }).collect();
        let voltage: Vec<f64> = (0..200).map(|i| if i < 50 { 3.0 } else { -1.0 }).collect();
        let s = WaveformProcessor.summarize(&excitation(current, voltage)).unwrap();
        assert!(s.ok);
        assert_eq!(s.windings.len(), 1);
        assert_abs_diff_eq!(s.windings[0].current_duty, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(s.windings[0].current_rms, 1.0, epsilon = 1e-12);
        assert!(s.windings[0].current_thd > 0.0);
    }

    #[test]
    fn test_processor_rejects_mismatched_lengths() {
        let err = WaveformProcessor
            .summarize(&excitation(vec![0.0; 10], vec![0.0; 9]))
            .unwrap_err();
        assert!(matches!(err, OracleError::Rejected(_)));
    }

    #[test]
    fn test_processor_has_no_loss_model() {
        let ex = excitation(vec![1.0; 8], vec![1.0; 8]);
        assert!(WaveformProcessor
            .winding_losses(&Value::Null, &ex, 25.0)
            .is_err());
    }

    #[test]
    fn test_unavailable_always_fails() {
        let ex = excitation(vec![1.0; 8], vec![1.0; 8]);
        assert!(Unavailable.summarize(&ex).is_err());
        let marker = ProcessedSummary::failed(&Unavailable.summarize(&ex).unwrap_err());
        assert!(!marker.ok);
        assert!(marker.error.contains("unavailable"));
    }
}
