//! Analysis engine: excitation-profile generation and loss prescreening.

pub mod excitation;
pub mod prescreen;

use serde::{Deserialize, Serialize};

use crate::config::ConductionMode;
use crate::oracle::ProcessedSummary;

pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

/// One retained harmonic across all windings, in rectangular RMS form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcitationHarmonic {
    pub order: usize,
    pub frequency_hz: f64,
    pub currents_real_a: Vec<f64>,
    pub currents_imag_a: Vec<f64>,
    pub voltages_real_v: Vec<f64>,
    pub voltages_imag_v: Vec<f64>,
}

/// A synthesized operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub name: String,
    pub line_scale: f64,
    pub load_scale: f64,
    pub conduction_mode: ConductionMode,
    pub frequency_hz: f64,
    pub duty: f64,
    pub rms_currents_a: Vec<f64>,
    pub rms_voltages_v: Vec<f64>,
    pub harmonic_count: usize,
    pub harmonics: Vec<ExcitationHarmonic>,
    pub processed_summary: ProcessedSummary,
}

/// Provenance of a generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorInfo {
    pub name: String,
    pub version: String,
    pub oracle: String,
}

/// The complete excitation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcitationProfile {
    pub status: String,
    pub source: String,
    pub topology: String,
    pub sweep_mode: String,
    pub conduction_mode: String,
    pub frequency_hz: f64,
    pub harmonic_energy_pct: f64,
    pub harmonic_max_order: usize,
    pub operating_points: Vec<OperatingPoint>,
    #[serde(default)]
    pub config_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorInfo>,
}

/// Prescreen result for one operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreenScore {
    /// 1-based position in the excitation profile.
    pub index: usize,
    pub name: String,
    pub score_w: f64,
    pub status: String,
    pub loss_per_winding_w: Vec<f64>,
    pub harmonics_used: usize,
    pub method: String,
    pub error: String,
}

/// Prescreen settings echoed into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreenGenerator {
    pub name: String,
    pub version: String,
    pub waveform_samples: usize,
    pub max_harmonics_for_waveform: usize,
}

/// Ranked prescreen output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreenReport {
    pub status: String,
    pub total_operating_points: usize,
    pub scored_operating_points: usize,
    pub fallback_count: usize,
    /// 1-based indices, highest score first.
    pub ranked_indices: Vec<usize>,
    /// In ranked order.
    pub scores: Vec<PrescreenScore>,
    pub winding_names: Vec<String>,
    pub generator: PrescreenGenerator,
}
