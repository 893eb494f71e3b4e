//! Run configuration.
//!
//! Config files are JSON objects. They are deserialized into `Raw*` records
//! that carry the file's defaults, then validated once into typed records
//! with closed option enums and every numeric field clamped to its working
//! range. Numerical code only ever sees validated records.
//!
//! Option strings are matched leniently: `"CCM + DCM"`, `"ccm/dcm"` and
//! `"ccm+dcm"` all select both conduction modes, and unrecognised sweep or
//! duty modes fall back to the defaults (`grid`, `derived`).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MagexciteError, Result};

pub const MIN_SYNTH_SAMPLES: usize = 128;
pub const MAX_SYNTH_SAMPLES: usize = 4096;
pub const MIN_PRESCREEN_SAMPLES: usize = 64;
pub const MAX_PRESCREEN_SAMPLES: usize = 512;
pub const MAX_HARMONIC_ORDER: usize = 200;

/// Converter conduction regime of a single operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConductionMode {
    Ccm,
    Dcm,
}

impl ConductionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConductionMode::Ccm => "ccm",
            ConductionMode::Dcm => "dcm",
        }
    }
}

impl fmt::Display for ConductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which conduction modes the grid expands each (line, load) point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConductionSelection {
    Ccm,
    Dcm,
    Both,
}

impl ConductionSelection {
    pub fn parse(value: &str) -> Self {
        let s = value.trim().to_lowercase();
        match s.as_str() {
            "ccm" => return ConductionSelection::Ccm,
            "dcm" => return ConductionSelection::Dcm,
            "ccm+dcm" => return ConductionSelection::Both,
            _ => {}
        }
        if s.contains("ccm") && s.contains("dcm") {
            ConductionSelection::Both
        } else if s.contains("dcm") {
            ConductionSelection::Dcm
        } else {
            ConductionSelection::Ccm
        }
    }

    /// Modes in expansion order (ccm before dcm).
    pub fn modes(self) -> &'static [ConductionMode] {
        match self {
            ConductionSelection::Ccm => &[ConductionMode::Ccm],
            ConductionSelection::Dcm => &[ConductionMode::Dcm],
            ConductionSelection::Both => &[ConductionMode::Ccm, ConductionMode::Dcm],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConductionSelection::Ccm => "ccm",
            ConductionSelection::Dcm => "dcm",
            ConductionSelection::Both => "ccm+dcm",
        }
    }
}

/// Operating-point sweep strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Single point at (1, 1).
    Nominal,
    /// Min/max of each axis, 4 points.
    Corners,
    /// Full line × load cross product.
    Grid,
}

impl SweepMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "nominal" => SweepMode::Nominal,
            "corners" => SweepMode::Corners,
            _ => SweepMode::Grid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SweepMode::Nominal => "nominal",
            SweepMode::Corners => "corners",
            SweepMode::Grid => "grid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyMode {
    Derived,
    Manual,
}

impl DutyMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "manual" => DutyMode::Manual,
            _ => DutyMode::Derived,
        }
    }
}

/// Where winding excitation comes from. Only converter synthesis is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Converter,
    Manual,
}

impl SourceMode {
    pub fn parse(value: &str) -> Self {
        if value.trim().to_lowercase().starts_with("manual") {
            SourceMode::Manual
        } else {
            SourceMode::Converter
        }
    }
}

/// Waveform shape constants used by the current synthesizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeConstants {
    /// Peak-to-peak ripple over on-interval average, halved (CCM ramp slope).
    pub ccm_ripple_ratio: f64,
    /// DCM triangle peak is `rms * sqrt(dcm_peak_factor / duty)`.
    pub dcm_peak_factor: f64,
}

impl Default for ShapeConstants {
    fn default() -> Self {
        Self {
            ccm_ripple_ratio: 0.25,
            dcm_peak_factor: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Winding {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rms_current_a: f64,
    #[serde(default)]
    pub rms_voltage_v: f64,
    #[serde(default)]
    pub phase_deg: f64,
    #[serde(default = "default_turns")]
    pub n_turns: f64,
}

fn default_turns() -> f64 {
    1.0
}

// ── Excitation config ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawExcitationConfig {
    #[serde(default = "default_frequency")]
    frequency_hz: f64,
    #[serde(default)]
    windings: Vec<Winding>,
    #[serde(default = "default_samples")]
    samples_per_period: f64,
    #[serde(default = "default_max_order")]
    harmonic_max_order: f64,
    #[serde(default = "default_energy_pct")]
    harmonic_energy_pct: f64,
    #[serde(default = "default_small_pct")]
    small_harmonic_pct: f64,
    #[serde(default = "default_small_consecutive")]
    small_harmonic_consecutive: f64,
    #[serde(default = "default_sweep_mode")]
    sweep_mode: String,
    #[serde(default = "default_conduction_mode")]
    conduction_mode: String,
    #[serde(default)]
    line_scales: Vec<f64>,
    #[serde(default)]
    load_scales: Vec<f64>,
    #[serde(default = "default_duty_mode")]
    duty_mode: String,
    #[serde(default = "default_manual_duty")]
    manual_duty: f64,
    #[serde(default = "default_source_mode")]
    source_mode: String,
    #[serde(default)]
    ccm_ripple_ratio: Option<f64>,
    #[serde(default)]
    dcm_peak_factor: Option<f64>,
    #[serde(flatten)]
    artifacts: RawArtifacts,
}

/// Artifact fields; `null` reads as absent so hand-edited configs still
/// get their defaults.
#[derive(Debug, Deserialize)]
struct RawArtifacts {
    #[serde(default)]
    output_file: Option<PathBuf>,
    #[serde(default)]
    cache_file: Option<PathBuf>,
    #[serde(default)]
    use_cache: Option<bool>,
    #[serde(default)]
    use_import: Option<bool>,
    #[serde(default)]
    import_file: Option<PathBuf>,
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

impl From<RawArtifacts> for ArtifactPaths {
    fn from(raw: RawArtifacts) -> Self {
        ArtifactPaths {
            output_file: non_empty(raw.output_file).unwrap_or_else(default_output_file),
            cache_file: non_empty(raw.cache_file).unwrap_or_else(default_cache_file),
            use_cache: raw.use_cache.unwrap_or(true),
            use_import: raw.use_import.unwrap_or(false),
            import_file: non_empty(raw.import_file),
        }
    }
}

fn default_frequency() -> f64 {
    100e3
}
fn default_samples() -> f64 {
    1024.0
}
fn default_max_order() -> f64 {
    60.0
}
fn default_energy_pct() -> f64 {
    99.5
}
fn default_small_pct() -> f64 {
    1.0
}
fn default_small_consecutive() -> f64 {
    5.0
}
fn default_sweep_mode() -> String {
    "grid".into()
}
fn default_conduction_mode() -> String {
    "ccm+dcm".into()
}
fn default_duty_mode() -> String {
    "derived".into()
}
fn default_manual_duty() -> f64 {
    0.40
}
fn default_source_mode() -> String {
    "converter".into()
}
fn default_output_file() -> PathBuf {
    PathBuf::from("om_excitation_profile.json")
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("om_excitation_cache.json")
}

/// Artifact locations and cache switches. These never affect the config hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub output_file: PathBuf,
    pub cache_file: PathBuf,
    pub use_cache: bool,
    pub use_import: bool,
    pub import_file: Option<PathBuf>,
}

impl ArtifactPaths {
    /// Read only the artifact fields of a config document. This succeeds even
    /// when the rest of the config is invalid, so cache/import lookups and
    /// error artifacts still have somewhere to go.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawArtifacts = serde_json::from_value(value.clone())
            .map_err(|e| MagexciteError::Config(format!("invalid artifact paths: {}", e)))?;
        Ok(raw.into())
    }
}

/// Validated excitation-generation config.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcitationConfig {
    pub frequency_hz: f64,
    pub windings: Vec<Winding>,
    pub samples_per_period: usize,
    pub harmonic_max_order: usize,
    /// Clamped to [50, 100].
    pub harmonic_energy_pct: f64,
    pub small_harmonic_pct: f64,
    pub small_harmonic_consecutive: usize,
    pub sweep_mode: SweepMode,
    pub conduction: ConductionSelection,
    /// Sorted, deduplicated, never empty.
    pub line_scales: Vec<f64>,
    /// Sorted, deduplicated, never empty.
    pub load_scales: Vec<f64>,
    pub duty_mode: DutyMode,
    /// Clamped to [0.05, 0.49].
    pub manual_duty: f64,
    pub shape: ShapeConstants,
    pub artifacts: ArtifactPaths,
}

impl ExcitationConfig {
    /// Validate a parsed JSON config.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawExcitationConfig = serde_json::from_value(value.clone())
            .map_err(|e| MagexciteError::Config(format!("invalid excitation config: {}", e)))?;
        raw.validate()
    }
}

impl RawExcitationConfig {
    fn validate(self) -> Result<ExcitationConfig> {
        if SourceMode::parse(&self.source_mode) != SourceMode::Converter {
            return Err(MagexciteError::Config(
                "only converter source mode is supported".into(),
            ));
        }
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(MagexciteError::Config(format!(
                "invalid fundamental frequency: {}",
                self.frequency_hz
            )));
        }
        if self.windings.is_empty() {
            return Err(MagexciteError::Config("config has no windings".into()));
        }

        let defaults = ShapeConstants::default();
        let shape = ShapeConstants {
            ccm_ripple_ratio: self
                .ccm_ripple_ratio
                .filter(|r| r.is_finite() && *r >= 0.0)
                .unwrap_or(defaults.ccm_ripple_ratio),
            dcm_peak_factor: self
                .dcm_peak_factor
                .filter(|f| f.is_finite() && *f > 0.0)
                .unwrap_or(defaults.dcm_peak_factor),
        };

        Ok(ExcitationConfig {
            frequency_hz: self.frequency_hz,
            windings: self.windings,
            samples_per_period: to_count(self.samples_per_period, MIN_SYNTH_SAMPLES, MAX_SYNTH_SAMPLES),
            harmonic_max_order: to_count(self.harmonic_max_order, 1, MAX_HARMONIC_ORDER),
            harmonic_energy_pct: clamp_or(self.harmonic_energy_pct, 50.0, 100.0, 99.5),
            small_harmonic_pct: if self.small_harmonic_pct.is_finite() {
                self.small_harmonic_pct
            } else {
                default_small_pct()
            },
            small_harmonic_consecutive: to_count(self.small_harmonic_consecutive, 1, usize::MAX),
            sweep_mode: SweepMode::parse(&self.sweep_mode),
            conduction: ConductionSelection::parse(&self.conduction_mode),
            line_scales: normalize_scales(self.line_scales),
            load_scales: normalize_scales(self.load_scales),
            duty_mode: DutyMode::parse(&self.duty_mode),
            manual_duty: clamp_or(self.manual_duty, 0.05, 0.49, 0.40),
            shape,
            artifacts: self.artifacts.into(),
        })
    }
}

// ── Prescreen config ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawPrescreenConfig {
    #[serde(default = "default_device_file", alias = "om_config_file")]
    device_file: PathBuf,
    #[serde(default = "default_output_file")]
    excitation_profile_file: PathBuf,
    #[serde(default = "default_prescreen_output")]
    output_file: PathBuf,
    #[serde(default = "default_waveform_samples")]
    waveform_samples: f64,
    #[serde(default)]
    max_harmonics_for_waveform: f64,
    #[serde(default = "default_temperature")]
    temperature_c: f64,
    #[serde(default = "default_frequency")]
    default_frequency_hz: f64,
    #[serde(default = "default_topology")]
    topology: String,
}

fn default_device_file() -> PathBuf {
    PathBuf::from("om_viz_config.json")
}
fn default_prescreen_output() -> PathBuf {
    PathBuf::from("om_prescreen_losses.json")
}
fn default_waveform_samples() -> f64 {
    128.0
}
fn default_temperature() -> f64 {
    25.0
}
fn default_topology() -> String {
    "2-switch forward".into()
}

/// Validated prescreen config.
#[derive(Debug, Clone, PartialEq)]
pub struct PrescreenConfig {
    pub device_file: PathBuf,
    pub excitation_profile_file: PathBuf,
    pub output_file: PathBuf,
    /// Clamped to [64, 512].
    pub waveform_samples: usize,
    /// 0 means use every stored harmonic.
    pub max_harmonics_for_waveform: usize,
    pub temperature_c: f64,
    pub default_frequency_hz: f64,
    pub topology: String,
}

impl Default for PrescreenConfig {
    fn default() -> Self {
        Self {
            device_file: default_device_file(),
            excitation_profile_file: default_output_file(),
            output_file: default_prescreen_output(),
            waveform_samples: 128,
            max_harmonics_for_waveform: 0,
            temperature_c: default_temperature(),
            default_frequency_hz: default_frequency(),
            topology: default_topology(),
        }
    }
}

impl PrescreenConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawPrescreenConfig = serde_json::from_value(value.clone())
            .map_err(|e| MagexciteError::Config(format!("invalid prescreen config: {}", e)))?;
        let topology = if raw.topology.trim().is_empty() {
            default_topology()
        } else {
            raw.topology
        };
        Ok(PrescreenConfig {
            device_file: raw.device_file,
            excitation_profile_file: raw.excitation_profile_file,
            output_file: raw.output_file,
            waveform_samples: to_count(raw.waveform_samples, MIN_PRESCREEN_SAMPLES, MAX_PRESCREEN_SAMPLES),
            max_harmonics_for_waveform: to_count(raw.max_harmonics_for_waveform, 0, usize::MAX),
            temperature_c: if raw.temperature_c.is_finite() {
                raw.temperature_c
            } else {
                default_temperature()
            },
            default_frequency_hz: raw.default_frequency_hz,
            topology,
        })
    }
}

// ── Loading ─────────────────────────────────────────────────────

/// Read a JSON object from disk.
pub fn read_json(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(MagexciteError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    if !value.is_object() {
        return Err(MagexciteError::Config(format!(
            "{} is not a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

pub fn load_prescreen_config(path: &Path) -> Result<PrescreenConfig> {
    PrescreenConfig::from_value(&read_json(path)?)
}

// ── Helpers ─────────────────────────────────────────────────────

fn to_count(value: f64, lo: usize, hi: usize) -> usize {
    if !value.is_finite() || value <= lo as f64 {
        return lo;
    }
    if value >= hi as f64 {
        return hi;
    }
    value as usize
}

fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

fn normalize_scales(mut scales: Vec<f64>) -> Vec<f64> {
    scales.retain(|s| s.is_finite());
    scales.sort_by(|a, b| a.total_cmp(b));
    scales.dedup();
    if scales.is_empty() {
        scales.push(1.0);
    }
    scales
}
