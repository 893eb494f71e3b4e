//! Loss prescreening of stored operating points.
//!
//! Each operating point's retained harmonics are turned back into one period
//! of time-domain current and voltage per winding,
//!
//! ```text
//! x(t) = Σ_k √2 · Re(X_k · e^{i·2π·k·f0·t})
//! ```
//!
//! and submitted to the device oracle for winding losses. When the oracle
//! fails for a point, a deterministic proxy (Σ |I_k|² over harmonics and
//! windings) stands in, so a ranking is always produced.

use std::f64::consts::{PI, SQRT_2};
use std::path::Path;
use std::time::Instant;

use num_complex::Complex64;
use serde_json::Value;

use super::{PrescreenGenerator, PrescreenReport, PrescreenScore, STATUS_OK};
use crate::config::{read_json, PrescreenConfig};
use crate::error::{MagexciteError, Result};
use crate::oracle::{DeviceOracle, OracleError, OracleExcitation, WindingExcitation, WindingLosses};
use crate::output::write_json_file;
use crate::stats::Stats;

pub const METHOD_ORACLE: &str = "oracle_winding_losses";
pub const METHOD_FALLBACK: &str = "harmonic_current_energy";
pub const STATUS_SCORED: &str = "ok";
pub const STATUS_FALLBACK: &str = "fallback_estimate";

/// A harmonic as read back from an excitation profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredHarmonic {
    pub order: i64,
    pub frequency_hz: f64,
    pub currents_real_a: Vec<f64>,
    pub currents_imag_a: Vec<f64>,
    pub voltages_real_v: Vec<f64>,
    pub voltages_imag_v: Vec<f64>,
}

impl StoredHarmonic {
    /// Coerce one stored harmonic. Missing and `null` fields read as zero or
    /// empty; integral floats are accepted as orders.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed(format!("harmonic is not an object: {}", value)))?;
        Ok(Self {
            order: integer(obj.get("order"), "order")?,
            frequency_hz: number(obj.get("frequency_hz"), "frequency_hz")?,
            currents_real_a: numbers(obj.get("currents_real_a"), "currents_real_a")?,
            currents_imag_a: numbers(obj.get("currents_imag_a"), "currents_imag_a")?,
            voltages_real_v: numbers(obj.get("voltages_real_v"), "voltages_real_v")?,
            voltages_imag_v: numbers(obj.get("voltages_imag_v"), "voltages_imag_v")?,
        })
    }

    fn current(&self, winding: usize) -> Complex64 {
        Complex64::new(at(&self.currents_real_a, winding), at(&self.currents_imag_a, winding))
    }

    fn voltage(&self, winding: usize) -> Complex64 {
        Complex64::new(at(&self.voltages_real_v, winding), at(&self.voltages_imag_v, winding))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredOperatingPoint {
    pub name: Option<String>,
    pub frequency_hz: f64,
    pub harmonics: Vec<StoredHarmonic>,
}

impl StoredOperatingPoint {
    /// Coerce one stored operating point, with the same leniency as
    /// [`StoredHarmonic::from_value`].
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed(format!("operating point is not an object: {}", value)))?;
        let harmonics = match obj.get("harmonics") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(StoredHarmonic::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => return Err(malformed(format!("harmonics is not a list: {}", other))),
        };
        Ok(Self {
            name: point_name(value),
            frequency_hz: number(obj.get("frequency_hz"), "frequency_hz")?,
            harmonics,
        })
    }

    /// Harmonics with a positive order, sorted by order.
    fn sorted_harmonics(&self) -> Vec<&StoredHarmonic> {
        let mut hs: Vec<&StoredHarmonic> = self.harmonics.iter().filter(|h| h.order > 0).collect();
        hs.sort_by_key(|h| h.order);
        hs
    }
}

fn malformed(detail: String) -> MagexciteError {
    MagexciteError::Profile(format!("malformed operating point: {}", detail))
}

fn point_name(value: &Value) -> Option<String> {
    value.get("name").and_then(Value::as_str).map(str::to_string)
}

fn number(value: Option<&Value>, field: &str) -> Result<f64> {
    let x = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match x {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(malformed(format!(
            "{} is not a finite number: {}",
            field,
            value.unwrap_or(&Value::Null)
        ))),
    }
}

fn integer(value: Option<&Value>, field: &str) -> Result<i64> {
    let x = number(value, field)?;
    if x.fract() != 0.0 || x.abs() > i64::MAX as f64 {
        return Err(malformed(format!("{} is not an integer: {}", field, x)));
    }
    Ok(x as i64)
}

fn numbers(value: Option<&Value>, field: &str) -> Result<Vec<f64>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(|v| number(Some(v), field)).collect(),
        Some(other) => Err(malformed(format!("{} is not a list: {}", field, other))),
    }
}

fn at(values: &[f64], idx: usize) -> f64 {
    values.get(idx).copied().unwrap_or(0.0)
}

/// One period of reconstructed waveforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub fundamental_hz: f64,
    pub time: Vec<f64>,
    pub currents: Vec<Vec<f64>>,
    pub voltages: Vec<Vec<f64>>,
    pub harmonics_used: usize,
}

/// Loss figures for one operating point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLoss {
    pub total_w: f64,
    pub per_winding_w: Vec<f64>,
    pub harmonics_used: usize,
    pub method: &'static str,
}

/// Fundamental frequency of a stored point: its own `frequency_hz`, else
/// derived from the lowest harmonic's frequency and order, else the default.
pub fn infer_fundamental(op: &StoredOperatingPoint, harmonics: &[&StoredHarmonic], default_hz: f64) -> f64 {
    if op.frequency_hz > 0.0 {
        return op.frequency_hz;
    }
    harmonics
        .iter()
        .find(|h| h.order > 0 && h.frequency_hz > 0.0)
        .map(|h| h.frequency_hz / h.order as f64)
        .unwrap_or(default_hz)
}

/// Rebuild per-winding time-domain waveforms from stored harmonics.
///
/// `max_harmonics` > 0 keeps only the lowest that many orders.
pub fn reconstruct_waveforms(
    op: &StoredOperatingPoint,
    n_windings: usize,
    samples: usize,
    max_harmonics: usize,
    default_hz: f64,
) -> Result<Reconstruction> {
    let mut harmonics = op.sorted_harmonics();
    if max_harmonics > 0 {
        harmonics.truncate(max_harmonics);
    }
    if harmonics.is_empty() {
        return Err(MagexciteError::Profile("operating point has no harmonics".into()));
    }

    let f0 = infer_fundamental(op, &harmonics, default_hz);
    if !f0.is_finite() || f0 <= 0.0 {
        return Err(MagexciteError::Profile(format!(
            "invalid fundamental frequency: {}",
            f0
        )));
    }

    let n = samples.max(1);
    let time: Vec<f64> = (0..n).map(|i| i as f64 / (n as f64 * f0)).collect();
    let mut currents = vec![vec![0.0; n]; n_windings];
    let mut voltages = vec![vec![0.0; n]; n_windings];

    for h in &harmonics {
        let omega = 2.0 * PI * f0 * h.order as f64;
        let rotors: Vec<Complex64> = time
            .iter()
            .map(|&t| Complex64::from_polar(SQRT_2, omega * t))
            .collect();
        for wi in 0..n_windings {
            let ip = h.current(wi);
            let vp = h.voltage(wi);
            for (ti, e) in rotors.iter().enumerate() {
                currents[wi][ti] += (ip * e).re;
                voltages[wi][ti] += (vp * e).re;
            }
        }
    }

    Ok(Reconstruction {
        fundamental_hz: f0,
        time,
        currents,
        voltages,
        harmonics_used: harmonics.len(),
    })
}

/// Attribute oracle losses to windings.
///
/// Named results are matched by winding name; if none match but the map is
/// not empty, its values are taken in order. Positional results map by index.
pub fn attribute_losses(losses: &WindingLosses, winding_names: &[String]) -> (f64, Vec<f64>) {
    let n_w = winding_names.len();
    let mut per = vec![0.0; n_w];
    match losses {
        WindingLosses::ByName(map) => {
            for (wi, name) in winding_names.iter().enumerate() {
                if let Some(&v) = map.get(name) {
                    per[wi] = v;
                }
            }
            if !map.is_empty() && per.iter().all(|&v| v == 0.0) {
                for (slot, &v) in per.iter_mut().zip(map.values()) {
                    *slot = v;
                }
            }
        }
        WindingLosses::Positional(values) => {
            for (slot, &v) in per.iter_mut().zip(values) {
                *slot = v;
            }
        }
    }
    (per.iter().sum(), per)
}

/// Proxy score: squared harmonic-current magnitudes summed per winding.
pub fn fallback_score(op: &StoredOperatingPoint, n_windings: usize) -> (f64, Vec<f64>) {
    let mut per = vec![0.0; n_windings];
    for h in op.sorted_harmonics() {
        for (wi, slot) in per.iter_mut().enumerate() {
            *slot += h.current(wi).norm_sqr();
        }
    }
    (per.iter().sum(), per)
}

/// Score one operating point with the oracle.
pub fn score_operating_point(
    device: &Value,
    op: &StoredOperatingPoint,
    winding_names: &[String],
    cfg: &PrescreenConfig,
    oracle: &dyn DeviceOracle,
) -> Result<PointLoss> {
    let rec = reconstruct_waveforms(
        op,
        winding_names.len(),
        cfg.waveform_samples,
        cfg.max_harmonics_for_waveform,
        cfg.default_frequency_hz,
    )?;

    let excitation = OracleExcitation {
        name: op.name.clone().unwrap_or_default(),
        topology: cfg.topology.clone(),
        frequency_hz: rec.fundamental_hz,
        time: rec.time,
        windings: winding_names
            .iter()
            .zip(rec.currents.into_iter().zip(rec.voltages))
            .map(|(name, (current, voltage))| WindingExcitation {
                name: name.clone(),
                current,
                voltage,
            })
            .collect(),
    };

    let losses = oracle.winding_losses(device, &excitation, cfg.temperature_c)?;
    let (total_w, per_winding_w) = attribute_losses(&losses, winding_names);
    if !total_w.is_finite() {
        return Err(OracleError::Rejected(format!("non-finite winding loss: {}", total_w)).into());
    }
    Ok(PointLoss {
        total_w,
        per_winding_w,
        harmonics_used: rec.harmonics_used,
        method: METHOD_ORACLE,
    })
}

/// Score every operating point and rank them by descending loss.
///
/// `ops` are the raw profile entries. Ties keep profile order. Per-point
/// failures, including entries that cannot be read, fall back to the proxy
/// score and never abort the batch.
pub fn rank_operating_points(
    device: &Value,
    ops: &[Value],
    winding_names: &[String],
    cfg: &PrescreenConfig,
    oracle: &dyn DeviceOracle,
    mut stats: Option<&mut Stats>,
) -> PrescreenReport {
    let _span = tracing::info_span!("prescreen", points = ops.len()).entered();
    let start = stats.is_some().then(Instant::now);
    let n_w = winding_names.len();
    let mut fallback_count = 0;

    let mut scores: Vec<PrescreenScore> = ops
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let index = i + 1;
            let name = point_name(raw).unwrap_or_else(|| format!("op_{}", index));
            let (op, scored) = match StoredOperatingPoint::from_value(raw) {
                Ok(op) => {
                    let scored = score_operating_point(device, &op, winding_names, cfg, oracle);
                    (op, scored)
                }
                Err(e) => (StoredOperatingPoint::default(), Err(e)),
            };
            if let Some(ref mut s) = stats {
                // Profile errors are raised before the oracle is reached.
                match &scored {
                    Ok(_) => s.oracle_calls += 1,
                    Err(MagexciteError::Oracle(_)) => {
                        s.oracle_calls += 1;
                        s.oracle_failures += 1;
                    }
                    Err(_) => {}
                }
            }
            match scored {
                Ok(loss) => PrescreenScore {
                    index,
                    name,
                    score_w: loss.total_w,
                    status: STATUS_SCORED.to_string(),
                    loss_per_winding_w: loss.per_winding_w,
                    harmonics_used: loss.harmonics_used,
                    method: loss.method.to_string(),
                    error: String::new(),
                },
                Err(e) => {
                    tracing::debug!(op = %name, error = %e, "falling back to harmonic energy score");
                    fallback_count += 1;
                    if let Some(ref mut s) = stats {
                        s.fallback_scores += 1;
                    }
                    let (score_w, per) = fallback_score(&op, n_w);
                    PrescreenScore {
                        index,
                        name,
                        score_w,
                        status: STATUS_FALLBACK.to_string(),
                        loss_per_winding_w: per,
                        harmonics_used: 0,
                        method: METHOD_FALLBACK.to_string(),
                        error: e.to_string(),
                    }
                }
            }
        })
        .collect();

    // `sort_by` is stable: equal scores keep profile order.
    scores.sort_by(|a, b| b.score_w.total_cmp(&a.score_w));
    let ranked_indices = scores.iter().map(|s| s.index).collect();

    if fallback_count > 0 {
        tracing::warn!(fallback_count, total = ops.len(), "some points used the fallback score");
    }
    if let (Some(s), Some(t)) = (stats, start) {
        s.add_phase("prescreen", t.elapsed());
    }

    PrescreenReport {
        status: STATUS_OK.to_string(),
        total_operating_points: ops.len(),
        scored_operating_points: scores.len(),
        fallback_count,
        ranked_indices,
        scores,
        winding_names: winding_names.to_vec(),
        generator: PrescreenGenerator {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            waveform_samples: cfg.waveform_samples,
            max_harmonics_for_waveform: cfg.max_harmonics_for_waveform,
        },
    }
}

/// Winding names from a device description's `windings[].name`.
pub fn device_winding_names(device: &Value) -> Vec<String> {
    device
        .get("windings")
        .and_then(Value::as_array)
        .map(|ws| {
            ws.iter()
                .enumerate()
                .map(|(i, w)| {
                    w.get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("winding_{}", i))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Raw `operating_points` entries of a profile; each is coerced when scored.
fn load_profile_points(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Err(MagexciteError::Config(format!(
            "excitation profile file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let profile: Value = serde_json::from_str(&content)
        .map_err(|e| MagexciteError::Profile(format!("unreadable excitation profile: {}", e)))?;
    Ok(profile
        .get("operating_points")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Load device and profile, rank, and write the report.
pub fn run(
    cfg: &PrescreenConfig,
    oracle: &dyn DeviceOracle,
    stats: Option<&mut Stats>,
) -> Result<PrescreenReport> {
    if !cfg.device_file.exists() {
        return Err(MagexciteError::Config(format!(
            "device file not found: {}",
            cfg.device_file.display()
        )));
    }
    let device = read_json(&cfg.device_file)?;
    let ops = load_profile_points(&cfg.excitation_profile_file)?;
    if ops.is_empty() {
        return Err(MagexciteError::Profile(
            "excitation profile has no operating points".into(),
        ));
    }
    let winding_names = device_winding_names(&device);
    if winding_names.is_empty() {
        return Err(MagexciteError::Config("device description has no windings".into()));
    }

    let report = rank_operating_points(&device, &ops, &winding_names, cfg, oracle, stats);
    write_json_file(&cfg.output_file, &report)?;
    Ok(report)
}
