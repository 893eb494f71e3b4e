//! Excitation profile generation.
//!
//! For each operating point:
//!   1. Estimate the duty cycle (including the DCM reduction)
//!   2. Synthesize per-winding current and voltage waveforms
//!   3. DFT both up to `harmonic_max_order`
//!   4. Select the retained orders from the current spectra
//!   5. Convert retained phasors to rectangular form
//!   6. Ask the oracle for a processed-waveform summary (failure is recorded,
//!      not fatal)
//!
//! Steps 1-4 are independent per point and run in parallel; results are
//! collected in grid order before any oracle call.

use std::time::Instant;

use rayon::prelude::*;
use serde_json::Value;

use super::{ExcitationHarmonic, ExcitationProfile, GeneratorInfo, OperatingPoint, STATUS_OK};
use crate::cache::{config_hash, load_cached, load_import};
use crate::config::{ArtifactPaths, ExcitationConfig};
use crate::error::{MagexciteError, Result};
use crate::grid::{build_grid, operating_duty, OperatingPointSpec};
use crate::oracle::{DeviceOracle, OracleExcitation, ProcessedSummary, WindingExcitation};
use crate::output::{error_artifact, write_json_file};
use crate::spectral::{dft_harmonics, select_harmonic_orders, HarmonicPhasor};
use crate::stats::Stats;
use crate::waveform::{synthesize_current, synthesize_voltage};

const SOURCE_TAG: &str = "om_converter_2switch_forward";
const TOPOLOGY_TAG: &str = "two_switch_forward";
const ORACLE_TOPOLOGY: &str = "2-switch forward";

/// How the output artifact of a run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcitationOutcome {
    Imported,
    Cached,
    Built { operating_points: usize },
}

/// Spectral results for one grid point, before oracle involvement.
struct PointSpectra {
    spec: OperatingPointSpec,
    duty: f64,
    rms_currents: Vec<f64>,
    rms_voltages: Vec<f64>,
    currents: Vec<Vec<f64>>,
    voltages: Vec<Vec<f64>>,
    current_harmonics: Vec<Vec<HarmonicPhasor>>,
    voltage_harmonics: Vec<Vec<HarmonicPhasor>>,
    orders: Vec<usize>,
}

fn analyze_point(cfg: &ExcitationConfig, spec: OperatingPointSpec) -> PointSpectra {
    let duty = operating_duty(cfg, &spec);
    let n = cfg.samples_per_period;
    let n_w = cfg.windings.len();

    let mut out = PointSpectra {
        spec,
        duty,
        rms_currents: Vec::with_capacity(n_w),
        rms_voltages: Vec::with_capacity(n_w),
        currents: Vec::with_capacity(n_w),
        voltages: Vec::with_capacity(n_w),
        current_harmonics: Vec::with_capacity(n_w),
        voltage_harmonics: Vec::with_capacity(n_w),
        orders: Vec::new(),
    };

    for (idx, w) in cfg.windings.iter().enumerate() {
        let i_rms = w.rms_current_a.abs() * spec.load_scale;
        let v_rms = w.rms_voltage_v.abs() * spec.line_scale;

        let iw = synthesize_current(i_rms, duty, spec.mode, w.phase_deg, n, &cfg.shape);
        let vw = synthesize_voltage(v_rms, duty, idx, w.phase_deg, n);

        out.current_harmonics.push(dft_harmonics(&iw, cfg.harmonic_max_order));
        out.voltage_harmonics.push(dft_harmonics(&vw, cfg.harmonic_max_order));
        out.rms_currents.push(i_rms);
        out.rms_voltages.push(v_rms);
        out.currents.push(iw);
        out.voltages.push(vw);
    }

    out.orders = select_harmonic_orders(
        &out.current_harmonics,
        cfg.harmonic_energy_pct,
        cfg.small_harmonic_pct,
        cfg.small_harmonic_consecutive,
    );
    out
}

fn rectangular_harmonic(ps: &PointSpectra, order: usize, f0: f64) -> ExcitationHarmonic {
    let k = order - 1;
    let n_w = ps.current_harmonics.len();
    let mut h = ExcitationHarmonic {
        order,
        frequency_hz: f0 * order as f64,
        currents_real_a: Vec::with_capacity(n_w),
        currents_imag_a: Vec::with_capacity(n_w),
        voltages_real_v: Vec::with_capacity(n_w),
        voltages_imag_v: Vec::with_capacity(n_w),
    };
    for (ih, vh) in ps.current_harmonics.iter().zip(&ps.voltage_harmonics) {
        let ic = ih[k].to_complex();
        let vc = vh[k].to_complex();
        h.currents_real_a.push(ic.re);
        h.currents_imag_a.push(ic.im);
        h.voltages_real_v.push(vc.re);
        h.voltages_imag_v.push(vc.im);
    }
    h
}

/// Sample instants of one period at `n` samples.
pub fn time_vector(n: usize, frequency_hz: f64) -> Vec<f64> {
    (0..n)
        .map(|i| i as f64 / (n as f64 * frequency_hz))
        .collect()
}

fn winding_label(cfg: &ExcitationConfig, idx: usize) -> String {
    let name = cfg.windings[idx].name.trim();
    if name.is_empty() {
        format!("W{}", idx + 1)
    } else {
        name.to_string()
    }
}

/// Build the excitation profile for a validated config.
///
/// The returned profile has an empty `config_hash` and no generator info;
/// [`run`] stamps both.
pub fn build_excitation(
    cfg: &ExcitationConfig,
    oracle: &dyn DeviceOracle,
    mut stats: Option<&mut Stats>,
) -> Result<ExcitationProfile> {
    let grid = build_grid(cfg);
    let _span = tracing::info_span!(
        "excitation_build",
        points = grid.len(),
        windings = cfg.windings.len(),
        samples = cfg.samples_per_period,
    )
    .entered();

    let t_spectral = stats.is_some().then(Instant::now);
    let spectra: Vec<PointSpectra> = grid
        .par_iter()
        .map(|&spec| analyze_point(cfg, spec))
        .collect();
    if let (Some(s), Some(t)) = (stats.as_deref_mut(), t_spectral) {
        s.add_phase("synthesis + DFT", t.elapsed());
        s.operating_points += spectra.len() as u32;
        s.dft_evaluations += (2 * spectra.len() * cfg.windings.len()) as u32;
    }

    let t_assemble = stats.is_some().then(Instant::now);
    let time = time_vector(cfg.samples_per_period, cfg.frequency_hz);
    let mut operating_points = Vec::with_capacity(spectra.len());

    for ps in spectra {
        let name = ps.spec.name();
        let harmonics: Vec<ExcitationHarmonic> = ps
            .orders
            .iter()
            .map(|&order| rectangular_harmonic(&ps, order, cfg.frequency_hz))
            .collect();
        if harmonics.is_empty() {
            return Err(MagexciteError::NoHarmonics(name));
        }
        tracing::debug!(
            op = %name,
            duty = ps.duty,
            harmonics = harmonics.len(),
            "operating point analyzed"
        );

        let excitation = OracleExcitation {
            name: name.clone(),
            topology: ORACLE_TOPOLOGY.to_string(),
            frequency_hz: cfg.frequency_hz,
            time: time.clone(),
            windings: ps
                .currents
                .into_iter()
                .zip(ps.voltages)
                .enumerate()
                .map(|(idx, (current, voltage))| WindingExcitation {
                    name: winding_label(cfg, idx),
                    current,
                    voltage,
                })
                .collect(),
        };
        let processed_summary = match oracle.summarize(&excitation) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(op = %name, error = %e, "oracle summary failed");
                if let Some(ref mut s) = stats {
                    s.oracle_failures += 1;
                }
                ProcessedSummary::failed(&e)
            }
        };
        if let Some(ref mut s) = stats {
            s.oracle_calls += 1;
            s.harmonics_retained += harmonics.len() as u32;
        }

        operating_points.push(OperatingPoint {
            name,
            line_scale: ps.spec.line_scale,
            load_scale: ps.spec.load_scale,
            conduction_mode: ps.spec.mode,
            frequency_hz: cfg.frequency_hz,
            duty: ps.duty,
            rms_currents_a: ps.rms_currents,
            rms_voltages_v: ps.rms_voltages,
            harmonic_count: harmonics.len(),
            harmonics,
            processed_summary,
        });
    }
    if let (Some(s), Some(t)) = (stats.as_deref_mut(), t_assemble) {
        s.add_phase("assembly + oracle", t.elapsed());
    }

    Ok(ExcitationProfile {
        status: STATUS_OK.to_string(),
        source: SOURCE_TAG.to_string(),
        topology: TOPOLOGY_TAG.to_string(),
        sweep_mode: cfg.sweep_mode.as_str().to_string(),
        conduction_mode: cfg.conduction.as_str().to_string(),
        frequency_hz: cfg.frequency_hz,
        harmonic_energy_pct: cfg.harmonic_energy_pct,
        harmonic_max_order: cfg.harmonic_max_order,
        operating_points,
        config_hash: String::new(),
        generator: None,
    })
}

/// Produce the excitation artifact for a raw config document.
///
/// 1. If `use_import` and the import file holds an OK profile, copy it.
/// 2. If `use_cache` and the cache holds an OK profile with the same hash,
///    copy it.
/// 3. Otherwise validate, build, write, and refresh the cache.
///
/// Configuration errors write an `ERROR` artifact to the output path and are
/// returned to the caller.
pub fn run(
    raw: &Value,
    oracle: &dyn DeviceOracle,
    mut stats: Option<&mut Stats>,
) -> Result<ExcitationOutcome> {
    let hash = config_hash(raw);
    let artifacts = ArtifactPaths::from_value(raw)?;
    tracing::info!(config_hash = %hash, "excitation run");

    if artifacts.use_import {
        if let Some(imported) = artifacts
            .import_file
            .as_deref()
            .and_then(|p| load_import(p, &hash))
        {
            tracing::info!("using imported excitation profile");
            write_json_file(&artifacts.output_file, &imported)?;
            if let Some(ref mut s) = stats {
                s.import_hits += 1;
            }
            return Ok(ExcitationOutcome::Imported);
        }
    }

    if artifacts.use_cache {
        if let Some(cached) = load_cached(&artifacts.cache_file, &hash) {
            tracing::info!(cache = %artifacts.cache_file.display(), "cache hit");
            write_json_file(&artifacts.output_file, &cached)?;
            if let Some(ref mut s) = stats {
                s.cache_hits += 1;
            }
            return Ok(ExcitationOutcome::Cached);
        }
    }

    let built = ExcitationConfig::from_value(raw)
        .and_then(|cfg| build_excitation(&cfg, oracle, stats.as_deref_mut()));
    let mut profile = match built {
        Ok(p) => p,
        Err(e) => {
            write_json_file(&artifacts.output_file, &error_artifact(&e.to_string(), &hash))?;
            return Err(e);
        }
    };

    profile.config_hash = hash;
    profile.generator = Some(GeneratorInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        oracle: oracle.name().to_string(),
    });

    write_json_file(&artifacts.output_file, &profile)?;
    if artifacts.use_cache {
        write_json_file(&artifacts.cache_file, &profile)?;
    }

    Ok(ExcitationOutcome::Built {
        operating_points: profile.operating_points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Unavailable;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn two_winding(extra: Value) -> ExcitationConfig {
        let mut v = json!({
            "frequency_hz": 100000,
            "windings": [
                {"name": "primary", "rms_current_a": 5.0, "rms_voltage_v": 20.0},
                {"name": "secondary", "rms_current_a": 2.0, "rms_voltage_v": 100.0, "phase_deg": 180.0}
            ],
            "sweep_mode": "nominal",
            "conduction_mode": "ccm",
            "harmonic_energy_pct": 99.0,
            "samples_per_period": 512,
            "harmonic_max_order": 40
        });
        for (k, val) in extra.as_object().unwrap() {
            v[k] = val.clone();
        }
        ExcitationConfig::from_value(&v).unwrap()
    }

    #[test]
    fn test_point_spectra_respect_load_and_line_scaling() {
        let cfg = two_winding(json!({}));
        let spec = OperatingPointSpec {
            line_scale: 1.1,
            load_scale: 0.5,
            mode: crate::config::ConductionMode::Ccm,
        };
        let ps = analyze_point(&cfg, spec);
        assert_relative_eq!(ps.rms_currents[0], 2.5);
        assert_relative_eq!(ps.rms_voltages[1], 110.0);
        assert_eq!(ps.current_harmonics[0].len(), 40);
        assert_eq!(ps.orders[0], 1);
    }

    #[test]
    fn test_rectangular_harmonic_frequency_and_components() {
        let cfg = two_winding(json!({}));
        let ps = analyze_point(&cfg, build_grid(&cfg)[0]);
        let h = rectangular_harmonic(&ps, 3, cfg.frequency_hz);
        assert_eq!(h.order, 3);
        assert_relative_eq!(h.frequency_hz, 300e3);
        assert_eq!(h.currents_real_a.len(), 2);
        let mag = h.currents_real_a[0].hypot(h.currents_imag_a[0]);
        assert_relative_eq!(mag, ps.current_harmonics[0][2].amplitude, max_relative = 1e-12);
    }

    #[test]
    fn test_oracle_failure_is_recorded_not_fatal() {
        let cfg = two_winding(json!({"conduction_mode": "ccm+dcm"}));
        let profile = build_excitation(&cfg, &Unavailable, None).unwrap();
        assert_eq!(profile.operating_points.len(), 2);
        for op in &profile.operating_points {
            assert!(!op.processed_summary.ok);
            assert!(!op.processed_summary.error.is_empty());
        }
    }

    #[test]
    fn test_time_vector_spans_one_period() {
        let t = time_vector(4, 1000.0);
        assert_eq!(t, vec![0.0, 0.25e-3, 0.5e-3, 0.75e-3]);
    }
}
