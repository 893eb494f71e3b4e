//! End-to-end tests for excitation-profile generation.

use approx::assert_relative_eq;
use magexcite::analysis::excitation::{self, ExcitationOutcome};
use magexcite::analysis::ExcitationProfile;
use magexcite::config::{self, ConductionMode, ShapeConstants};
use magexcite::oracle::{Unavailable, WaveformProcessor};
use magexcite::stats::Stats;
use magexcite::waveform;
use serde_json::{json, Value};
use std::path::Path;

/// Two-winding forward converter at 100 kHz, written to `dir`.
fn forward_config(dir: &Path, extra: Value) -> Value {
    let mut cfg = json!({
        "frequency_hz": 100000,
        "windings": [
            {"name": "primary", "rms_current_a": 5.0, "rms_voltage_v": 20.0},
            {"name": "secondary", "rms_current_a": 2.0, "rms_voltage_v": 100.0}
        ],
        "sweep_mode": "nominal",
        "conduction_mode": "ccm",
        "harmonic_energy_pct": 99.0,
        "output_file": dir.join("profile.json"),
        "cache_file": dir.join("cache.json"),
    });
    if let (Some(base), Some(extra)) = (cfg.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    cfg
}

fn read_profile(path: &Path) -> ExcitationProfile {
    let text = std::fs::read_to_string(path).expect("profile missing");
    serde_json::from_str(&text).expect("profile does not parse")
}

#[test]
fn test_nominal_ccm_two_winding_profile() {
    let dir = tempfile::tempdir().unwrap();
    let raw = forward_config(dir.path(), json!({"use_cache": false}));

    let outcome = excitation::run(&raw, &WaveformProcessor, None).expect("run failed");
    assert_eq!(outcome, ExcitationOutcome::Built { operating_points: 1 });

    let profile = read_profile(&dir.path().join("profile.json"));
    assert_eq!(profile.status, "OK");
    assert_eq!(profile.config_hash.len(), 64);
    assert_eq!(profile.operating_points.len(), 1);

    let op = &profile.operating_points[0];
    assert_eq!(op.name, "line_1.00_load_1.00_ccm");
    assert_eq!(op.conduction_mode, ConductionMode::Ccm);
    assert!(op.harmonic_count >= 1);
    assert_eq!(op.harmonic_count, op.harmonics.len());
    assert_eq!(op.harmonics[0].order, 1);
    assert_relative_eq!(op.harmonics[0].frequency_hz, 100e3);
    for h in &op.harmonics {
        assert_eq!(h.currents_real_a.len(), 2);
        assert_eq!(h.voltages_imag_v.len(), 2);
        assert_relative_eq!(h.frequency_hz, h.order as f64 * 100e3, max_relative = 1e-12);
    }
    // Orders strictly increasing.
    assert!(op.harmonics.windows(2).all(|w| w[0].order < w[1].order));

    assert!(op.processed_summary.ok);
    assert_eq!(op.processed_summary.windings.len(), 2);
    assert_relative_eq!(op.processed_summary.windings[0].current_rms, 5.0, max_relative = 1e-9);
    assert_relative_eq!(op.processed_summary.windings[1].voltage_rms, 100.0, max_relative = 1e-9);

    let generator = profile.generator.expect("generator missing");
    assert_eq!(generator.oracle, "processor");
}

#[test]
fn test_grid_sweep_covers_every_combination() {
    let dir = tempfile::tempdir().unwrap();
    let raw = forward_config(
        dir.path(),
        json!({
            "sweep_mode": "grid",
            "conduction_mode": "ccm+dcm",
            "line_scales": [1.1, 0.9],
            "load_scales": [0.5, 1.0, 0.5],
            "use_cache": false
        }),
    );
    let mut stats = Stats::new();
    excitation::run(&raw, &Unavailable, Some(&mut stats)).expect("run failed");
    let profile = read_profile(&dir.path().join("profile.json"));

    assert_eq!(profile.operating_points.len(), 8);
    assert_eq!(stats.operating_points, 8);
    assert_eq!(profile.operating_points[0].name, "line_0.90_load_0.50_ccm");
    assert!(profile
        .operating_points
        .iter()
        .all(|op| !op.processed_summary.ok && !op.harmonics.is_empty()));

    let op = profile
        .operating_points
        .iter()
        .find(|op| op.name == "line_1.10_load_0.50_dcm")
        .expect("dcm corner missing");
    assert_relative_eq!(op.rms_currents_a[0], 2.5);
    assert_relative_eq!(op.rms_voltages_v[1], 110.0, max_relative = 1e-12);
    assert!(op.duty <= 0.42);
}

#[test]
fn test_second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let raw = forward_config(dir.path(), json!({}));
    let out = dir.path().join("profile.json");

    let first = excitation::run(&raw, &WaveformProcessor, None).unwrap();
    assert!(matches!(first, ExcitationOutcome::Built { .. }));
    let first_bytes = std::fs::read(&out).unwrap();
    std::fs::remove_file(&out).unwrap();

    let mut stats = Stats::new();
    let second = excitation::run(&raw, &WaveformProcessor, Some(&mut stats)).unwrap();
    assert_eq!(second, ExcitationOutcome::Cached);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(std::fs::read(&out).unwrap(), first_bytes);
}

#[test]
fn test_changed_config_misses_cache() {
    let dir = tempfile::tempdir().unwrap();
    excitation::run(&forward_config(dir.path(), json!({})), &WaveformProcessor, None).unwrap();
    let changed = forward_config(dir.path(), json!({"harmonic_energy_pct": 95.0}));
    let outcome = excitation::run(&changed, &WaveformProcessor, None).unwrap();
    assert!(matches!(outcome, ExcitationOutcome::Built { .. }));
}

#[test]
fn test_import_overrides_generation() {
    let dir = tempfile::tempdir().unwrap();
    let import = dir.path().join("external.json");
    std::fs::write(&import, r#"{"status":"OK","operating_points":[],"source":"bench"}"#).unwrap();
    let raw = forward_config(
        dir.path(),
        json!({"use_import": true, "import_file": import, "windings": []}),
    );

    let outcome = excitation::run(&raw, &WaveformProcessor, None).unwrap();
    assert_eq!(outcome, ExcitationOutcome::Imported);

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("profile.json")).unwrap())
            .unwrap();
    assert_eq!(written["loaded_from_import"], true);
    assert_eq!(written["source"], "bench");
    assert_eq!(
        written["config_hash"].as_str().unwrap(),
        magexcite::cache::config_hash(&raw)
    );
}

#[test]
fn test_missing_windings_writes_error_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let raw = forward_config(dir.path(), json!({"windings": []}));

    let err = excitation::run(&raw, &WaveformProcessor, None).unwrap_err();
    assert!(err.to_string().contains("no windings"));

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("profile.json")).unwrap())
            .unwrap();
    assert_eq!(written["status"], "ERROR");
    assert!(written["error"].as_str().unwrap().contains("no windings"));
    assert_eq!(written["config_hash"].as_str().unwrap().len(), 64);
    assert!(!dir.path().join("cache.json").exists());
}

#[test]
fn test_config_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("excite.json");
    std::fs::write(&path, forward_config(dir.path(), json!({})).to_string()).unwrap();

    let raw = config::read_json(&path).unwrap();
    let cfg = config::ExcitationConfig::from_value(&raw).unwrap();
    assert_eq!(cfg.windings.len(), 2);
    assert_eq!(cfg.artifacts.output_file, dir.path().join("profile.json"));
    assert_eq!(magexcite::cache::config_hash(&raw).len(), 64);

    let err = config::read_json(&dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_null_import_file_means_no_import() {
    let dir = tempfile::tempdir().unwrap();
    let raw = forward_config(
        dir.path(),
        json!({"use_import": true, "import_file": null, "use_cache": null}),
    );

    let outcome = excitation::run(&raw, &WaveformProcessor, None).expect("run failed");
    assert_eq!(outcome, ExcitationOutcome::Built { operating_points: 1 });
    assert_eq!(read_profile(&dir.path().join("profile.json")).status, "OK");
    // `use_cache: null` keeps the default, so the cache is refreshed.
    assert!(dir.path().join("cache.json").exists());
}

#[test]
fn test_synthesized_rms_matches_target() {
    let shape = ShapeConstants::default();
    for &mode in &[ConductionMode::Ccm, ConductionMode::Dcm] {
        for &duty in &[0.05, 0.2, 0.37, 0.49] {
            for &n in &[128usize, 500, 1024] {
                let i = waveform::synthesize_current(3.7, duty, mode, 45.0, n, &shape);
                assert_relative_eq!(waveform::rms(&i), 3.7, max_relative = 1e-9);
                assert!(i.iter().all(|&v| v >= 0.0));
            }
        }
    }
    for winding in 0..3 {
        let v = waveform::synthesize_voltage(48.0, 0.3, winding, -90.0, 256);
        assert_relative_eq!(waveform::rms(&v), 48.0, max_relative = 1e-9);
    }
}
