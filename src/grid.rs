//! Operating-point grid expansion and duty-cycle estimation.
//!
//! Points are enumerated line → load → conduction mode. Scale lists arrive
//! sorted and deduplicated from config validation, so enumeration order is a
//! pure function of the config.

use crate::config::{ConductionMode, DutyMode, ExcitationConfig, SweepMode};

/// Fallback duty when it cannot be derived from winding ratings.
const DEFAULT_DUTY: f64 = 0.40;
/// Effective conduction shortening in discontinuous mode.
const DCM_DUTY_FACTOR: f64 = 0.7;

/// One operating condition to analyze.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPointSpec {
    pub line_scale: f64,
    pub load_scale: f64,
    pub mode: ConductionMode,
}

impl OperatingPointSpec {
    /// Stable name, e.g. `line_1.00_load_0.50_dcm`.
    pub fn name(&self) -> String {
        format!(
            "line_{:.2}_load_{:.2}_{}",
            self.line_scale, self.load_scale, self.mode
        )
    }
}

/// Expand the configured sweep into the ordered list of operating points.
pub fn build_grid(cfg: &ExcitationConfig) -> Vec<OperatingPointSpec> {
    let lines = &cfg.line_scales;
    let loads = &cfg.load_scales;

    let points: Vec<(f64, f64)> = match cfg.sweep_mode {
        SweepMode::Nominal => vec![(1.0, 1.0)],
        SweepMode::Corners => {
            let (lmin, lmax) = (lines[0], lines[lines.len() - 1]);
            let (omin, omax) = (loads[0], loads[loads.len() - 1]);
            vec![(lmin, omin), (lmin, omax), (lmax, omin), (lmax, omax)]
        }
        SweepMode::Grid => lines
            .iter()
            .flat_map(|&l| loads.iter().map(move |&o| (l, o)))
            .collect(),
    };

    points
        .into_iter()
        .flat_map(|(line_scale, load_scale)| {
            cfg.conduction.modes().iter().map(move |&mode| OperatingPointSpec {
                line_scale,
                load_scale,
                mode,
            })
        })
        .collect()
}

/// Estimate the switch duty cycle at a given line scale.
///
/// Manual mode returns the configured duty. Derived mode uses the first two
/// windings: `D = (Vs / Vp) * (Np / Ns)`, clamped to [0.08, 0.48]. The line
/// scale applies to the primary voltage only, so higher line means lower duty.
pub fn estimate_duty(cfg: &ExcitationConfig, line_scale: f64) -> f64 {
    if cfg.duty_mode == DutyMode::Manual {
        return cfg.manual_duty;
    }
    let (wp, ws) = match cfg.windings.as_slice() {
        [wp, ws, ..] => (wp, ws),
        _ => return DEFAULT_DUTY,
    };

    let vp = wp.rms_voltage_v.abs() * line_scale;
    let vs = ws.rms_voltage_v.abs();
    let np = wp.n_turns.max(1.0);
    let ns = ws.n_turns.max(1.0);

    if vp > 1e-9 && vs > 1e-9 {
        ((vs / vp) * (np / ns)).clamp(0.08, 0.48)
    } else {
        DEFAULT_DUTY
    }
}

/// Duty used for a specific grid point, including the DCM reduction.
pub fn operating_duty(cfg: &ExcitationConfig, spec: &OperatingPointSpec) -> f64 {
    let duty = estimate_duty(cfg, spec.line_scale);
    match spec.mode {
        ConductionMode::Ccm => duty,
        ConductionMode::Dcm => (duty * DCM_DUTY_FACTOR).clamp(0.05, 0.42),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: serde_json::Value) -> ExcitationConfig {
        let mut v = json!({
            "windings": [
                {"name": "P", "rms_current_a": 5.0, "rms_voltage_v": 100.0, "n_turns": 10},
                {"name": "S", "rms_current_a": 2.0, "rms_voltage_v": 30.0, "n_turns": 10}
            ],
            "line_scales": [0.9, 1.1],
            "load_scales": [0.5, 1.0],
            "conduction_mode": "ccm"
        });
        for (k, val) in extra.as_object().unwrap() {
            v[k] = val.clone();
        }
        ExcitationConfig::from_value(&v).unwrap()
    }

    #[test]
    fn test_nominal_yields_single_point() {
        let grid = build_grid(&config(json!({"sweep_mode": "nominal"})));
        assert_eq!(grid.len(), 1);
        assert_eq!((grid[0].line_scale, grid[0].load_scale), (1.0, 1.0));
    }

    #[test]
    fn test_corners_yields_four_points() {
        let grid = build_grid(&config(json!({
            "sweep_mode": "corners",
            "line_scales": [1.1, 0.9, 1.0],
        })));
        let pairs: Vec<_> = grid.iter().map(|p| (p.line_scale, p.load_scale)).collect();
        assert_eq!(pairs, vec![(0.9, 0.5), (0.9, 1.0), (1.1, 0.5), (1.1, 1.0)]);
    }

    #[test]
    fn test_grid_is_full_cross_product() {
        let cfg = config(json!({
            "sweep_mode": "grid",
            "line_scales": [0.8, 1.0, 1.2],
            "load_scales": [0.25, 0.5, 1.0, 0.5],
        }));
        let grid = build_grid(&cfg);
        assert_eq!(grid.len(), 3 * 3);
        let mut names: Vec<_> = grid.iter().map(|p| p.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);
        // line-major order
        assert_eq!(grid[0].line_scale, 0.8);
        assert_eq!(grid[2].load_scale, 1.0);
        assert_eq!(grid[3].line_scale, 1.0);
    }

    #[test]
    fn test_both_modes_expand_each_point() {
        let grid = build_grid(&config(json!({
            "sweep_mode": "nominal",
            "conduction_mode": "ccm+dcm",
        })));
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].mode, ConductionMode::Ccm);
        assert_eq!(grid[1].mode, ConductionMode::Dcm);
        assert_eq!(grid[1].name(), "line_1.00_load_1.00_dcm");
    }

    #[test]
    fn test_derived_duty_from_turns_and_voltages() {
        let cfg = config(json!({}));
        assert!((estimate_duty(&cfg, 1.0) - 0.3).abs() < 1e-12);
        // 30 / (100 * 1.2)
        assert!((estimate_duty(&cfg, 1.2) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_derived_duty_clamped() {
        let cfg = config(json!({
            "windings": [
                {"rms_voltage_v": 10.0, "n_turns": 4},
                {"rms_voltage_v": 100.0, "n_turns": 1}
            ]
        }));
        assert_eq!(estimate_duty(&cfg, 1.0), 0.48);
    }

    #[test]
    fn test_single_winding_uses_default_duty() {
        let cfg = config(json!({"windings": [{"rms_voltage_v": 10.0}]}));
        assert_eq!(estimate_duty(&cfg, 1.0), DEFAULT_DUTY);
    }

    #[test]
    fn test_manual_duty_overrides() {
        let cfg = config(json!({"duty_mode": "manual", "manual_duty": 0.33}));
        assert_eq!(estimate_duty(&cfg, 1.0), 0.33);
    }

    #[test]
    fn test_dcm_duty_reduced() {
        let cfg = config(json!({}));
        let spec = OperatingPointSpec {
            line_scale: 1.0,
            load_scale: 1.0,
            mode: ConductionMode::Dcm,
        };
        assert!((operating_duty(&cfg, &spec) - 0.21).abs() < 1e-12);
    }
}
