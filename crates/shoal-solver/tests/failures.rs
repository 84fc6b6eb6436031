//! Stability failures and configuration rejections.

use shoal_core::{LinearSolveError, StepError};
use shoal_grid::GridConfig;
use shoal_model::InitialDensity;
use shoal_solver::{
    ConfigError, FpConfig, FpStepper, HjbConfig, HjbStepper, PicardSolver, PicardState,
    SolverConfig,
};
use shoal_test_utils::{
    gaussian, inventory_averse_model, small_grid, small_grid_config, FailingSolver, FixedSolver,
};

fn small_config() -> SolverConfig {
    SolverConfig {
        grid: small_grid_config(),
        model: inventory_averse_model(),
        initial: InitialDensity {
            mean: 0.0,
            std: 0.5,
        },
        ..SolverConfig::default()
    }
}

#[test]
fn overdriven_advection_fails_the_solve() {
    let mut config = small_config();
    config.grid.nt = 3;
    config.fp.max_substeps = 1;
    config.fp.negative_fail = 1e-9;
    let failure = PicardSolver::new(config, None).unwrap().run().unwrap_err();
    assert_eq!(failure.iteration, 0);
    assert!(failure.history.is_empty());
    match failure.error {
        StepError::MassDeficit {
            time_index,
            negative_mass,
            tolerance,
        } => {
            assert_eq!(time_index, 1);
            assert!(negative_mass > tolerance);
        }
        other => panic!("expected MassDeficit, got {other:?}"),
    }
    assert!(failure.to_string().contains("iteration 0"));
}

#[test]
fn mild_negativity_decays_mix_instead_of_failing() {
    let mut config = small_config();
    config.grid.nt = 3;
    config.fp.max_substeps = 1;
    config.fp.negative_fail = 10.0;
    config.picard.max_iter = 3;
    let mut solver = PicardSolver::new(config, None).unwrap();
    let state = solver.step().unwrap();
    assert_eq!(state, PicardState::Iterating);
    assert!(solver.history().fp_warnings > 0);
    assert_eq!(solver.mix(), 0.15);
    let solution = solver.run().unwrap();
    assert!(solution.metrics.fp_warnings >= 1);
    for row in solution.density.rows() {
        assert!(row.iter().all(|m| *m >= 0.0));
    }
}

#[test]
fn hjb_reports_time_index_of_broken_solve() {
    let grid = small_grid();
    let model = inventory_averse_model();
    let config = HjbConfig {
        inner: 1,
        tol: 1e-8,
        ..HjbConfig::default()
    };
    // nt = 11: steps 9, 8 and 7 succeed, step 6 fails.
    let solver = FailingSolver::new(3);
    let err = HjbStepper::new(&grid, &model, &solver, &config)
        .solve(&[1.0; 11])
        .unwrap_err();
    assert_eq!(
        err,
        StepError::LinearSolve {
            time_index: 6,
            source: LinearSolveError::Singular { row: 0, pivot: 0.0 },
        }
    );
    assert_eq!(solver.calls(), 4);
}

#[test]
fn hjb_rejects_non_finite_values() {
    let grid = small_grid();
    let model = inventory_averse_model();
    let config = HjbConfig::default();
    let solver = FixedSolver {
        output: vec![f64::NAN; 41],
    };
    let err = HjbStepper::new(&grid, &model, &solver, &config)
        .solve(&[1.0; 11])
        .unwrap_err();
    assert_eq!(
        err,
        StepError::NonFinite {
            time_index: 9,
            field: "value",
        }
    );
}

#[test]
fn hjb_stall_is_detected() {
    let grid = small_grid();
    let model = inventory_averse_model();
    let config = HjbConfig {
        inner: 3,
        tol: 1e-12,
        relaxation: 1.0,
        ..HjbConfig::default()
    };
    // Alternates far from the iterate, so residuals never shrink.
    struct Oscillating(std::cell::Cell<bool>);
    impl shoal_grid::TridiagonalSolver for Oscillating {
        fn solve_tridiagonal(
            &self,
            bands: &shoal_grid::Tridiagonal,
            _rhs: &[f64],
        ) -> Result<Vec<f64>, LinearSolveError> {
            let flip = self.0.get();
            self.0.set(!flip);
            let level = if flip { 10.0 } else { -10.0 };
            Ok(vec![level; bands.len()])
        }
    }
    let solver = Oscillating(std::cell::Cell::new(false));
    let stepper = HjbStepper::new(&grid, &model, &solver, &config);
    let err = stepper.step(&[0.0; 41], 1.0, 4).unwrap_err();
    match err {
        StepError::HjbStalled {
            time_index,
            first_residual,
            last_residual,
        } => {
            assert_eq!(time_index, 4);
            assert_eq!(first_residual, 10.0);
            assert_eq!(last_residual, 20.0);
        }
        other => panic!("expected HjbStalled, got {other:?}"),
    }
}

#[test]
fn fp_reports_time_index_of_broken_solve() {
    let grid = small_grid();
    let model = inventory_averse_model();
    let config = FpConfig::default();
    let solver = FailingSolver::new(2);
    let m0 = gaussian(&grid, 0.0, 0.5);
    let control = shoal_core::Field::zeros(11, 41);
    let err = FpStepper::new(&grid, &model, &solver, &config)
        .solve(&m0, &control)
        .unwrap_err();
    assert_eq!(err.time_index(), 3);
    assert!(matches!(err, StepError::LinearSolve { .. }));
}

#[test]
fn invalid_configs_are_rejected_before_solving() {
    let mut config = small_config();
    config.grid = GridConfig {
        x_min: 1.0,
        x_max: -1.0,
        ..small_grid_config()
    };
    assert!(matches!(
        PicardSolver::new(config, None),
        Err(ConfigError::Grid(_))
    ));

    let mut config = small_config();
    config.initial.std = 0.0;
    assert!(matches!(
        PicardSolver::new(config, None),
        Err(ConfigError::Model(_))
    ));

    let mut config = small_config();
    config.picard.mix = 2.0;
    match PicardSolver::new(config, None) {
        Err(err @ ConfigError::InvalidField { .. }) => {
            assert!(err.to_string().starts_with("picard.mix"));
        }
        Err(other) => panic!("expected InvalidField, got {other:?}"),
        Ok(_) => panic!("expected InvalidField, got a solver"),
    }
}

#[test]
fn config_round_trips_through_json() {
    let mut config = small_config();
    config.pricing.enabled = true;
    config.picard.relative_tol = Some(1e-4);
    let json = serde_json::to_string_pretty(&config).unwrap();
    let back: SolverConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    let partial: SolverConfig =
        serde_json::from_str(r#"{"grid": {"nx": 41, "nt": 11}, "picard": {"mix": 0.5}}"#).unwrap();
    assert_eq!(partial.grid.nx, 41);
    assert_eq!(partial.picard.mix, 0.5);
    assert_eq!(partial.hjb, HjbConfig::default());
    assert!(PicardSolver::new(partial, None).is_ok());
}
