//! The Picard coordinator: the outer fixed-point loop.
//!
//! Each iteration freezes the density estimate `M`, sweeps the HJB
//! equation backward under the current friction, derives the control,
//! sweeps the FP equation forward, and blends the new density into `M`
//! with an adaptive mixing coefficient.
//!
//! # State machine
//!
//! ```text
//! Initialized -> Iterating -> { Converged | Stagnated | MaxIterReached | Failed }
//! ```
//!
//! [`PicardSolver::step`] runs one iteration and returns the new state,
//! so a caller can impose its own budget between iterations.
//! [`PicardSolver::run`] drives the loop to a terminal state.

use std::error::Error;
use std::fmt;

use shoal_core::{Field, StepError};
use shoal_grid::{ops, Grid, Thomas};
use shoal_model::{weighted_mean_abs, Hamiltonian};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SolverConfig};
use crate::fp::{FpStepper, FpSweep};
use crate::hjb::{control_field, HjbStepper};
use crate::metrics::{History, SolveMetrics};
use crate::price::{clearing_prices, PriceTrajectory};

/// Floor for the reference norm of the relative error.
const NORM_EPS: f64 = 1e-12;

// ── PicardState ────────────────────────────────────────────────────

/// Lifecycle of a [`PicardSolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PicardState {
    /// Constructed, no iteration run yet.
    Initialized,
    /// At least one iteration ran and none of the stop rules fired.
    Iterating,
    /// The density change fell below `tol` or `relative_tol`.
    Converged,
    /// The error stopped improving with `mix` at its floor.
    Stagnated,
    /// The iteration budget ran out.
    MaxIterReached,
    /// A stepper reported a stability failure.
    Failed,
}

impl PicardState {
    /// `true` for every state [`PicardSolver::step`] will not leave.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Initialized | Self::Iterating)
    }
}

impl fmt::Display for PicardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Iterating => "iterating",
            Self::Converged => "converged",
            Self::Stagnated => "stagnated",
            Self::MaxIterReached => "max_iter_reached",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ── SolveFailure ───────────────────────────────────────────────────

/// The [`PicardState::Failed`] terminal state as an error value.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveFailure {
    /// Zero-based Picard iteration during which the stepper failed.
    pub iteration: usize,
    /// The stepper's error, carrying the time index.
    pub error: StepError,
    /// History of the iterations that completed before the failure.
    pub history: History,
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Picard iteration {} failed: {}", self.iteration, self.error)
    }
}

impl Error for SolveFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

// ── Solution ───────────────────────────────────────────────────────

/// Result of a solve that ended in a non-failed state.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Value function `U[t, x]` from the last HJB sweep.
    pub value: Field,
    /// Mixed density estimate `M[t, x]`.
    pub density: Field,
    /// Control `alpha[t, x]` derived from `value`.
    pub control: Field,
    /// Friction per time node used to produce `value`.
    pub friction: Vec<f64>,
    /// State in which the loop stopped.
    pub status: PicardState,
    /// Per-iteration record.
    pub history: History,
    /// Diagnostics record.
    pub metrics: SolveMetrics,
    /// Clearing prices, when pricing is enabled.
    pub prices: Option<PriceTrajectory>,
}

// ── PicardSolver ───────────────────────────────────────────────────

/// Output of the two sweeps of one iteration.
struct Sweeps {
    value: Field,
    control: Field,
    fp: FpSweep,
}

/// Coordinator of the coupled HJB/FP fixed point.
///
/// Owns all running state: the density estimate, the latest value and
/// control fields, per-node friction, the mixing coefficient, and the
/// history. Steppers borrow the configuration and return fresh arrays.
pub struct PicardSolver {
    config: SolverConfig,
    grid: Grid,
    m0: Vec<f64>,
    density: Field,
    value: Field,
    control: Field,
    eta: Vec<f64>,
    eta_used: Vec<f64>,
    mix: f64,
    stagnant: usize,
    state: PicardState,
    history: History,
}

impl PicardSolver {
    /// Validate `config` and set up the initial iterate.
    ///
    /// `m0` defaults to the configured Gaussian. A supplied `m0` must
    /// have one entry per spatial node and is projected onto the
    /// unit-mass simplex. Logs a warning when `dt` exceeds an explicit
    /// stability bound.
    pub fn new(config: SolverConfig, m0: Option<Vec<f64>>) -> Result<Self, ConfigError> {
        let grid = config.validate()?;
        let m0 = match m0 {
            Some(m) => {
                if m.len() != grid.nx() {
                    return Err(ConfigError::InitialDensityShape {
                        expected: grid.nx(),
                        got: m.len(),
                    });
                }
                ops::project_to_simplex(&m, grid.dx())
                    .map_err(|e| ConfigError::InvalidField {
                        field: "m0",
                        reason: e.to_string(),
                    })?
                    .density
            }
            None => config.initial.sample(&grid)?,
        };

        let velocity = config
            .velocity_guess
            .unwrap_or_else(|| terminal_speed(&grid, &config));
        let limits = grid.suggest_cfl_limits(config.model.diffusion(), velocity);
        if limits.advection_exceeded() {
            warn!(
                dt = grid.dt(),
                velocity,
                courant = limits.courant(),
                "time step exceeds the advective CFL bound; FP advection will sub-cycle"
            );
        }
        if limits.diffusion_exceeded() {
            warn!(
                dt = grid.dt(),
                limit = limits.diffusive.unwrap_or(f64::INFINITY),
                "time step exceeds the explicit diffusive bound; diffusion stays implicit"
            );
        }

        let (nt, nx) = (grid.nt(), grid.nx());
        let eta = vec![config.model.friction(0.0); nt];
        Ok(Self {
            density: Field::from_row(nt, &m0),
            value: Field::zeros(nt, nx),
            control: Field::zeros(nt, nx),
            eta_used: eta.clone(),
            eta,
            mix: config.picard.mix,
            stagnant: 0,
            state: PicardState::Initialized,
            history: History::default(),
            m0,
            grid,
            config,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PicardState {
        self.state
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.history.len()
    }

    /// The validated grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The configuration this solver was built from.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The projected initial density.
    pub fn initial_density(&self) -> &[f64] {
        &self.m0
    }

    /// Current density estimate.
    pub fn density(&self) -> &Field {
        &self.density
    }

    /// Value field of the latest iteration.
    pub fn value(&self) -> &Field {
        &self.value
    }

    /// Control field of the latest iteration.
    pub fn control(&self) -> &Field {
        &self.control
    }

    /// Friction the next HJB sweep will use.
    pub fn friction(&self) -> &[f64] {
        &self.eta
    }

    /// Mixing coefficient in effect.
    pub fn mix(&self) -> f64 {
        self.mix
    }

    /// Per-iteration record so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run one Picard iteration.
    ///
    /// A no-op returning the current state once the solver is terminal.
    /// A stepper failure moves the solver to [`PicardState::Failed`] and
    /// is returned as a [`SolveFailure`].
    pub fn step(&mut self) -> Result<PicardState, SolveFailure> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let iteration = self.history.len();
        self.state = PicardState::Iterating;

        let sweeps = match self.sweep() {
            Ok(sweeps) => sweeps,
            Err(error) => {
                self.state = PicardState::Failed;
                warn!(iteration, %error, "Picard iteration failed");
                return Err(SolveFailure {
                    iteration,
                    error,
                    history: self.history.clone(),
                });
            }
        };

        let picard = &self.config.picard;
        let cell = self.grid.cell();
        let error = sweeps.fp.density.l2_distance(&self.density, cell);
        let relative_error = error / self.density.l2_norm(cell).max(NORM_EPS);

        // Adapt the mix before applying it.
        let improving = self
            .history
            .last_error()
            .is_none_or(|prev| error <= prev * (1.0 - picard.stagnation_tol));
        self.history.fp_warnings += sweeps.fp.warnings;
        if !improving || sweeps.fp.warnings > 0 {
            let decayed = (self.mix * picard.mix_decay).max(picard.mix_min);
            if decayed < self.mix {
                warn!(
                    iteration,
                    from = self.mix,
                    to = decayed,
                    fp_warnings = sweeps.fp.warnings,
                    "decaying Picard mix"
                );
                self.mix = decayed;
            }
        }
        if improving {
            self.stagnant = 0;
        } else if self.mix <= picard.mix_min {
            self.stagnant += 1;
        }

        self.history.record(error, relative_error, self.mix);
        self.density.relax_toward(&sweeps.fp.density, self.mix);
        self.value = sweeps.value;
        self.control = sweeps.control;
        self.eta_used.clone_from(&self.eta);
        if picard.dynamic_friction {
            // Friction follows the density under the same relaxation.
            let dx = self.grid.dx();
            for (n, eta) in self.eta.iter_mut().enumerate() {
                let activity = weighted_mean_abs(self.control.row(n), self.density.row(n), dx);
                let target = self.config.model.friction(activity);
                *eta += self.mix * (target - *eta);
            }
        }

        let converged =
            error < picard.tol || picard.relative_tol.is_some_and(|rel| relative_error < rel);
        self.state = if converged {
            PicardState::Converged
        } else if self.stagnant >= picard.stagnation_patience {
            PicardState::Stagnated
        } else if self.history.len() >= picard.max_iter {
            PicardState::MaxIterReached
        } else {
            PicardState::Iterating
        };

        debug!(iteration, error, relative_error, mix = self.mix, "Picard iteration");
        if self.state.is_terminal() {
            info!(
                model = self.config.model.name(),
                state = %self.state,
                iterations = self.history.len(),
                error,
                relative_error,
                "Picard loop finished"
            );
        }
        Ok(self.state)
    }

    /// Iterate to a terminal state and assemble the solution.
    ///
    /// On failure the solver is consumed and only the history survives
    /// in the [`SolveFailure`]. To keep the fields of the last good
    /// iteration, drive [`PicardSolver::step`] instead and call
    /// [`PicardSolver::finish`] after the error.
    pub fn run(mut self) -> Result<Solution, SolveFailure> {
        while !self.step()?.is_terminal() {}
        Ok(self.finish())
    }

    /// Assemble the solution from the current iterate.
    ///
    /// Callable in any state, so a caller enforcing its own budget can
    /// stop early and keep the best available fields.
    pub fn finish(self) -> Solution {
        let pricing = &self.config.pricing;
        let prices = pricing.enabled.then(|| {
            let supply = pricing.supply.resolve(&self.grid);
            clearing_prices(
                &self.control,
                &self.density,
                &supply,
                self.grid.dx(),
                pricing,
            )
        });
        let metrics = SolveMetrics::assemble(
            &self.history,
            &self.control,
            self.config.picard.mix,
            self.mix,
            self.config.picard.mix_min,
            self.state == PicardState::Stagnated,
            prices.as_ref(),
        );
        Solution {
            value: self.value,
            density: self.density,
            control: self.control,
            friction: self.eta_used,
            status: self.state,
            history: self.history,
            metrics,
            prices,
        }
    }

    fn sweep(&self) -> Result<Sweeps, StepError> {
        let model = &self.config.model;
        let hjb = HjbStepper::new(&self.grid, model, &Thomas, &self.config.hjb);
        let value = hjb.solve(&self.eta)?;
        let control = control_field(&self.grid, model, &value, &self.eta);
        let fp =
            FpStepper::new(&self.grid, model, &Thomas, &self.config.fp).solve(&self.m0, &control)?;
        Ok(Sweeps { value, control, fp })
    }
}

/// Largest control speed implied by the terminal cost at zero activity.
fn terminal_speed(grid: &Grid, config: &SolverConfig) -> f64 {
    let model = &config.model;
    let eta = model.friction(0.0);
    let terminal: Vec<f64> = grid.xs().iter().map(|&x| model.terminal_cost(x)).collect();
    ops::gradient(&terminal, grid.dx(), grid.boundary())
        .iter()
        .map(|&p| model.optimal_control(p, eta).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_model::{LqHft, Model};

    fn small_config() -> SolverConfig {
        let mut cfg = SolverConfig::default();
        cfg.grid.x_min = -2.0;
        cfg.grid.x_max = 2.0;
        cfg.grid.nx = 41;
        cfg.grid.horizon = 0.5;
        cfg.grid.nt = 11;
        cfg.model = Model::from(LqHft {
            nu: 0.05,
            phi: 0.1,
            gamma_t: 1.0,
            eta0: 1.0,
            eta1: 0.5,
            alpha_cap: None,
        });
        cfg.initial.std = 0.5;
        cfg.picard.mix = 0.5;
        cfg.picard.tol = 1e-10;
        cfg
    }

    #[test]
    fn starts_initialized_with_tiled_density() {
        let solver = PicardSolver::new(small_config(), None).unwrap();
        assert_eq!(solver.state(), PicardState::Initialized);
        assert_eq!(solver.iteration(), 0);
        for row in solver.density().rows() {
            assert_eq!(row, solver.initial_density());
        }
        assert!(solver.friction().iter().all(|eta| *eta == 1.0));
    }

    #[test]
    fn rejects_misshapen_initial_density() {
        match PicardSolver::new(small_config(), Some(vec![1.0; 7])) {
            Err(ConfigError::InitialDensityShape {
                expected: 41,
                got: 7,
            }) => {}
            Err(other) => panic!("expected InitialDensityShape, got {other:?}"),
            Ok(_) => panic!("expected InitialDensityShape, got a solver"),
        }
    }

    #[test]
    fn rejects_massless_initial_density() {
        let result = PicardSolver::new(small_config(), Some(vec![0.0; 41]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField { field: "m0", .. })
        ));
    }

    #[test]
    fn supplied_density_is_normalized() {
        let solver = PicardSolver::new(small_config(), Some(vec![2.0; 41])).unwrap();
        let mass = ops::mass(solver.initial_density(), solver.grid().dx());
        assert!((mass - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_step_records_history() {
        let mut solver = PicardSolver::new(small_config(), None).unwrap();
        let state = solver.step().unwrap();
        assert_eq!(state, PicardState::Iterating);
        assert_eq!(solver.history().len(), 1);
        assert_eq!(solver.history().mix, vec![0.5]);
        assert!(solver.history().errors[0] > 0.0);
        // Friction picked up the new controls.
        assert!(solver.friction().iter().any(|eta| *eta > 1.0));
    }

    #[test]
    fn run_converges_and_freezes() {
        let solution = PicardSolver::new(small_config(), None).unwrap().run().unwrap();
        assert_eq!(solution.status, PicardState::Converged);
        assert!(solution.metrics.final_error < 1e-10);
        assert_eq!(solution.metrics.iterations, solution.history.len());
        assert!(solution.prices.is_none());
        assert!(!solution.metrics.stalled);
    }

    #[test]
    fn step_after_termination_is_a_no_op() {
        let mut cfg = small_config();
        cfg.picard.max_iter = 2;
        let mut solver = PicardSolver::new(cfg, None).unwrap();
        assert_eq!(solver.step().unwrap(), PicardState::Iterating);
        assert_eq!(solver.step().unwrap(), PicardState::MaxIterReached);
        assert_eq!(solver.step().unwrap(), PicardState::MaxIterReached);
        assert_eq!(solver.history().len(), 2);
    }

    #[test]
    fn relative_tolerance_stops_early() {
        let mut cfg = small_config();
        cfg.picard.relative_tol = Some(1e-2);
        let solution = PicardSolver::new(cfg, None).unwrap().run().unwrap();
        assert_eq!(solution.status, PicardState::Converged);
        assert!(solution.metrics.final_error_relative < 1e-2);
        assert!(solution.metrics.final_error >= 1e-10);
    }

    #[test]
    fn static_friction_stays_at_baseline() {
        let mut cfg = small_config();
        cfg.picard.dynamic_friction = false;
        let mut solver = PicardSolver::new(cfg, None).unwrap();
        solver.step().unwrap();
        solver.step().unwrap();
        assert!(solver.friction().iter().all(|eta| *eta == 1.0));
        // Without feedback each error shrinks by exactly (1 - mix).
        let errors = &solver.history().errors;
        assert!((errors[1] / errors[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn stagnates_at_mix_floor() {
        let mut cfg = small_config();
        cfg.picard.dynamic_friction = false;
        cfg.picard.mix = 0.01;
        cfg.picard.mix_min = 0.01;
        // Demand a 50% improvement per iteration; a 1% mix delivers 1%.
        cfg.picard.stagnation_tol = 0.5;
        cfg.picard.stagnation_patience = 3;
        let solution = PicardSolver::new(cfg, None).unwrap().run().unwrap();
        assert_eq!(solution.status, PicardState::Stagnated);
        assert_eq!(solution.history.len(), 4);
        assert!(solution.metrics.stalled);
        assert_eq!(solution.metrics.mix_final, 0.01);
    }

    #[test]
    fn mix_decays_on_slow_progress() {
        let mut cfg = small_config();
        cfg.picard.dynamic_friction = false;
        cfg.picard.mix = 0.2;
        cfg.picard.mix_min = 0.05;
        cfg.picard.mix_decay = 0.5;
        cfg.picard.stagnation_tol = 0.5;
        cfg.picard.max_iter = 3;
        let solution = PicardSolver::new(cfg, None).unwrap().run().unwrap();
        assert_eq!(solution.status, PicardState::MaxIterReached);
        assert_eq!(solution.history.mix, vec![0.2, 0.1, 0.05]);
        assert_eq!(solution.metrics.mix_initial, 0.2);
        assert_eq!(solution.metrics.mix_final, 0.05);
    }

    #[test]
    fn stepper_failure_is_reported_with_history() {
        let mut cfg = small_config();
        // Overdrive the explicit advection and refuse any negativity.
        cfg.grid.nt = 3;
        cfg.fp.max_substeps = 1;
        cfg.fp.negative_tol = 0.0;
        cfg.fp.negative_fail = 1e-14;
        let mut solver = PicardSolver::new(cfg, None).unwrap();
        let failure = solver.step().unwrap_err();
        assert_eq!(failure.iteration, 0);
        assert!(failure.history.is_empty());
        assert!(matches!(failure.error, StepError::MassDeficit { .. }));
        assert!(failure.source().is_some());
        assert_eq!(solver.state(), PicardState::Failed);
        assert_eq!(solver.step().unwrap(), PicardState::Failed);
    }

    #[test]
    fn finish_after_failure_keeps_last_good_iterate() {
        let mut cfg = small_config();
        cfg.grid.nt = 3;
        cfg.fp.max_substeps = 1;
        cfg.fp.negative_tol = 0.0;
        cfg.fp.negative_fail = 1e-14;
        let mut solver = PicardSolver::new(cfg, None).unwrap();
        let m0 = solver.initial_density().to_vec();
        assert!(solver.step().is_err());

        let partial = solver.finish();
        assert_eq!(partial.status, PicardState::Failed);
        assert_eq!(partial.metrics.iterations, 0);
        for row in partial.density.rows() {
            assert_eq!(row, &m0[..]);
        }
        assert!(partial.value.is_finite());
    }

    #[test]
    fn pricing_runs_at_finish() {
        let mut cfg = small_config();
        cfg.pricing.enabled = true;
        cfg.pricing.price_sensitivity = 30.0;
        let solution = PicardSolver::new(cfg, None).unwrap().run().unwrap();
        let prices = solution.prices.unwrap();
        assert_eq!(prices.prices.len(), 11);
        let summary = solution.metrics.price.unwrap();
        assert_eq!(summary.unresolved, 0);
        assert!(summary.mean.abs() < 1e-6);
    }
}
