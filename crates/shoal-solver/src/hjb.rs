//! Backward HJB sweep for the value function.
//!
//! Each step solves
//!
//! ```text
//! (I - dt * L_k) U_n = U_{n+1} + dt * (running(x) + H(p, eta_n))
//! ```
//!
//! where `p` is the central gradient of the current iterate and `L_k` is
//! the conservative Laplacian with coefficient `k_i = nu + d_i`. The
//! Lax-Friedrichs dissipation `d_i = theta_i / 2 * max(dx, dt * theta_i)`
//! uses the local Lipschitz bound `theta_i` of `H` over the two one-sided
//! gradients, and sits inside the implicit solve so the scheme stays
//! monotone without a CFL bound on `dt`.
//!
//! The Hamiltonian is lagged on the previous sub-iterate. The first
//! sub-iteration takes the full implicit step from `U_{n+1}`. Later ones
//! blend the new solve into the iterate with weight `relaxation`, which
//! keeps the inner map contractive when `dt * theta` is large against
//! `dx`. Solved values are clipped to `value_cap` when one is set.

use shoal_core::{Field, StepError};
use shoal_grid::{ops, Grid, TridiagonalSolver};
use shoal_model::{Hamiltonian, Model};
use tracing::debug;

use crate::config::HjbConfig;

/// Output of one backward step.
#[derive(Clone, Debug, PartialEq)]
pub struct HjbStep {
    /// Value at the produced time node.
    pub values: Vec<f64>,
    /// Sup-norm change over the last sub-iteration.
    pub residual: f64,
    /// Sub-iterations performed.
    pub sub_iterations: usize,
}

/// Marches the value function backward from its terminal condition.
///
/// Holds only borrowed, read-only state; every call returns fresh arrays.
pub struct HjbStepper<'a> {
    grid: &'a Grid,
    model: &'a Model,
    solver: &'a dyn TridiagonalSolver,
    config: &'a HjbConfig,
    running: Vec<f64>,
}

impl<'a> HjbStepper<'a> {
    /// Create a stepper over `grid` for `model`.
    pub fn new(
        grid: &'a Grid,
        model: &'a Model,
        solver: &'a dyn TridiagonalSolver,
        config: &'a HjbConfig,
    ) -> Self {
        let running = grid.xs().iter().map(|&x| model.running_cost(x)).collect();
        Self {
            grid,
            model,
            solver,
            config,
            running,
        }
    }

    /// Terminal condition `U(T, x)`.
    pub fn terminal(&self) -> Vec<f64> {
        self.grid
            .xs()
            .iter()
            .map(|&x| self.model.terminal_cost(x))
            .collect()
    }

    /// Produce the value at `time_index` from the value one node later.
    ///
    /// Fails if the implicit solve breaks down, the iterate goes
    /// non-finite, or the inner loop ends above `tol` with a larger
    /// residual than its first sub-iteration.
    ///
    /// # Panics
    ///
    /// Panics if `next.len() != grid.nx()`.
    pub fn step(&self, next: &[f64], eta: f64, time_index: usize) -> Result<HjbStep, StepError> {
        let nx = self.grid.nx();
        assert_eq!(next.len(), nx, "value row length does not match grid");
        let (dx, dt) = (self.grid.dx(), self.grid.dt());
        let nu = self.model.diffusion();

        let mut iterate = next.to_vec();
        let mut first_residual = None;
        let mut residual = f64::INFINITY;
        let mut sub_iterations = 0;
        let mut coeff = vec![0.0; nx];
        let mut rhs = vec![0.0; nx];

        for k in 0..self.config.inner {
            let (backward, forward) = ops::one_sided_gradients(&iterate, dx, self.grid.boundary());
            for i in 0..nx {
                let p = 0.5 * (backward[i] + forward[i]);
                let theta = self
                    .model
                    .lipschitz_bound(backward[i].abs().max(forward[i].abs()), eta);
                coeff[i] = nu + self.dissipation(theta);
                rhs[i] = next[i] + dt * (self.running[i] + self.model.hamiltonian(p, eta));
            }
            let system = ops::laplacian_bands(self.grid, &coeff).implicit_system(dt);
            let mut values = self
                .solver
                .solve_tridiagonal(&system, &rhs)
                .map_err(|source| StepError::LinearSolve { time_index, source })?;
            if values.iter().any(|v| !v.is_finite()) {
                return Err(StepError::NonFinite {
                    time_index,
                    field: "value",
                });
            }
            if let Some(cap) = self.config.value_cap {
                for v in &mut values {
                    *v = v.clamp(-cap, cap);
                }
            }
            // The first solve is the plain implicit step; later ones are blended.
            if k > 0 {
                let w = self.config.relaxation;
                for (v, old) in values.iter_mut().zip(&iterate) {
                    *v = old + w * (*v - old);
                }
            }
            residual = values
                .iter()
                .zip(&iterate)
                .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
            first_residual.get_or_insert(residual);
            iterate = values;
            sub_iterations += 1;
            if residual < self.config.tol {
                break;
            }
        }

        let first_residual = first_residual.unwrap_or(residual);
        if residual >= self.config.tol && sub_iterations >= 2 {
            if residual > first_residual {
                return Err(StepError::HjbStalled {
                    time_index,
                    first_residual,
                    last_residual: residual,
                });
            }
            debug!(
                time_index,
                residual,
                sub_iterations,
                "HJB inner loop stopped above tolerance"
            );
        }
        Ok(HjbStep {
            values: iterate,
            residual,
            sub_iterations,
        })
    }

    /// Lax-Friedrichs diffusion coefficient for a local Lipschitz bound.
    fn dissipation(&self, theta: f64) -> f64 {
        let d = 0.5 * theta * self.grid.dx().max(self.grid.dt() * theta);
        match self.config.max_dissipation {
            Some(cap) => d.min(cap),
            None => d,
        }
    }

    /// Full backward sweep with friction `eta[n]` at each time node.
    ///
    /// # Panics
    ///
    /// Panics if `eta.len() != grid.nt()`.
    pub fn solve(&self, eta: &[f64]) -> Result<Field, StepError> {
        let nt = self.grid.nt();
        assert_eq!(eta.len(), nt, "friction length does not match time nodes");
        let mut value = Field::zeros(nt, self.grid.nx());
        value.set_row(nt - 1, &self.terminal());
        for n in (0..nt - 1).rev() {
            let step = self.step(value.row(n + 1), eta[n], n)?;
            value.set_row(n, &step.values);
        }
        Ok(value)
    }
}

/// Optimal control `alpha[n, i]` from the value field and per-node friction.
///
/// # Panics
///
/// Panics if the value field does not match the grid or `eta` has the
/// wrong length.
pub fn control_field(grid: &Grid, model: &Model, value: &Field, eta: &[f64]) -> Field {
    assert!(
        value.nt() == grid.nt() && value.nx() == grid.nx(),
        "value field does not match grid"
    );
    assert_eq!(eta.len(), grid.nt(), "friction length does not match time nodes");
    let mut control = Field::zeros(grid.nt(), grid.nx());
    for (n, row) in value.rows().enumerate() {
        let grad = ops::gradient(row, grid.dx(), grid.boundary());
        let alpha: Vec<f64> = grad
            .iter()
            .map(|&p| model.optimal_control(p, eta[n]))
            .collect();
        control.set_row(n, &alpha);
    }
    control
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::LinearSolveError;
    use shoal_grid::{Thomas, Tridiagonal};
    use shoal_model::LqHft;

    fn lq(nu: f64, phi: f64, gamma_t: f64, eta0: f64) -> Model {
        Model::from(LqHft {
            nu,
            phi,
            gamma_t,
            eta0,
            eta1: 0.0,
            alpha_cap: None,
        })
    }

    /// Riccati coefficient `a(0)` for `U = a(t) x^2 + b(t)`, integrated
    /// backward with RK4: `da/dtau = phi - 2 a^2 / eta`.
    fn riccati(phi: f64, gamma_t: f64, eta: f64, horizon: f64) -> f64 {
        let steps = 10_000;
        let h = horizon / steps as f64;
        let f = |a: f64| phi - 2.0 * a * a / eta;
        let mut a = gamma_t;
        for _ in 0..steps {
            let k1 = f(a);
            let k2 = f(a + 0.5 * h * k1);
            let k3 = f(a + 0.5 * h * k2);
            let k4 = f(a + h * k3);
            a += h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
        }
        a
    }

    #[test]
    fn terminal_row_is_terminal_cost() {
        let grid = Grid::uniform(-2.0, 2.0, 21, 1.0, 11).unwrap();
        let model = lq(0.1, 0.1, 2.0, 1.0);
        let cfg = HjbConfig::default();
        let stepper = HjbStepper::new(&grid, &model, &Thomas, &cfg);
        let value = stepper.solve(&vec![1.0; 11]).unwrap();
        for (x, u) in grid.xs().iter().zip(value.row(10)) {
            assert_eq!(*u, 2.0 * x * x);
        }
    }

    #[test]
    fn costless_problem_has_zero_value() {
        let grid = Grid::uniform(-1.0, 1.0, 11, 1.0, 6).unwrap();
        let model = lq(0.2, 0.0, 0.0, 1.0);
        let cfg = HjbConfig::default();
        let value = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&vec![1.0; 6])
            .unwrap();
        assert!(value.as_slice().iter().all(|u| *u == 0.0));
    }

    #[test]
    fn gradient_tracks_riccati_solution() {
        let (phi, gamma_t, eta, horizon) = (0.1, 1.0, 1.0, 0.5);
        let grid = Grid::uniform(-4.0, 4.0, 321, horizon, 101).unwrap();
        let model = lq(0.1, phi, gamma_t, eta);
        let cfg = HjbConfig::default();
        let value = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&vec![eta; 101])
            .unwrap();
        let a0 = riccati(phi, gamma_t, eta, horizon);
        let grad = ops::central_difference(value.row(0), grid.dx());
        // x = +-1 sit at nodes 120 and 200.
        for i in [120, 200] {
            let x = grid.xs()[i];
            let expected = 2.0 * a0 * x;
            let rel = (grad[i] - expected).abs() / expected.abs();
            assert!(rel < 0.1, "x={x}: grad {} vs riccati {expected}", grad[i]);
        }
    }

    #[test]
    fn value_is_symmetric_with_minimum_at_center() {
        let grid = Grid::uniform(-2.0, 2.0, 41, 1.0, 21).unwrap();
        let model = lq(0.05, 0.1, 2.0, 0.5);
        let cfg = HjbConfig::default();
        let value = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&vec![0.5; 21])
            .unwrap();
        assert!(value.is_finite());
        for row in value.rows() {
            for i in 0..41 {
                let scale = row[i].abs().max(1.0);
                assert!((row[i] - row[40 - i]).abs() < 1e-9 * scale);
                assert!(row[i] >= row[20] - 1e-12);
            }
        }
        // Value accumulates running cost going backward at the origin.
        assert!(value.get(0, 20) > value.get(20, 20));
    }

    #[test]
    fn controls_push_inventory_toward_zero() {
        let grid = Grid::uniform(-2.0, 2.0, 41, 1.0, 11).unwrap();
        let model = lq(0.05, 0.1, 2.0, 0.5);
        let cfg = HjbConfig::default();
        let eta = vec![0.5; 11];
        let value = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&eta)
            .unwrap();
        let control = control_field(&grid, &model, &value, &eta);
        for row in control.rows() {
            for (i, a) in row.iter().enumerate() {
                let x = grid.xs()[i];
                if x > 1e-9 {
                    assert!(*a <= 0.0, "alpha({x}) = {a}");
                } else if x < -1e-9 {
                    assert!(*a >= 0.0, "alpha({x}) = {a}");
                }
            }
        }
        // Terminal control is -2 gamma x / eta in the interior.
        let last = control.row(10);
        assert!((last[30] - (-2.0 * 2.0 * grid.xs()[30] / 0.5)).abs() < 1e-9);
        // Zero-flux edges carry no control.
        assert_eq!(last[0], 0.0);
        assert_eq!(last[40], 0.0);
    }

    #[test]
    fn step_reports_residual_and_sub_iterations() {
        let grid = Grid::uniform(-1.0, 1.0, 21, 0.1, 11).unwrap();
        let model = lq(0.1, 0.1, 1.0, 1.0);
        let cfg = HjbConfig {
            inner: 6,
            tol: 1e-12,
            ..HjbConfig::default()
        };
        let stepper = HjbStepper::new(&grid, &model, &Thomas, &cfg);
        let step = stepper.step(&stepper.terminal(), 1.0, 9).unwrap();
        assert!(step.sub_iterations >= 1 && step.sub_iterations <= 6);
        assert!(step.residual.is_finite());
    }

    #[test]
    fn blending_keeps_the_inner_fixed_point() {
        let grid = Grid::uniform(-1.0, 1.0, 21, 0.1, 11).unwrap();
        let model = lq(0.1, 0.1, 1.0, 1.0);
        let run = |relaxation: f64| {
            let cfg = HjbConfig {
                inner: 200,
                tol: 1e-13,
                relaxation,
                ..HjbConfig::default()
            };
            let stepper = HjbStepper::new(&grid, &model, &Thomas, &cfg);
            stepper.step(&stepper.terminal(), 1.0, 9).unwrap()
        };
        let plain = run(1.0);
        let blended = run(0.5);
        assert!(blended.sub_iterations > plain.sub_iterations);
        for (a, b) in plain.values.iter().zip(&blended.values) {
            assert!((a - b).abs() < 1e-10, "{a} vs {b}");
        }
    }

    #[test]
    fn solved_values_respect_value_cap() {
        let grid = Grid::uniform(-3.0, 3.0, 31, 0.5, 11).unwrap();
        let model = lq(0.1, 0.1, 2.0, 1.0);
        let cfg = HjbConfig {
            value_cap: Some(5.0),
            ..HjbConfig::default()
        };
        let value = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&vec![1.0; 11])
            .unwrap();
        for row in value.rows().take(10) {
            assert!(row.iter().all(|u| u.abs() <= 5.0));
        }
        // The terminal row is left as given.
        assert_eq!(value.get(10, 0), 18.0);
    }

    #[test]
    fn dissipation_is_capped_when_configured() {
        let grid = Grid::uniform(-1.0, 1.0, 21, 1.0, 11).unwrap();
        let model = lq(0.1, 0.1, 1.0, 1.0);
        let free = HjbConfig::default();
        let capped = HjbConfig {
            max_dissipation: Some(0.1),
            ..HjbConfig::default()
        };
        let free = HjbStepper::new(&grid, &model, &Thomas, &free);
        let capped = HjbStepper::new(&grid, &model, &Thomas, &capped);
        // dx = dt = 0.1: theta * dt overtakes dx once theta > 1.
        assert!((free.dissipation(4.0) - 0.8).abs() < 1e-12);
        assert!((free.dissipation(0.5) - 0.025).abs() < 1e-12);
        assert_eq!(capped.dissipation(4.0), 0.1);
        assert!((capped.dissipation(0.5) - 0.025).abs() < 1e-12);
    }

    struct Broken;

    impl TridiagonalSolver for Broken {
        fn solve_tridiagonal(
            &self,
            _bands: &Tridiagonal,
            _rhs: &[f64],
        ) -> Result<Vec<f64>, LinearSolveError> {
            Err(LinearSolveError::Singular { row: 3, pivot: 0.0 })
        }
    }

    #[test]
    fn singular_solve_reports_time_index() {
        let grid = Grid::uniform(-1.0, 1.0, 11, 1.0, 6).unwrap();
        let model = lq(0.1, 0.1, 1.0, 1.0);
        let cfg = HjbConfig::default();
        match HjbStepper::new(&grid, &model, &Broken, &cfg).solve(&vec![1.0; 6]) {
            Err(StepError::LinearSolve { time_index: 4, .. }) => {}
            other => panic!("expected LinearSolve at time index 4, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_friction_is_reported() {
        let grid = Grid::uniform(-1.0, 1.0, 11, 1.0, 6).unwrap();
        let model = lq(0.1, 0.1, 1.0, 1.0);
        let cfg = HjbConfig::default();
        let mut eta = vec![1.0; 6];
        eta[2] = f64::NAN;
        let err = HjbStepper::new(&grid, &model, &Thomas, &cfg)
            .solve(&eta)
            .unwrap_err();
        assert_eq!(err.time_index(), 2);
    }
}
