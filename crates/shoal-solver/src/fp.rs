//! Forward Fokker-Planck sweep for the inventory density.
//!
//! A step advects with the conservative upwind flux, sub-cycled so each
//! explicit sub-step satisfies `h * max|v| <= dx`, then applies implicit
//! diffusion `(I - dt * nu * L)` and projects back onto the unit-mass
//! simplex. Both stages conserve `sum(m) * dx` under zero-flux edges, so
//! the projection only absorbs roundoff and clipped negatives.

use shoal_core::{Field, StepError};
use shoal_grid::{ops, Grid, Tridiagonal, TridiagonalSolver};
use shoal_model::{Hamiltonian, Model};
use tracing::warn;

use crate::config::FpConfig;

/// Output of one forward step.
#[derive(Clone, Debug, PartialEq)]
pub struct FpStep {
    /// Projected density at the produced time node.
    pub density: Vec<f64>,
    /// Negative mass before projection.
    pub negative_mass: f64,
    /// Advection sub-steps taken.
    pub substeps: usize,
}

/// Output of a full forward sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct FpSweep {
    /// Density at every time node.
    pub density: Field,
    /// Steps whose negative mass exceeded the warning tolerance.
    pub warnings: usize,
    /// Largest negative mass seen before projection.
    pub max_negative_mass: f64,
}

/// Marches the density forward under a given control field.
pub struct FpStepper<'a> {
    grid: &'a Grid,
    solver: &'a dyn TridiagonalSolver,
    config: &'a FpConfig,
    diffusion: Tridiagonal,
}

impl<'a> FpStepper<'a> {
    /// Create a stepper over `grid` with the diffusion of `model`.
    pub fn new(
        grid: &'a Grid,
        model: &Model,
        solver: &'a dyn TridiagonalSolver,
        config: &'a FpConfig,
    ) -> Self {
        let nu = model.diffusion();
        let coeff = vec![nu; grid.nx()];
        let diffusion = ops::laplacian_bands(grid, &coeff).implicit_system(grid.dt());
        Self {
            grid,
            solver,
            config,
            diffusion,
        }
    }

    /// Number of advection sub-steps for a row with peak speed `max_speed`.
    pub fn substeps(&self, max_speed: f64) -> usize {
        let courant = self.grid.dt() * max_speed / self.grid.dx();
        if !courant.is_finite() || courant <= 1.0 {
            return 1;
        }
        let limit = self.config.max_substeps.max(1);
        if courant >= limit as f64 {
            limit
        } else {
            (courant.ceil() as usize).clamp(1, limit)
        }
    }

    /// Produce the density at `time_index` from the previous row under
    /// velocity `velocity`.
    ///
    /// # Panics
    ///
    /// Panics if either row does not match the grid.
    pub fn step(
        &self,
        density: &[f64],
        velocity: &[f64],
        time_index: usize,
    ) -> Result<FpStep, StepError> {
        let nx = self.grid.nx();
        assert_eq!(density.len(), nx, "density row length does not match grid");
        assert_eq!(velocity.len(), nx, "velocity row length does not match grid");
        let dx = self.grid.dx();
        if velocity.iter().any(|v| !v.is_finite()) {
            return Err(StepError::NonFinite {
                time_index,
                field: "control",
            });
        }

        let max_speed = velocity.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let substeps = self.substeps(max_speed);
        let h = self.grid.dt() / substeps as f64;
        let mut advected = density.to_vec();
        for _ in 0..substeps {
            let div = ops::upwind_divergence(&advected, velocity, dx);
            for (m, d) in advected.iter_mut().zip(&div) {
                *m -= h * d;
            }
        }

        let diffused = self
            .solver
            .solve_tridiagonal(&self.diffusion, &advected)
            .map_err(|source| StepError::LinearSolve { time_index, source })?;
        if diffused.iter().any(|m| !m.is_finite()) {
            return Err(StepError::NonFinite {
                time_index,
                field: "density",
            });
        }

        let negative_mass = ops::negative_mass(&diffused, dx);
        if negative_mass > self.config.negative_fail {
            return Err(StepError::MassDeficit {
                time_index,
                negative_mass,
                tolerance: self.config.negative_fail,
            });
        }
        if negative_mass > self.config.negative_tol {
            warn!(
                time_index,
                negative_mass,
                substeps,
                "density lost positivity before projection"
            );
        }
        let projection = ops::project_to_simplex(&diffused, dx)
            .map_err(|e| StepError::DegenerateMass {
                time_index,
                mass: e.mass,
            })?;
        Ok(FpStep {
            density: projection.density,
            negative_mass,
            substeps,
        })
    }

    /// Full forward sweep from `m0` under `control`.
    ///
    /// Row `n + 1` is produced from row `n` with the control at node `n`.
    ///
    /// # Panics
    ///
    /// Panics if `m0` or `control` do not match the grid.
    pub fn solve(&self, m0: &[f64], control: &Field) -> Result<FpSweep, StepError> {
        let (nt, nx) = (self.grid.nt(), self.grid.nx());
        assert!(
            control.nt() == nt && control.nx() == nx,
            "control field does not match grid"
        );
        let start = ops::project_to_simplex(m0, self.grid.dx()).map_err(|e| {
            StepError::DegenerateMass {
                time_index: 0,
                mass: e.mass,
            }
        })?;

        let mut density = Field::zeros(nt, nx);
        density.set_row(0, &start.density);
        let mut warnings = 0;
        let mut max_negative_mass = 0.0f64;
        for n in 0..nt - 1 {
            let step = self.step(density.row(n), control.row(n), n + 1)?;
            if step.negative_mass > self.config.negative_tol {
                warnings += 1;
            }
            max_negative_mass = max_negative_mass.max(step.negative_mass);
            density.set_row(n + 1, &step.density);
        }
        Ok(FpSweep {
            density,
            warnings,
            max_negative_mass,
        })
    }
}
