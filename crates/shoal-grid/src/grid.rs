//! Uniform time-space grid and stability diagnostics.

use serde::{Deserialize, Serialize};
use shoal_core::GridError;

use crate::boundary::BoundaryCondition;

// ── GridConfig ─────────────────────────────────────────────────────

/// Extents and node counts for a [`Grid`].
///
/// `nt` counts time *nodes*, so `dt = horizon / (nt - 1)`; likewise
/// `dx = (x_max - x_min) / (nx - 1)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Lower edge of the inventory domain. Default: -5.0.
    pub x_min: f64,
    /// Upper edge of the inventory domain. Default: 5.0.
    pub x_max: f64,
    /// Number of spatial nodes. Default: 201. Minimum: 3.
    pub nx: usize,
    /// Time horizon `T`. Default: 1.0.
    pub horizon: f64,
    /// Number of time nodes. Default: 101. Minimum: 2.
    pub nt: usize,
    /// Edge handling. Default: Neumann.
    pub boundary: BoundaryCondition,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            x_min: -5.0,
            x_max: 5.0,
            nx: 201,
            horizon: 1.0,
            nt: 101,
            boundary: BoundaryCondition::Neumann,
        }
    }
}

// ── Grid ───────────────────────────────────────────────────────────

/// The discretized domain `[x_min, x_max] x [0, T]`.
///
/// Immutable once constructed and shared read-only by every stepper.
///
/// # Examples
///
/// ```
/// use shoal_grid::Grid;
///
/// let grid = Grid::uniform(-1.0, 1.0, 5, 1.0, 3).unwrap();
/// assert_eq!(grid.nx(), 5);
/// assert!((grid.dx() - 0.5).abs() < 1e-15);
/// assert!((grid.dt() - 0.5).abs() < 1e-15);
/// assert_eq!(grid.xs().first(), Some(&-1.0));
/// assert_eq!(grid.xs().last(), Some(&1.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    x_min: f64,
    x_max: f64,
    horizon: f64,
    dx: f64,
    dt: f64,
    boundary: BoundaryCondition,
    xs: Vec<f64>,
    times: Vec<f64>,
}

impl Grid {
    /// Build a grid from its configuration.
    ///
    /// Returns an error if `nx < 3`, `nt < 2`, the extent is empty or
    /// not finite, or the horizon is not finite and positive.
    pub fn new(config: &GridConfig) -> Result<Self, GridError> {
        let GridConfig {
            x_min,
            x_max,
            nx,
            horizon,
            nt,
            boundary,
        } = *config;
        if nx < 3 {
            return Err(GridError::TooFewNodes { nx });
        }
        if nt < 2 {
            return Err(GridError::TooFewSteps { nt });
        }
        if !x_min.is_finite() || !x_max.is_finite() || !(x_max > x_min) {
            return Err(GridError::InvalidExtent { x_min, x_max });
        }
        if !horizon.is_finite() || !(horizon > 0.0) {
            return Err(GridError::InvalidHorizon { horizon });
        }
        let dx = (x_max - x_min) / (nx - 1) as f64;
        let dt = horizon / (nt - 1) as f64;
        let xs = linspace(x_min, x_max, nx);
        let times = linspace(0.0, horizon, nt);
        Ok(Self {
            x_min,
            x_max,
            horizon,
            dx,
            dt,
            boundary,
            xs,
            times,
        })
    }

    /// Shorthand for a Neumann grid.
    pub fn uniform(
        x_min: f64,
        x_max: f64,
        nx: usize,
        horizon: f64,
        nt: usize,
    ) -> Result<Self, GridError> {
        Self::new(&GridConfig {
            x_min,
            x_max,
            nx,
            horizon,
            nt,
            boundary: BoundaryCondition::Neumann,
        })
    }

    /// Number of spatial nodes.
    pub fn nx(&self) -> usize {
        self.xs.len()
    }

    /// Number of time nodes.
    pub fn nt(&self) -> usize {
        self.times.len()
    }

    /// Spatial step.
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Time step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Area of one space-time cell, `dx * dt`.
    pub fn cell(&self) -> f64 {
        self.dx * self.dt
    }

    /// Lower spatial edge.
    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    /// Upper spatial edge.
    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    /// Time horizon `T`.
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Edge handling.
    pub fn boundary(&self) -> BoundaryCondition {
        self.boundary
    }

    /// Spatial node coordinates, `x_min` to `x_max` inclusive.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Time node coordinates, `0` to `T` inclusive.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Time nodes rescaled to `[0, 1]`.
    pub fn normalized_times(&self) -> Vec<f64> {
        self.times.iter().map(|t| t / self.horizon).collect()
    }

    /// Explicit-stepping stability bounds for `dt`.
    ///
    /// The diffusive bound is `dx^2 / (2 nu)` and the advective bound is
    /// `dx / max_velocity`. Either is `None` when its coefficient is zero.
    /// Both steppers treat diffusion implicitly, so exceeding the
    /// diffusive bound only costs accuracy; the advective bound governs
    /// how many sub-steps the FP advection needs.
    ///
    /// # Examples
    ///
    /// ```
    /// use shoal_grid::Grid;
    ///
    /// let grid = Grid::uniform(0.0, 1.0, 11, 1.0, 11).unwrap();
    /// let cfl = grid.suggest_cfl_limits(0.5, 2.0);
    /// assert!((cfl.diffusive.unwrap() - 0.01).abs() < 1e-12);
    /// assert!((cfl.advective.unwrap() - 0.05).abs() < 1e-12);
    /// assert!(cfl.advection_exceeded());
    /// ```
    pub fn suggest_cfl_limits(&self, nu: f64, max_velocity: f64) -> CflLimits {
        let diffusive = (nu > 0.0).then(|| self.dx * self.dx / (2.0 * nu));
        let v = max_velocity.abs();
        let advective = (v > 0.0).then(|| self.dx / v);
        CflLimits {
            dt: self.dt,
            diffusive,
            advective,
        }
    }
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    let last = (count - 1) as f64;
    let mut out: Vec<f64> = (0..count)
        .map(|i| start + (end - start) * (i as f64 / last))
        .collect();
    out[count - 1] = end;
    out
}

// ── CflLimits ──────────────────────────────────────────────────────

/// Stability bounds returned by [`Grid::suggest_cfl_limits`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CflLimits {
    /// The configured time step.
    pub dt: f64,
    /// Largest stable explicit diffusion step, if `nu > 0`.
    pub diffusive: Option<f64>,
    /// Largest stable explicit advection step, if the velocity is nonzero.
    pub advective: Option<f64>,
}

impl CflLimits {
    /// `true` if `dt` exceeds the diffusive bound.
    pub fn diffusion_exceeded(&self) -> bool {
        self.diffusive.is_some_and(|limit| self.dt > limit)
    }

    /// `true` if `dt` exceeds the advective bound.
    pub fn advection_exceeded(&self) -> bool {
        self.advective.is_some_and(|limit| self.dt > limit)
    }

    /// Advective Courant number `dt / advective`, zero without advection.
    pub fn courant(&self) -> f64 {
        self.advective.map_or(0.0, |limit| self.dt / limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_count_nodes() {
        let g = Grid::uniform(-2.0, 2.0, 41, 1.0, 11).unwrap();
        assert!((g.dx() - 0.1).abs() < 1e-15, "dx = {}", g.dx());
        assert!((g.dt() - 0.1).abs() < 1e-15, "dt = {}", g.dt());
        assert_eq!(g.xs().len(), 41);
        assert_eq!(g.times().len(), 11);
        assert_eq!(*g.times().last().unwrap(), 1.0);
    }

    #[test]
    fn nodes_are_uniform() {
        let g = Grid::uniform(-1.0, 3.0, 9, 2.0, 5).unwrap();
        for w in g.xs().windows(2) {
            assert!((w[1] - w[0] - g.dx()).abs() < 1e-12);
        }
        let tau = g.normalized_times();
        assert_eq!(tau[0], 0.0);
        assert!((tau[4] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn too_few_nodes_rejected() {
        match Grid::uniform(0.0, 1.0, 2, 1.0, 5) {
            Err(GridError::TooFewNodes { nx: 2 }) => {}
            other => panic!("expected TooFewNodes, got {other:?}"),
        }
    }

    #[test]
    fn too_few_steps_rejected() {
        match Grid::uniform(0.0, 1.0, 5, 1.0, 1) {
            Err(GridError::TooFewSteps { nt: 1 }) => {}
            other => panic!("expected TooFewSteps, got {other:?}"),
        }
    }

    #[test]
    fn inverted_extent_rejected() {
        assert!(matches!(
            Grid::uniform(1.0, 1.0, 5, 1.0, 5),
            Err(GridError::InvalidExtent { .. })
        ));
        assert!(matches!(
            Grid::uniform(f64::NAN, 1.0, 5, 1.0, 5),
            Err(GridError::InvalidExtent { .. })
        ));
    }

    #[test]
    fn bad_horizon_rejected() {
        for horizon in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            assert!(
                matches!(
                    Grid::uniform(0.0, 1.0, 5, horizon, 5),
                    Err(GridError::InvalidHorizon { .. })
                ),
                "horizon {horizon} should be rejected"
            );
        }
    }

    #[test]
    fn cfl_without_coefficients_is_unbounded() {
        let g = Grid::uniform(0.0, 1.0, 11, 1.0, 2).unwrap();
        let cfl = g.suggest_cfl_limits(0.0, 0.0);
        assert_eq!(cfl.diffusive, None);
        assert_eq!(cfl.advective, None);
        assert!(!cfl.diffusion_exceeded());
        assert!(!cfl.advection_exceeded());
        assert_eq!(cfl.courant(), 0.0);
    }

    #[test]
    fn courant_number_scales_with_velocity() {
        let g = Grid::uniform(0.0, 1.0, 11, 0.1, 11).unwrap();
        // dt = 0.01, dx = 0.1
        let cfl = g.suggest_cfl_limits(0.1, 20.0);
        assert!((cfl.courant() - 2.0).abs() < 1e-12, "courant = {}", cfl.courant());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: GridConfig = serde_json::from_str(r#"{"nx": 11, "boundary": "dirichlet"}"#).unwrap();
        assert_eq!(cfg.nx, 11);
        assert_eq!(cfg.boundary, BoundaryCondition::Dirichlet);
        assert_eq!(cfg.nt, GridConfig::default().nt);
    }
}
