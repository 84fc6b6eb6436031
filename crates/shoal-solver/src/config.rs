//! Solver configuration, validation, and error types.
//!
//! [`SolverConfig`] is built once per solve and passed by reference to
//! every component. It deserializes from any serde format with every
//! section optional, and [`validate()`](SolverConfig::validate) checks
//! all invariants before any array is allocated.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use shoal_core::GridError;
use shoal_grid::{Grid, GridConfig};
use shoal_model::{InitialDensity, Model, ModelError};

use crate::price::{SupplyCurveError, SupplySource};

// ── PicardConfig ───────────────────────────────────────────────────

/// Controls for the outer fixed-point loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicardConfig {
    /// Iteration budget. Default: 200.
    pub max_iter: usize,
    /// Absolute convergence threshold on `L2(M_new - M)`. Default: 1e-8.
    pub tol: f64,
    /// Optional threshold on the relative error. Default: none.
    pub relative_tol: Option<f64>,
    /// Initial mixing coefficient, in `(0, 1]`. Default: 0.3.
    pub mix: f64,
    /// Floor for the mixing coefficient. Default: 1e-4.
    pub mix_min: f64,
    /// Factor applied to `mix` on a non-improving iteration, in `(0, 1]`.
    /// `1.0` disables decay. Default: 0.5.
    pub mix_decay: f64,
    /// Fractional improvement an iteration must achieve over the previous
    /// error to count as progress. Default: 0.02.
    pub stagnation_tol: f64,
    /// Consecutive non-improving iterations at `mix_min` before the solve
    /// ends as stagnated. Default: 5.
    pub stagnation_patience: usize,
    /// Recompute friction from the control field each iteration. When
    /// `false`, friction stays at its zero-activity value. Default: true.
    pub dynamic_friction: bool,
}

impl Default for PicardConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-8,
            relative_tol: None,
            mix: 0.3,
            mix_min: 1e-4,
            mix_decay: 0.5,
            stagnation_tol: 0.02,
            stagnation_patience: 5,
            dynamic_friction: true,
        }
    }
}

// ── HjbConfig ──────────────────────────────────────────────────────

/// Controls for the HJB inner loop at each time step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HjbConfig {
    /// Maximum sub-iterations per time step. Default: 4.
    pub inner: usize,
    /// Sub-iteration residual threshold. Default: 1e-8.
    pub tol: f64,
    /// Weight of each new solve after the first sub-iteration:
    /// `U <- U + relaxation * (U_solved - U)`. Default: 0.5. Range: (0, 1].
    pub relaxation: f64,
    /// Solved values are clipped to `[-value_cap, value_cap]` before
    /// blending. The terminal row is never clipped. Default: 50.0.
    pub value_cap: Option<f64>,
    /// Upper bound on the Lax-Friedrichs diffusion coefficient added at
    /// each node. Default: none.
    pub max_dissipation: Option<f64>,
}

impl Default for HjbConfig {
    fn default() -> Self {
        Self {
            inner: 4,
            tol: 1e-8,
            relaxation: 0.5,
            value_cap: Some(50.0),
            max_dissipation: None,
        }
    }
}

// ── FpConfig ───────────────────────────────────────────────────────

/// Controls for the FP forward sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpConfig {
    /// Maximum explicit advection sub-steps per time step. Default: 64.
    pub max_substeps: usize,
    /// Negative mass before projection above which a step is flagged and
    /// the coordinator decays `mix`. Default: 1e-10.
    pub negative_tol: f64,
    /// Negative mass before projection above which the sweep fails.
    /// Default: 1e-2.
    pub negative_fail: f64,
}

impl Default for FpConfig {
    fn default() -> Self {
        Self {
            max_substeps: 64,
            negative_tol: 1e-10,
            negative_fail: 1e-2,
        }
    }
}

// ── PricingConfig ──────────────────────────────────────────────────

/// Endogenous price clearing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Compute a price trajectory after the solve. Default: false.
    pub enabled: bool,
    /// Price shading of agents' order flow. Default: 1.0.
    pub price_sensitivity: f64,
    /// Supply levels to clear against. Default: constant zero.
    pub supply: SupplySource,
    /// Initial root-finding bracket. Default: (-10, 10).
    pub bracket: (f64, f64),
    /// Bracket widenings before a step is declared unresolved. Default: 5.
    pub max_expansions: usize,
    /// Bisection halvings per step. Default: 50.
    pub max_iter: usize,
    /// Absolute tolerance on the imbalance and the bracket half width.
    /// Default: 1e-8.
    pub tol: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            price_sensitivity: 1.0,
            supply: SupplySource::default(),
            bracket: (-10.0, 10.0),
            max_expansions: 5,
            max_iter: 50,
            tol: 1e-8,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SolverConfig::validate()`] or when the
/// coordinator is constructed.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Grid construction failed.
    Grid(GridError),
    /// Model constants or initial-density parameters are invalid.
    Model(ModelError),
    /// The supply source is malformed.
    Supply(SupplyCurveError),
    /// A scalar solver setting is out of range.
    InvalidField {
        /// Dotted path of the setting, e.g. `"picard.mix"`.
        field: &'static str,
        /// Description of the violated bound.
        reason: String,
    },
    /// A caller-supplied initial density does not match the grid.
    InitialDensityShape {
        /// Number of spatial nodes on the grid.
        expected: usize,
        /// Length of the supplied density.
        got: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(e) => write!(f, "grid: {e}"),
            Self::Model(e) => write!(f, "model: {e}"),
            Self::Supply(e) => write!(f, "supply: {e}"),
            Self::InvalidField { field, reason } => write!(f, "{field}: {reason}"),
            Self::InitialDensityShape { expected, got } => {
                write!(f, "initial density has {got} nodes, grid has {expected}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Grid(e) => Some(e),
            Self::Model(e) => Some(e),
            Self::Supply(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<ModelError> for ConfigError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

impl From<SupplyCurveError> for ConfigError {
    fn from(e: SupplyCurveError) -> Self {
        Self::Supply(e)
    }
}

// ── SolverConfig ───────────────────────────────────────────────────

/// Complete, fully resolved configuration for one solve.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Time-space discretization.
    pub grid: GridConfig,
    /// Cost and control model.
    pub model: Model,
    /// Initial density used when the caller does not supply one.
    pub initial: InitialDensity,
    /// Outer loop controls.
    pub picard: PicardConfig,
    /// HJB inner loop controls.
    pub hjb: HjbConfig,
    /// FP sweep controls.
    pub fp: FpConfig,
    /// Optional price clearing.
    pub pricing: PricingConfig,
    /// Velocity used for the advective CFL warning. Default: the largest
    /// terminal control on the grid.
    pub velocity_guess: Option<f64>,
}

impl SolverConfig {
    /// Validate all invariants and build the grid.
    pub fn validate(&self) -> Result<Grid, ConfigError> {
        // 1. Grid extents and counts.
        let grid = Grid::new(&self.grid)?;
        // 2. Model constants and initial density.
        self.model.validate()?;
        self.initial.validate()?;
        // 3. Picard controls.
        let p = &self.picard;
        if p.max_iter == 0 {
            return Err(invalid("picard.max_iter", "must be at least 1".to_string()));
        }
        positive("picard.tol", p.tol)?;
        if let Some(rel) = p.relative_tol {
            positive("picard.relative_tol", rel)?;
        }
        unit_interval("picard.mix", p.mix)?;
        unit_interval("picard.mix_decay", p.mix_decay)?;
        positive("picard.mix_min", p.mix_min)?;
        if p.mix_min > p.mix {
            return Err(invalid(
                "picard.mix_min",
                format!("must not exceed mix ({}), got {}", p.mix, p.mix_min),
            ));
        }
        if !(p.stagnation_tol >= 0.0 && p.stagnation_tol < 1.0) {
            return Err(invalid(
                "picard.stagnation_tol",
                format!("must be in [0, 1), got {}", p.stagnation_tol),
            ));
        }
        if p.stagnation_patience == 0 {
            return Err(invalid(
                "picard.stagnation_patience",
                "must be at least 1".to_string(),
            ));
        }
        // 4. HJB inner loop.
        if self.hjb.inner == 0 {
            return Err(invalid("hjb.inner", "must be at least 1".to_string()));
        }
        positive("hjb.tol", self.hjb.tol)?;
        unit_interval("hjb.relaxation", self.hjb.relaxation)?;
        if let Some(cap) = self.hjb.value_cap {
            positive("hjb.value_cap", cap)?;
        }
        if let Some(cap) = self.hjb.max_dissipation {
            non_negative("hjb.max_dissipation", cap)?;
        }
        // 5. FP sweep.
        if self.fp.max_substeps == 0 {
            return Err(invalid("fp.max_substeps", "must be at least 1".to_string()));
        }
        non_negative("fp.negative_tol", self.fp.negative_tol)?;
        positive("fp.negative_fail", self.fp.negative_fail)?;
        if self.fp.negative_fail < self.fp.negative_tol {
            return Err(invalid(
                "fp.negative_fail",
                format!(
                    "must be >= negative_tol ({}), got {}",
                    self.fp.negative_tol, self.fp.negative_fail
                ),
            ));
        }
        // 6. Pricing, only when enabled.
        if self.pricing.enabled {
            let pr = &self.pricing;
            positive("pricing.price_sensitivity", pr.price_sensitivity)?;
            let (lo, hi) = pr.bracket;
            if !lo.is_finite() || !hi.is_finite() || !(hi > lo) {
                return Err(invalid(
                    "pricing.bracket",
                    format!("must be finite with lower < upper, got ({lo}, {hi})"),
                ));
            }
            if pr.max_iter == 0 {
                return Err(invalid("pricing.max_iter", "must be at least 1".to_string()));
            }
            positive("pricing.tol", pr.tol)?;
            pr.supply.validate()?;
        }
        // 7. Velocity guess, if given.
        if let Some(v) = self.velocity_guess {
            non_negative("velocity_guess", v)?;
        }
        Ok(grid)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidField { field, reason }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(invalid(field, format!("must be finite and > 0, got {value}")));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(invalid(field, format!("must be finite and >= 0, got {value}")));
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(field, format!("must be in (0, 1], got {value}")));
    }
    Ok(())
}
