//! Error types for the Shoal solver.
//!
//! Organized by subsystem: grid construction, the banded linear solve
//! used for implicit diffusion, and the numerical-stability failures a
//! time stepper reports upward to the Picard coordinator.

use std::error::Error;
use std::fmt;

/// Errors from constructing a grid.
///
/// These are input-contract violations: they are raised once, at
/// construction, and never retried.
#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    /// Fewer than three spatial nodes were requested.
    TooFewNodes {
        /// The requested node count.
        nx: usize,
    },
    /// Fewer than two time nodes were requested.
    TooFewSteps {
        /// The requested time node count.
        nt: usize,
    },
    /// The spatial extent is empty, inverted, or not finite.
    InvalidExtent {
        /// Lower bound of the domain.
        x_min: f64,
        /// Upper bound of the domain.
        x_max: f64,
    },
    /// The time horizon is zero, negative, or not finite.
    InvalidHorizon {
        /// The requested horizon.
        horizon: f64,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewNodes { nx } => write!(f, "nx must be at least 3, got {nx}"),
            Self::TooFewSteps { nt } => write!(f, "nt must be at least 2, got {nt}"),
            Self::InvalidExtent { x_min, x_max } => {
                write!(f, "spatial extent [{x_min}, {x_max}] must be finite with x_min < x_max")
            }
            Self::InvalidHorizon { horizon } => {
                write!(f, "horizon must be finite and positive, got {horizon}")
            }
        }
    }
}

impl Error for GridError {}

/// Errors from the tridiagonal solve behind implicit diffusion.
#[derive(Clone, Debug, PartialEq)]
pub enum LinearSolveError {
    /// A pivot vanished during elimination.
    Singular {
        /// Row at which elimination broke down.
        row: usize,
        /// The offending pivot value.
        pivot: f64,
    },
    /// The solution contains NaN or infinity.
    NonFinite {
        /// First row holding a non-finite value.
        row: usize,
    },
}

impl fmt::Display for LinearSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singular { row, pivot } => {
                write!(f, "singular tridiagonal system: pivot {pivot:e} at row {row}")
            }
            Self::NonFinite { row } => write!(f, "non-finite solution at row {row}"),
        }
    }
}

impl Error for LinearSolveError {}

/// Numerical-stability failures raised by the HJB and FP steppers.
///
/// Every variant carries the time index at which the failure occurred.
/// The Picard coordinator wraps these with the iteration index before
/// handing them to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// The implicit diffusion solve failed.
    LinearSolve {
        /// Time node being produced.
        time_index: usize,
        /// The underlying solver error.
        source: LinearSolveError,
    },
    /// The HJB inner loop did not reduce its residual.
    HjbStalled {
        /// Time node being produced.
        time_index: usize,
        /// Residual after the first sub-iteration.
        first_residual: f64,
        /// Residual after the last sub-iteration.
        last_residual: f64,
    },
    /// A stepper produced NaN or infinity.
    NonFinite {
        /// Time node being produced.
        time_index: usize,
        /// Which field went non-finite (`"value"`, `"density"` or `"control"`).
        field: &'static str,
    },
    /// Negative mass before projection exceeded the failure tolerance.
    MassDeficit {
        /// Time node being produced.
        time_index: usize,
        /// Total negative mass, `sum(max(-m, 0)) * dx`.
        negative_mass: f64,
        /// The configured failure tolerance.
        tolerance: f64,
    },
    /// Too little positive mass remained to renormalize.
    DegenerateMass {
        /// Time node being produced.
        time_index: usize,
        /// Positive mass left after clamping.
        mass: f64,
    },
}

impl StepError {
    /// Time node at which the failure occurred.
    pub fn time_index(&self) -> usize {
        match self {
            Self::LinearSolve { time_index, .. }
            | Self::HjbStalled { time_index, .. }
            | Self::NonFinite { time_index, .. }
            | Self::MassDeficit { time_index, .. }
            | Self::DegenerateMass { time_index, .. } => *time_index,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinearSolve { time_index, source } => {
                write!(f, "implicit solve failed at time index {time_index}: {source}")
            }
            Self::HjbStalled {
                time_index,
                first_residual,
                last_residual,
            } => write!(
                f,
                "HJB inner loop stalled at time index {time_index}: \
                 residual {last_residual:e} did not improve on {first_residual:e}"
            ),
            Self::NonFinite { time_index, field } => {
                write!(f, "non-finite {field} at time index {time_index}")
            }
            Self::MassDeficit {
                time_index,
                negative_mass,
                tolerance,
            } => write!(
                f,
                "negative mass {negative_mass:e} at time index {time_index} \
                 exceeds tolerance {tolerance:e}"
            ),
            Self::DegenerateMass { time_index, mass } => {
                write!(f, "density mass {mass:e} at time index {time_index} is too small to renormalize")
            }
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LinearSolve { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_exposes_time_index() {
        let e = StepError::HjbStalled {
            time_index: 7,
            first_residual: 1e-3,
            last_residual: 2e-3,
        };
        assert_eq!(e.time_index(), 7);
        let e = StepError::DegenerateMass {
            time_index: 3,
            mass: 0.0,
        };
        assert_eq!(e.time_index(), 3);
    }

    #[test]
    fn linear_solve_error_is_source() {
        let e = StepError::LinearSolve {
            time_index: 2,
            source: LinearSolveError::Singular { row: 4, pivot: 0.0 },
        };
        let source = e.source().expect("linear solve failure has a source");
        assert!(source.to_string().contains("row 4"));
        assert!(e.to_string().contains("time index 2"));
    }

    #[test]
    fn grid_error_messages_name_the_field() {
        assert!(GridError::TooFewNodes { nx: 2 }.to_string().contains("nx"));
        assert!(GridError::TooFewSteps { nt: 1 }.to_string().contains("nt"));
        assert!(GridError::InvalidHorizon { horizon: -1.0 }
            .to_string()
            .contains("horizon"));
    }
}
