//! Errors from model parameter validation.

use std::error::Error;
use std::fmt;

/// A model constant or initial-density parameter is out of range.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelError {
    /// A named parameter failed validation.
    InvalidParameter {
        /// Parameter name as it appears in configuration.
        name: &'static str,
        /// Description of the violated bound.
        reason: String,
    },
    /// The initial density carries no mass on the grid.
    EmptyInitialDensity {
        /// Mass of the unnormalized density.
        mass: f64,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { name, reason } => write!(f, "{name}: {reason}"),
            Self::EmptyInitialDensity { mass } => {
                write!(f, "initial density has mass {mass:e} on the grid")
            }
        }
    }
}

impl Error for ModelError {}

/// Check `value` is finite and `>= 0`.
pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), ModelError> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(ModelError::InvalidParameter {
            name,
            reason: format!("must be finite and >= 0, got {value}"),
        });
    }
    Ok(())
}

/// Check `value` is finite and `> 0`.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<(), ModelError> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(ModelError::InvalidParameter {
            name,
            reason: format!("must be finite and > 0, got {value}"),
        });
    }
    Ok(())
}
