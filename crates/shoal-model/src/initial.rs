//! Initial inventory distribution `m0`.

use serde::{Deserialize, Serialize};
use shoal_grid::{ops, Grid};

use crate::error::{positive, ModelError};

/// A Gaussian inventory distribution, normalized to unit mass on the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialDensity {
    /// Center of the distribution. Default: 0.0.
    pub mean: f64,
    /// Standard deviation. Default: 1.0.
    pub std: f64,
}

impl Default for InitialDensity {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
        }
    }
}

impl InitialDensity {
    /// Check the parameters are finite with `std > 0`.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.mean.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "mean",
                reason: format!("must be finite, got {}", self.mean),
            });
        }
        positive("std", self.std)
    }

    /// Sample on `grid` and project onto the probability simplex.
    ///
    /// Fails if the distribution sits so far off the grid that no mass
    /// lands on it.
    pub fn sample(&self, grid: &Grid) -> Result<Vec<f64>, ModelError> {
        self.validate()?;
        let raw: Vec<f64> = grid
            .xs()
            .iter()
            .map(|x| {
                let z = (x - self.mean) / self.std;
                (-0.5 * z * z).exp()
            })
            .collect();
        ops::project_to_simplex(&raw, grid.dx())
            .map(|p| p.density)
            .map_err(|e| ModelError::EmptyInitialDensity { mass: e.mass })
    }
}
