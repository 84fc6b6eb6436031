//! Closed set of control models.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::hamiltonian::Hamiltonian;
use crate::lq_hft::LqHft;

/// Every model the solver knows how to step.
///
/// Dispatch happens through a `match` on this enum, chosen once per
/// solve, rather than through trait objects looked up per call. New
/// cost structures become new variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    /// Linear-quadratic inventory control.
    LqHft(LqHft),
}

impl Default for Model {
    fn default() -> Self {
        Self::LqHft(LqHft::default())
    }
}

impl From<LqHft> for Model {
    fn from(params: LqHft) -> Self {
        Self::LqHft(params)
    }
}

impl Model {
    /// Validate the selected variant's constants.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Self::LqHft(p) => p.validate(),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LqHft(_) => "lq_hft",
        }
    }
}

impl Hamiltonian for Model {
    fn hamiltonian(&self, grad: f64, eta: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.hamiltonian(grad, eta),
        }
    }

    fn optimal_control(&self, grad: f64, eta: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.optimal_control(grad, eta),
        }
    }

    fn running_cost(&self, x: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.running_cost(x),
        }
    }

    fn terminal_cost(&self, x: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.terminal_cost(x),
        }
    }

    fn lipschitz_bound(&self, grad_bound: f64, eta: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.lipschitz_bound(grad_bound, eta),
        }
    }

    fn diffusion(&self) -> f64 {
        match self {
            Self::LqHft(p) => p.diffusion(),
        }
    }

    fn friction(&self, mean_abs_control: f64) -> f64 {
        match self {
            Self::LqHft(p) => p.friction(mean_abs_control),
        }
    }
}
