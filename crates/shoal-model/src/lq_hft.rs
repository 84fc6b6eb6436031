//! Linear-quadratic inventory model for high-frequency market makers.

use serde::{Deserialize, Serialize};

use crate::error::{non_negative, positive, ModelError};
use crate::hamiltonian::Hamiltonian;

/// Constants of the LQ-HFT model.
///
/// Agents control their trading rate `alpha`, pay a quadratic execution
/// cost `eta * alpha^2 / 2`, a running inventory penalty `phi x^2` and a
/// terminal penalty `gamma_T x^2`. Friction grows with aggregate
/// activity: `eta = eta0 + eta1 * mean|alpha|`.
///
/// With `alpha_cap` set, controls are confined to `[-cap, cap]` and the
/// Hamiltonian is the capped minimum, which is linear in `|p|` outside
/// the saturation point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LqHft {
    /// Inventory diffusion `nu`. Default: 0.2.
    pub nu: f64,
    /// Running inventory penalty `phi`. Default: 0.1.
    pub phi: f64,
    /// Terminal inventory penalty `gamma_T`. Default: 1.0.
    pub gamma_t: f64,
    /// Baseline friction `eta0`. Default: 0.05.
    pub eta0: f64,
    /// Friction sensitivity to mean absolute trading `eta1`. Default: 0.5.
    pub eta1: f64,
    /// Optional bound on `|alpha|`. Default: none.
    pub alpha_cap: Option<f64>,
}

impl Default for LqHft {
    fn default() -> Self {
        Self {
            nu: 0.2,
            phi: 0.1,
            gamma_t: 1.0,
            eta0: 0.05,
            eta1: 0.5,
            alpha_cap: None,
        }
    }
}

impl LqHft {
    /// Check every constant is finite and in range.
    pub fn validate(&self) -> Result<(), ModelError> {
        non_negative("nu", self.nu)?;
        non_negative("phi", self.phi)?;
        non_negative("gamma_t", self.gamma_t)?;
        positive("eta0", self.eta0)?;
        non_negative("eta1", self.eta1)?;
        if let Some(cap) = self.alpha_cap {
            positive("alpha_cap", cap)?;
        }
        Ok(())
    }

    /// The control cap, if `|p| / eta` exceeds it.
    fn saturated(&self, grad: f64, eta: f64) -> Option<f64> {
        self.alpha_cap.filter(|cap| grad.abs() > cap * eta)
    }
}

impl Hamiltonian for LqHft {
    fn hamiltonian(&self, grad: f64, eta: f64) -> f64 {
        match self.saturated(grad, eta) {
            Some(cap) => -cap * grad.abs() + 0.5 * eta * cap * cap,
            None => -grad * grad / (2.0 * eta),
        }
    }

    fn optimal_control(&self, grad: f64, eta: f64) -> f64 {
        match self.saturated(grad, eta) {
            Some(cap) => -cap * grad.signum(),
            None => -grad / eta,
        }
    }

    fn running_cost(&self, x: f64) -> f64 {
        self.phi * x * x
    }

    fn terminal_cost(&self, x: f64) -> f64 {
        self.gamma_t * x * x
    }

    fn lipschitz_bound(&self, grad_bound: f64, eta: f64) -> f64 {
        let slope = grad_bound.abs() / eta;
        match self.alpha_cap {
            Some(cap) => slope.min(cap),
            None => slope,
        }
    }

    fn diffusion(&self) -> f64 {
        self.nu
    }

    fn friction(&self, mean_abs_control: f64) -> f64 {
        self.eta0 + self.eta1 * mean_abs_control.abs()
    }
}
