//! Benchmark profiles for the Shoal solver.
//!
//! Provides pre-built [`SolverConfig`] profiles for benchmarking:
//!
//! - [`reference_profile`]: 401 x 200 grid, the baseline HFT game
//! - [`stress_profile`]: 1601 x 800 grid for stress testing
//! - [`quick_profile`]: 81 x 41 grid for full-solve timings
//! - [`flat_friction`]: the friction schedule of a fresh solve

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use shoal_grid::{BoundaryCondition, GridConfig};
use shoal_model::{Hamiltonian, InitialDensity, LqHft, Model};
use shoal_solver::{PicardConfig, SolverConfig};

fn baseline_model() -> Model {
    Model::from(LqHft {
        nu: 0.02,
        phi: 0.1,
        gamma_t: 2.0,
        eta0: 0.5,
        eta1: 0.8,
        alpha_cap: None,
    })
}

fn profile(nx: usize, nt: usize) -> SolverConfig {
    SolverConfig {
        grid: GridConfig {
            x_min: -5.0,
            x_max: 5.0,
            nx,
            horizon: 1.0,
            nt,
            boundary: BoundaryCondition::Neumann,
        },
        model: baseline_model(),
        initial: InitialDensity {
            mean: 0.0,
            std: 1.0,
        },
        picard: PicardConfig {
            max_iter: 100,
            tol: 1e-6,
            mix: 0.2,
            ..PicardConfig::default()
        },
        ..SolverConfig::default()
    }
}

/// Baseline profile: 401 inventory nodes, 200 time nodes.
pub fn reference_profile() -> SolverConfig {
    profile(401, 200)
}

/// Stress profile: 1601 inventory nodes, 800 time nodes.
///
/// Same model as [`reference_profile`] at 16x the node count.
pub fn stress_profile() -> SolverConfig {
    profile(1601, 800)
}

/// Small profile for timing complete Picard solves.
pub fn quick_profile() -> SolverConfig {
    profile(81, 41)
}

/// Friction at every time node before any population activity.
pub fn flat_friction(config: &SolverConfig) -> Vec<f64> {
    vec![config.model.friction(0.0); config.grid.nt]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_validate() {
        for config in [reference_profile(), stress_profile(), quick_profile()] {
            config.validate().unwrap();
        }
    }

    #[test]
    fn stress_is_finer_than_reference() {
        let reference = reference_profile().validate().unwrap();
        let stress = stress_profile().validate().unwrap();
        assert!(stress.dx() < reference.dx());
        assert!(stress.dt() < reference.dt());
    }

    #[test]
    fn flat_friction_starts_at_eta0() {
        let config = quick_profile();
        let eta = flat_friction(&config);
        assert_eq!(eta.len(), 41);
        assert!(eta.iter().all(|e| *e == 0.5));
    }
}
