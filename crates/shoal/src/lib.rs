//! Shoal: a mean field game solver for inventory-averse high-frequency
//! traders.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Shoal sub-crates. Most users only need `shoal` as a dependency.
//!
//! # Quick start
//!
//! ```rust
//! use shoal::prelude::*;
//!
//! let mut config = SolverConfig {
//!     grid: GridConfig {
//!         x_min: -2.0,
//!         x_max: 2.0,
//!         nx: 41,
//!         horizon: 0.5,
//!         nt: 11,
//!         ..GridConfig::default()
//!     },
//!     model: Model::from(LqHft {
//!         nu: 0.05,
//!         gamma_t: 1.0,
//!         eta0: 1.0,
//!         ..LqHft::default()
//!     }),
//!     initial: InitialDensity { mean: 0.0, std: 0.5 },
//!     ..SolverConfig::default()
//! };
//! config.picard.mix = 0.5;
//! let solution = PicardSolver::new(config, None)?.run()?;
//! assert_eq!(solution.status, PicardState::Converged);
//! assert_eq!(solution.density.nt(), 11);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `shoal-core` | `Field` storage and the shared error types |
//! | [`grid`] | `shoal-grid` | Grid geometry, boundary handling, difference operators, tridiagonal solves |
//! | [`model`] | `shoal-model` | The `Hamiltonian` trait, the LQ-HFT model, initial densities |
//! | [`solver`] | `shoal-solver` | HJB and FP steppers, price clearing, the Picard coordinator |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Space-time fields and error types (`shoal-core`).
pub use shoal_core as core;

/// Grid geometry and discrete operators (`shoal-grid`).
///
/// [`grid::ops`] holds the difference stencils, the upwind flux and the
/// simplex projection. [`grid::Thomas`] is the default banded solver.
pub use shoal_grid as grid;

/// Hamiltonians and model parameters (`shoal-model`).
///
/// Implement [`model::Hamiltonian`] to plug a new cost structure into the
/// steppers.
pub use shoal_model as model;

/// Steppers and the outer fixed-point loop (`shoal-solver`).
///
/// [`solver::PicardSolver`] drives a full solve. [`solver::HjbStepper`] and
/// [`solver::FpStepper`] are usable on their own.
pub use shoal_solver as solver;

/// Common imports for typical Shoal usage.
///
/// ```rust
/// use shoal::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use shoal_core::{Field, StepError};

    // Grid
    pub use shoal_grid::{BoundaryCondition, Grid, GridConfig, Thomas, TridiagonalSolver};

    // Model
    pub use shoal_model::{Hamiltonian, InitialDensity, LqHft, Model};

    // Solver
    pub use shoal_solver::{
        ConfigError, PicardSolver, PicardState, PricingConfig, SolveFailure, SolveMetrics,
        Solution, SolverConfig, SupplySource,
    };
}
