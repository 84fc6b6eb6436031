//! Solvers for the Shoal mean field game.
//!
//! The coupled system is solved by three cooperating pieces:
//!
//! - [`HjbStepper`] marches the value function backward from the
//!   terminal cost, with Lax-Friedrichs dissipation and implicit
//!   diffusion.
//! - [`FpStepper`] marches the density forward under the resulting
//!   control, with conservative upwind advection, implicit diffusion and
//!   a simplex projection.
//! - [`PicardSolver`] alternates the two sweeps, blends each new density
//!   into the running estimate with an adaptive mix, and stops on
//!   convergence, stagnation, budget exhaustion or a stepper failure.
//!
//! After the loop, [`clearing_prices`] optionally solves for the price
//! that balances aggregate order flow against a supply schedule.
//!
//! # Examples
//!
//! ```
//! use shoal_model::{LqHft, Model};
//! use shoal_solver::{PicardSolver, PicardState, SolverConfig};
//!
//! let mut config = SolverConfig::default();
//! config.model = Model::from(LqHft {
//!     eta0: 1.0,
//!     ..LqHft::default()
//! });
//! config.grid.nx = 41;
//! config.grid.nt = 11;
//! config.picard.tol = 1e-6;
//! let solution = PicardSolver::new(config, None)?.run()?;
//! assert_eq!(solution.status, PicardState::Converged);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod fp;
pub mod hjb;
pub mod metrics;
pub mod picard;
pub mod price;

pub use config::{ConfigError, FpConfig, HjbConfig, PicardConfig, PricingConfig, SolverConfig};
pub use fp::{FpStep, FpStepper, FpSweep};
pub use hjb::{control_field, HjbStep, HjbStepper};
pub use metrics::{ControlStats, History, SolveMetrics};
pub use picard::{PicardSolver, PicardState, SolveFailure, Solution};
pub use price::{
    clear_price, clearing_prices, PriceSummary, PriceTrajectory, SupplyBucket, SupplyCurve,
    SupplyCurveError, SupplySource,
};
