//! Hamiltonian and control models for the Shoal solver.
//!
//! A model answers four pointwise questions for the steppers: the
//! Hamiltonian at a value gradient, the optimal control there, and the
//! running and terminal costs. The population enters only through the
//! friction coefficient `eta`, which callers compute with
//! [`Hamiltonian::friction`] and pass in. No model reads mean-field
//! state on its own; the Picard loop owns that circular dependency.
//!
//! Models form a closed set behind [`Model`], resolved once at solve
//! start.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod hamiltonian;
pub mod initial;
pub mod lq_hft;
pub mod model;

pub use error::ModelError;
pub use hamiltonian::{weighted_mean_abs, Hamiltonian};
pub use initial::InitialDensity;
pub use lq_hft::LqHft;
pub use model::Model;
