//! Discretized time-space domain and the numerical primitives built on it.
//!
//! This crate defines the [`Grid`] every stepper shares read-only, the
//! [`BoundaryCondition`] applied at `x_min`/`x_max`, and the stateless
//! operators in [`ops`]: one-sided and central differences, the
//! conservative Laplacian, upwind flux selection and simplex projection.
//!
//! Implicit diffusion goes through the [`TridiagonalSolver`] trait so the
//! steppers never depend on a particular banded solver; [`Thomas`] is the
//! default implementation.
//!
//! # Boundaries
//!
//! - [`BoundaryCondition::Neumann`]: reflecting, zero-flux edges (default)
//! - [`BoundaryCondition::Dirichlet`]: boundary values held by diffusion

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod grid;
pub mod ops;
pub mod tridiagonal;

pub use boundary::BoundaryCondition;
pub use grid::{CflLimits, Grid, GridConfig};
pub use ops::{DegenerateMass, Projection};
pub use tridiagonal::{Thomas, Tridiagonal, TridiagonalSolver};
