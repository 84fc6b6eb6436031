//! Core types for the Shoal mean field game solver.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the time-by-space [`Field`] storage shared by the value, density and
//! control arrays, and the error taxonomy every other crate reports
//! through.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod field;

pub use error::{GridError, LinearSolveError, StepError};
pub use field::Field;
