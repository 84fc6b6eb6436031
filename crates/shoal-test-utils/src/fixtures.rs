//! Mock tridiagonal solvers.
//!
//! - [`FailingSolver`]: delegates to [`Thomas`] for a fixed number of
//!   calls, then reports a singular pivot.
//! - [`FixedSolver`]: ignores the system and returns a canned row.

use std::sync::atomic::{AtomicUsize, Ordering};

use shoal_core::LinearSolveError;
use shoal_grid::{Thomas, Tridiagonal, TridiagonalSolver};

/// Solves correctly `succeed_for` times, then fails every call.
pub struct FailingSolver {
    succeed_for: usize,
    calls: AtomicUsize,
}

impl FailingSolver {
    pub fn new(succeed_for: usize) -> Self {
        Self {
            succeed_for,
            calls: AtomicUsize::new(0),
        }
    }

    /// Total calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl TridiagonalSolver for FailingSolver {
    fn solve_tridiagonal(
        &self,
        bands: &Tridiagonal,
        rhs: &[f64],
    ) -> Result<Vec<f64>, LinearSolveError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if call < self.succeed_for {
            Thomas.solve_tridiagonal(bands, rhs)
        } else {
            Err(LinearSolveError::Singular { row: 0, pivot: 0.0 })
        }
    }
}

/// Returns `output` for every call, whatever the system.
pub struct FixedSolver {
    pub output: Vec<f64>,
}

impl TridiagonalSolver for FixedSolver {
    fn solve_tridiagonal(
        &self,
        _bands: &Tridiagonal,
        _rhs: &[f64],
    ) -> Result<Vec<f64>, LinearSolveError> {
        Ok(self.output.clone())
    }
}
