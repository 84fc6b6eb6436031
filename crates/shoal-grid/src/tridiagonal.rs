//! Banded matrices and the narrow solve interface behind implicit diffusion.

use shoal_core::LinearSolveError;
use smallvec::SmallVec;

/// A tridiagonal matrix stored by bands.
///
/// All three bands have length `n`. `lower[i]` is the entry at
/// `(i, i - 1)` and `upper[i]` the entry at `(i, i + 1)`, so `lower[0]`
/// and `upper[n - 1]` are always zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Tridiagonal {
    lower: Vec<f64>,
    diag: Vec<f64>,
    upper: Vec<f64>,
}

impl Tridiagonal {
    /// Assemble from bands.
    ///
    /// # Panics
    ///
    /// Panics if the bands differ in length or are empty.
    pub fn new(mut lower: Vec<f64>, diag: Vec<f64>, mut upper: Vec<f64>) -> Self {
        let n = diag.len();
        assert!(n > 0, "tridiagonal matrix must have at least one row");
        assert!(
            lower.len() == n && upper.len() == n,
            "band lengths differ: lower {}, diag {n}, upper {}",
            lower.len(),
            upper.len()
        );
        lower[0] = 0.0;
        upper[n - 1] = 0.0;
        Self { lower, diag, upper }
    }

    /// The `n x n` identity.
    pub fn identity(n: usize) -> Self {
        Self::new(vec![0.0; n], vec![1.0; n], vec![0.0; n])
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.diag.len()
    }

    /// Always `false`: construction rejects empty matrices.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Sub-diagonal band.
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Main diagonal band.
    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    /// Super-diagonal band.
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Nonzero entries `(column, coefficient)` of row `i`, left to right.
    pub fn row(&self, i: usize) -> SmallVec<[(usize, f64); 3]> {
        let mut out = SmallVec::new();
        if i > 0 && self.lower[i] != 0.0 {
            out.push((i - 1, self.lower[i]));
        }
        if self.diag[i] != 0.0 {
            out.push((i, self.diag[i]));
        }
        if i + 1 < self.len() && self.upper[i] != 0.0 {
            out.push((i + 1, self.upper[i]));
        }
        out
    }

    /// Matrix-vector product.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.len()`.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.len(), "vector length does not match matrix");
        (0..self.len())
            .map(|i| self.row(i).iter().map(|&(j, a)| a * x[j]).sum())
            .collect()
    }

    /// The backward-Euler system `I - dt * self`.
    pub fn implicit_system(&self, dt: f64) -> Self {
        Self::new(
            self.lower.iter().map(|a| -dt * a).collect(),
            self.diag.iter().map(|a| 1.0 - dt * a).collect(),
            self.upper.iter().map(|a| -dt * a).collect(),
        )
    }
}

/// Solves `A x = rhs` for a tridiagonal `A`.
///
/// Steppers only see this trait, so the banded solver can be swapped
/// without touching the HJB or FP logic.
pub trait TridiagonalSolver {
    /// Solve the system, or report why it could not be solved.
    ///
    /// # Panics
    ///
    /// Implementations panic if `rhs.len() != bands.len()`.
    fn solve_tridiagonal(
        &self,
        bands: &Tridiagonal,
        rhs: &[f64],
    ) -> Result<Vec<f64>, LinearSolveError>;
}

/// Thomas algorithm: `O(n)` Gaussian elimination without pivoting.
///
/// Stable for the diagonally dominant systems produced by
/// [`Tridiagonal::implicit_system`] over a diffusion operator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Thomas;

impl TridiagonalSolver for Thomas {
    fn solve_tridiagonal(
        &self,
        bands: &Tridiagonal,
        rhs: &[f64],
    ) -> Result<Vec<f64>, LinearSolveError> {
        let n = bands.len();
        assert_eq!(rhs.len(), n, "rhs length does not match matrix");
        let (a, b, c) = (bands.lower(), bands.diag(), bands.upper());

        let mut c_star = vec![0.0; n];
        let mut d_star = vec![0.0; n];
        let mut pivot = b[0];
        check_pivot(0, pivot)?;
        c_star[0] = c[0] / pivot;
        d_star[0] = rhs[0] / pivot;
        for i in 1..n {
            pivot = b[i] - a[i] * c_star[i - 1];
            check_pivot(i, pivot)?;
            c_star[i] = c[i] / pivot;
            d_star[i] = (rhs[i] - a[i] * d_star[i - 1]) / pivot;
        }

        let mut x = d_star;
        for i in (0..n - 1).rev() {
            x[i] -= c_star[i] * x[i + 1];
        }
        if let Some(row) = x.iter().position(|v| !v.is_finite()) {
            return Err(LinearSolveError::NonFinite { row });
        }
        Ok(x)
    }
}

fn check_pivot(row: usize, pivot: f64) -> Result<(), LinearSolveError> {
    if pivot.abs() > f64::MIN_POSITIVE {
        Ok(())
    } else {
        Err(LinearSolveError::Singular { row, pivot })
    }
}
