//! Stateless finite-difference primitives over one spatial row.
//!
//! Every function here is a pure function of its inputs. Shape
//! mismatches between paired rows are contract violations and panic.

use std::error::Error;
use std::fmt;

use crate::boundary::BoundaryCondition;
use crate::grid::Grid;
use crate::tridiagonal::Tridiagonal;

/// Smallest positive mass [`project_to_simplex`] will renormalize.
pub const MIN_MASS: f64 = 1e-12;

// ── Differences ────────────────────────────────────────────────────

/// First-order forward difference. The last entry repeats its neighbor.
///
/// # Panics
///
/// Panics if `values.len() < 2`.
pub fn forward_difference(values: &[f64], dx: f64) -> Vec<f64> {
    let n = values.len();
    assert!(n >= 2, "forward difference needs at least 2 nodes, got {n}");
    let mut out: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]) / dx).collect();
    out.push(out[n - 2]);
    out
}

/// First-order backward difference. The first entry repeats its neighbor.
///
/// # Panics
///
/// Panics if `values.len() < 2`.
pub fn backward_difference(values: &[f64], dx: f64) -> Vec<f64> {
    let n = values.len();
    assert!(n >= 2, "backward difference needs at least 2 nodes, got {n}");
    let mut out = Vec::with_capacity(n);
    out.push((values[1] - values[0]) / dx);
    out.extend(values.windows(2).map(|w| (w[1] - w[0]) / dx));
    out
}

/// Second-order central difference with one-sided ends.
///
/// # Panics
///
/// Panics if `values.len() < 2`.
pub fn central_difference(values: &[f64], dx: f64) -> Vec<f64> {
    let n = values.len();
    assert!(n >= 2, "central difference needs at least 2 nodes, got {n}");
    let mut out = Vec::with_capacity(n);
    out.push((values[1] - values[0]) / dx);
    out.extend(values.windows(3).map(|w| (w[2] - w[0]) / (2.0 * dx)));
    out.push((values[n - 1] - values[n - 2]) / dx);
    out
}

/// Central second difference. The two ends repeat their neighbors.
///
/// # Panics
///
/// Panics if `values.len() < 3`.
pub fn second_difference(values: &[f64], dx: f64) -> Vec<f64> {
    let n = values.len();
    assert!(n >= 3, "second difference needs at least 3 nodes, got {n}");
    let dx2 = dx * dx;
    let interior: Vec<f64> = values
        .windows(3)
        .map(|w| (w[2] - 2.0 * w[1] + w[0]) / dx2)
        .collect();
    let mut out = Vec::with_capacity(n);
    out.push(interior[0]);
    out.extend_from_slice(&interior);
    out.push(interior[n - 3]);
    out
}

/// One-sided gradients `(backward, forward)` with boundary handling.
///
/// Under [`BoundaryCondition::Neumann`] the row is mirrored through each
/// edge node, so the outward one-sided gradient at an edge is the
/// negation of the inward one. Under [`BoundaryCondition::Dirichlet`]
/// the missing one-sided gradient repeats the inward one.
///
/// # Panics
///
/// Panics if `values.len() < 2`.
pub fn one_sided_gradients(
    values: &[f64],
    dx: f64,
    boundary: BoundaryCondition,
) -> (Vec<f64>, Vec<f64>) {
    let n = values.len();
    let mut backward = backward_difference(values, dx);
    let mut forward = forward_difference(values, dx);
    if boundary == BoundaryCondition::Neumann {
        backward[0] = -forward[0];
        forward[n - 1] = -backward[n - 1];
    }
    (backward, forward)
}

/// Gradient used for controls: the mean of the one-sided gradients.
///
/// Interior nodes get the central difference. Neumann edges get zero,
/// matching the zero-flux condition.
pub fn gradient(values: &[f64], dx: f64, boundary: BoundaryCondition) -> Vec<f64> {
    let (backward, forward) = one_sided_gradients(values, dx, boundary);
    backward
        .iter()
        .zip(&forward)
        .map(|(b, f)| 0.5 * (b + f))
        .collect()
}

// ── Laplacian ──────────────────────────────────────────────────────

/// Constant-coefficient Laplacian bands for `grid`.
pub fn laplacian(grid: &Grid) -> Tridiagonal {
    laplacian_bands(grid, &vec![1.0; grid.nx()])
}

/// Conservative Laplacian `d/dx (k d/dx)` for a per-node coefficient.
///
/// The coefficient on the face between nodes `i` and `i + 1` is the
/// larger of the two node values. Under Neumann boundaries the outer
/// faces carry no flux, so every column sums to zero and diffusion
/// conserves `sum(values) * dx`. Under Dirichlet boundaries the two edge
/// rows are zero.
///
/// # Panics
///
/// Panics if `coeff.len() != grid.nx()`.
pub fn laplacian_bands(grid: &Grid, coeff: &[f64]) -> Tridiagonal {
    let n = grid.nx();
    assert_eq!(coeff.len(), n, "coefficient length does not match grid");
    let dx2 = grid.dx() * grid.dx();
    let face: Vec<f64> = coeff.windows(2).map(|w| w[0].max(w[1]) / dx2).collect();

    let mut lower = vec![0.0; n];
    let mut diag = vec![0.0; n];
    let mut upper = vec![0.0; n];
    for i in 0..n {
        if i > 0 {
            lower[i] = face[i - 1];
        }
        if i + 1 < n {
            upper[i] = face[i];
        }
        diag[i] = -(lower[i] + upper[i]);
    }
    if grid.boundary() == BoundaryCondition::Dirichlet {
        for i in [0, n - 1] {
            lower[i] = 0.0;
            diag[i] = 0.0;
            upper[i] = 0.0;
        }
    }
    Tridiagonal::new(lower, diag, upper)
}

// ── Upwind advection ───────────────────────────────────────────────

/// Upwind face fluxes for density `m` moving with velocity `v`.
///
/// Returns `n + 1` faces. Face `i + 1` sits between nodes `i` and
/// `i + 1` and carries `max(m_i v_i, 0) + min(m_{i+1} v_{i+1}, 0)`: mass
/// leaves a node only in the direction of its own drift. The two outer
/// faces are zero.
///
/// # Panics
///
/// Panics if `m` and `v` differ in length.
pub fn upwind_flux(m: &[f64], v: &[f64]) -> Vec<f64> {
    assert_eq!(
        m.len(),
        v.len(),
        "density and velocity must share a shape: {} vs {}",
        m.len(),
        v.len()
    );
    let n = m.len();
    let mut faces = vec![0.0; n + 1];
    for i in 0..n.saturating_sub(1) {
        faces[i + 1] = (m[i] * v[i]).max(0.0) + (m[i + 1] * v[i + 1]).min(0.0);
    }
    faces
}

/// Conservative divergence of the upwind flux.
///
/// Flux leaving one node enters its neighbor, so the entries sum to zero
/// up to roundoff.
pub fn upwind_divergence(m: &[f64], v: &[f64], dx: f64) -> Vec<f64> {
    upwind_flux(m, v)
        .windows(2)
        .map(|f| (f[1] - f[0]) / dx)
        .collect()
}

// ── Mass and projection ────────────────────────────────────────────

/// Total mass `sum(m) * dx`.
pub fn mass(m: &[f64], dx: f64) -> f64 {
    m.iter().sum::<f64>() * dx
}

/// Total negative mass `sum(max(-m, 0)) * dx`.
pub fn negative_mass(m: &[f64], dx: f64) -> f64 {
    m.iter().map(|v| (-v).max(0.0)).sum::<f64>() * dx
}

/// Result of [`project_to_simplex`].
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    /// Nonnegative density with `sum * dx == 1`.
    pub density: Vec<f64>,
    /// Negative mass clamped away before renormalizing.
    pub clipped: f64,
}

/// Too little positive mass remained to renormalize a density row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DegenerateMass {
    /// Positive mass after clamping.
    pub mass: f64,
}

impl fmt::Display for DegenerateMass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mass {:e} is too small to renormalize", self.mass)
    }
}

impl Error for DegenerateMass {}

/// Clamp negatives to zero, then rescale so `sum(m) * dx == 1`.
///
/// Non-finite entries count as degenerate. Applying the projection to
/// its own output returns the same row up to roundoff.
///
/// # Examples
///
/// ```
/// use shoal_grid::ops::project_to_simplex;
///
/// let p = project_to_simplex(&[-0.5, 1.0, 3.0], 0.5).unwrap();
/// assert_eq!(p.density, vec![0.0, 0.5, 1.5]);
/// assert_eq!(p.clipped, 0.25);
/// ```
pub fn project_to_simplex(m: &[f64], dx: f64) -> Result<Projection, DegenerateMass> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(DegenerateMass { mass: f64::NAN });
    }
    let clipped = negative_mass(m, dx);
    let density: Vec<f64> = m.iter().map(|v| v.max(0.0)).collect();
    let total = mass(&density, dx);
    if !total.is_finite() || total <= MIN_MASS {
        return Err(DegenerateMass { mass: total });
    }
    Ok(Projection {
        density: density.into_iter().map(|v| v / total).collect(),
        clipped,
    })
}
