//! Test fixtures and mock solvers for Shoal development.
//!
//! Provides small grids, model presets, sampled densities, row
//! assertions, and a [`FailingSolver`] that breaks the implicit solve
//! on demand.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{FailingSolver, FixedSolver};

use shoal_grid::{ops, Grid, GridConfig};
use shoal_model::{InitialDensity, LqHft, Model};

/// Symmetric grid on `[-half_width, half_width]` with Neumann edges.
pub fn symmetric_grid(half_width: f64, nx: usize, horizon: f64, nt: usize) -> Grid {
    Grid::new(&GridConfig {
        x_min: -half_width,
        x_max: half_width,
        nx,
        horizon,
        nt,
        ..GridConfig::default()
    })
    .unwrap()
}

/// A 41 x 11 grid on `[-2, 2] x [0, 0.5]`.
pub fn small_grid() -> Grid {
    symmetric_grid(2.0, 41, 0.5, 11)
}

/// Grid settings of [`small_grid`], for building solver configs.
pub fn small_grid_config() -> GridConfig {
    GridConfig {
        x_min: -2.0,
        x_max: 2.0,
        nx: 41,
        horizon: 0.5,
        nt: 11,
        ..GridConfig::default()
    }
}

/// Model with a strong terminal penalty and mild congestion.
///
/// `gamma_t = 2`, `phi = 0.1`, `eta = 1 + 0.5 * mean|alpha|`.
pub fn inventory_averse() -> LqHft {
    LqHft {
        nu: 0.05,
        phi: 0.1,
        gamma_t: 2.0,
        eta0: 1.0,
        eta1: 0.5,
        alpha_cap: None,
    }
}

/// [`inventory_averse`] wrapped as a [`Model`].
pub fn inventory_averse_model() -> Model {
    Model::from(inventory_averse())
}

/// Normalized Gaussian density on `grid`.
pub fn gaussian(grid: &Grid, mean: f64, std: f64) -> Vec<f64> {
    InitialDensity { mean, std }.sample(grid).unwrap()
}

/// Assert `row` is nonnegative with unit mass to within `tol`.
pub fn assert_density(row: &[f64], dx: f64, tol: f64) {
    assert!(
        row.iter().all(|m| *m >= 0.0),
        "negative density entry: {:?}",
        row.iter().copied().fold(f64::INFINITY, f64::min)
    );
    let mass = ops::mass(row, dx);
    assert!((mass - 1.0).abs() <= tol, "mass {mass} differs from 1 by more than {tol}");
}

/// Assert `row[i] == row[n - 1 - i]` to within `tol` relative to the peak.
pub fn assert_symmetric(row: &[f64], tol: f64) {
    let n = row.len();
    let scale = row.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1e-300);
    for i in 0..n / 2 {
        let gap = (row[i] - row[n - 1 - i]).abs();
        assert!(
            gap <= tol * scale,
            "asymmetric at {i}: {} vs {}",
            row[i],
            row[n - 1 - i]
        );
    }
}

/// Index of the largest entry.
pub fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if *v > best.1 {
                (i, *v)
            } else {
                best
            }
        })
        .0
}

/// Dx-weighted L2 distance between two rows.
pub fn row_distance(a: &[f64], b: &[f64], dx: f64) -> f64 {
    assert_eq!(a.len(), b.len(), "rows must share a length");
    (a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>() * dx).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_consistent() {
        let grid = small_grid();
        assert_eq!(grid.nx(), small_grid_config().nx);
        let m = gaussian(&grid, 0.0, 0.5);
        assert_density(&m, grid.dx(), 1e-12);
        assert_symmetric(&m, 1e-12);
        assert_eq!(argmax(&m), 20);
        assert!(inventory_averse().validate().is_ok());
    }

    #[test]
    fn row_distance_of_shifted_rows() {
        assert_eq!(row_distance(&[1.0, 1.0], &[0.0, 0.0], 0.5), 1.0);
    }
}
