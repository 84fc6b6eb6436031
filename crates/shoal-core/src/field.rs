//! Row-major time-by-space storage for value, density and control arrays.

use serde::{Deserialize, Serialize};

/// A dense 2D array indexed by `(time node, spatial node)`.
///
/// Rows are time nodes, stored contiguously, so a single time slice is
/// a plain `&[f64]` that the discrete operators consume directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    nt: usize,
    nx: usize,
    data: Vec<f64>,
}

impl Field {
    /// A field of zeros.
    pub fn zeros(nt: usize, nx: usize) -> Self {
        Self {
            nt,
            nx,
            data: vec![0.0; nt * nx],
        }
    }

    /// A field with every time row equal to `row`.
    pub fn from_row(nt: usize, row: &[f64]) -> Self {
        let nx = row.len();
        let mut data = Vec::with_capacity(nt * nx);
        for _ in 0..nt {
            data.extend_from_slice(row);
        }
        Self { nt, nx, data }
    }

    /// A field filled by evaluating `f(n, i)` at every node.
    pub fn from_fn(nt: usize, nx: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(nt * nx);
        for n in 0..nt {
            for i in 0..nx {
                data.push(f(n, i));
            }
        }
        Self { nt, nx, data }
    }

    /// Number of time nodes (rows).
    pub fn nt(&self) -> usize {
        self.nt
    }

    /// Number of spatial nodes (columns).
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Value at time node `n`, spatial node `i`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn get(&self, n: usize, i: usize) -> f64 {
        assert!(i < self.nx, "spatial index {i} out of range for nx={}", self.nx);
        self.data[n * self.nx + i]
    }

    /// The spatial slice at time node `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n >= nt`.
    pub fn row(&self, n: usize) -> &[f64] {
        &self.data[n * self.nx..(n + 1) * self.nx]
    }

    /// Mutable spatial slice at time node `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n >= nt`.
    pub fn row_mut(&mut self, n: usize) -> &mut [f64] {
        &mut self.data[n * self.nx..(n + 1) * self.nx]
    }

    /// Overwrite time row `n` with `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != nx` or `n >= nt`.
    pub fn set_row(&mut self, n: usize, values: &[f64]) {
        assert_eq!(
            values.len(),
            self.nx,
            "row length {} does not match nx={}",
            values.len(),
            self.nx
        );
        self.row_mut(n).copy_from_slice(values);
    }

    /// Iterate over time rows in order.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.nx)
    }

    /// All values, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// `true` if no entry is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Quadrature L2 norm `sqrt(sum(v^2) * cell)`, where `cell` is the
    /// area of one space-time cell (`dx * dt` on a uniform grid).
    pub fn l2_norm(&self, cell: f64) -> f64 {
        (self.data.iter().map(|v| v * v).sum::<f64>() * cell).sqrt()
    }

    /// Quadrature L2 distance to `other`.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn l2_distance(&self, other: &Field, cell: f64) -> f64 {
        self.assert_same_shape(other);
        let sum: f64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (sum * cell).sqrt()
    }

    /// Relax toward `target`: `self <- self + mix * (target - self)`.
    ///
    /// For `mix` in `[0, 1]` this is a convex combination, so row masses
    /// and nonnegativity shared by both operands are preserved.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    pub fn relax_toward(&mut self, target: &Field, mix: f64) {
        self.assert_same_shape(target);
        for (a, b) in self.data.iter_mut().zip(&target.data) {
            *a += mix * (b - *a);
        }
    }

    fn assert_same_shape(&self, other: &Field) {
        assert!(
            self.nt == other.nt && self.nx == other.nx,
            "field shape mismatch: {}x{} vs {}x{}",
            self.nt,
            self.nx,
            other.nt,
            other.nx
        );
    }
}
