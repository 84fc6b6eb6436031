//! Boundary semantics at the edges of the spatial domain.

use serde::{Deserialize, Serialize};

/// How the operators treat the nodes at `x_min` and `x_max`.
///
/// The choice affects both the one-sided gradients and the Laplacian
/// rows at the two edge nodes. Advective flux through the outer faces is
/// zero under either condition.
///
/// # Examples
///
/// ```
/// use shoal_grid::{BoundaryCondition, Grid, GridConfig};
///
/// let grid = Grid::new(&GridConfig {
///     nx: 5,
///     boundary: BoundaryCondition::Dirichlet,
///     ..GridConfig::default()
/// })
/// .unwrap();
/// let lap = shoal_grid::ops::laplacian(&grid);
///
/// // Dirichlet rows at the edges are empty: boundary values are held.
/// assert!(lap.row(0).is_empty());
/// assert_eq!(lap.row(2).len(), 3);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Reflecting, zero-flux edges. Gradients use a mirrored ghost node
    /// and the Laplacian is the conservative finite-volume stencil, so
    /// diffusion never moves mass across the boundary.
    #[default]
    Neumann,
    /// Held edges. Gradients fall back to one-sided differences and the
    /// Laplacian rows at the boundary are zero.
    Dirichlet,
}
