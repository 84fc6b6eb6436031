//! The [`Hamiltonian`] trait shared by every control model.

/// Pointwise cost and control structure of an agent's problem.
///
/// The agent at inventory `x` chooses a trading rate `alpha` and pays
/// `alpha * p + eta * alpha^2 / 2` against the value gradient `p`, plus
/// a running cost in `x`. [`hamiltonian`](Self::hamiltonian) returns the
/// minimized control part; the HJB stepper adds
/// [`running_cost`](Self::running_cost) itself.
///
/// # Contract
///
/// - Every method is pure: same inputs, same output.
/// - `eta` is always supplied by the caller. Implementations never
///   read population state; the mean field reaches them only through
///   `eta`, computed by [`friction`](Self::friction).
/// - `optimal_control` is the minimizer of the control part, and
///   `lipschitz_bound` bounds `|dH/dp|` over `|p| <= grad_bound`.
///
/// # Examples
///
/// ```
/// use shoal_model::{Hamiltonian, LqHft};
///
/// let model = LqHft {
///     phi: 0.1,
///     gamma_t: 2.0,
///     eta0: 0.5,
///     ..LqHft::default()
/// };
/// let eta = model.friction(0.0);
/// assert_eq!(eta, 0.5);
/// assert_eq!(model.optimal_control(1.0, eta), -2.0);
/// assert_eq!(model.hamiltonian(1.0, eta), -1.0);
/// assert_eq!(model.terminal_cost(3.0), 18.0);
/// ```
pub trait Hamiltonian {
    /// Control part of the Hamiltonian, `min_a (a p + eta a^2 / 2)`.
    fn hamiltonian(&self, grad: f64, eta: f64) -> f64;

    /// The minimizing control `alpha*` at gradient `grad`.
    fn optimal_control(&self, grad: f64, eta: f64) -> f64;

    /// Running inventory penalty.
    fn running_cost(&self, x: f64) -> f64;

    /// Terminal inventory penalty, the HJB terminal condition.
    fn terminal_cost(&self, x: f64) -> f64;

    /// Upper bound on `|dH/dp|` for gradients with `|p| <= grad_bound`.
    ///
    /// Drives the Lax-Friedrichs dissipation in the HJB stepper.
    fn lipschitz_bound(&self, grad_bound: f64, eta: f64) -> f64;

    /// Diffusion coefficient `nu` of the inventory dynamics.
    fn diffusion(&self) -> f64;

    /// Friction `eta` given the population's mean absolute control.
    fn friction(&self, mean_abs_control: f64) -> f64;
}

/// Density-weighted mean of `|alpha|`: `sum(|alpha_i| m_i) * dx`.
///
/// This is the mean-field statistic fed to [`Hamiltonian::friction`].
///
/// # Panics
///
/// Panics if `alpha` and `m` differ in length.
pub fn weighted_mean_abs(alpha: &[f64], m: &[f64], dx: f64) -> f64 {
    assert_eq!(
        alpha.len(),
        m.len(),
        "control and density must share a shape: {} vs {}",
        alpha.len(),
        m.len()
    );
    alpha
        .iter()
        .zip(m)
        .map(|(a, w)| a.abs() * w)
        .sum::<f64>()
        * dx
}
