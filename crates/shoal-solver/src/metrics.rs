//! Convergence history and the metrics record of a finished solve.
//!
//! [`History`] grows by one entry per Picard iteration. [`SolveMetrics`]
//! is assembled once at termination from the history, the final control
//! field, and the optional price trajectory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shoal_core::Field;

use crate::price::{PriceSummary, PriceTrajectory};

// ── History ────────────────────────────────────────────────────────

/// Per-iteration record of the outer loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// `L2(M_new - M)` per iteration.
    pub errors: Vec<f64>,
    /// `errors[k] / max(L2(M), eps)` per iteration.
    pub relative_errors: Vec<f64>,
    /// Mixing coefficient applied at each iteration.
    pub mix: Vec<f64>,
    /// FP steps flagged for negative mass, summed over all iterations.
    pub fp_warnings: usize,
}

impl History {
    /// Number of completed iterations.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `true` before the first iteration completes.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Absolute error of the latest iteration.
    pub fn last_error(&self) -> Option<f64> {
        self.errors.last().copied()
    }

    /// Relative error of the latest iteration.
    pub fn last_relative_error(&self) -> Option<f64> {
        self.relative_errors.last().copied()
    }

    pub(crate) fn record(&mut self, error: f64, relative_error: f64, mix: f64) {
        self.errors.push(error);
        self.relative_errors.push(relative_error);
        self.mix.push(mix);
    }
}

// ── Control statistics ─────────────────────────────────────────────

/// Unweighted statistics of a control field over every `(t, x)` node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlStats {
    /// Mean of `|alpha|`.
    pub mean_abs: f64,
    /// Population standard deviation of `alpha`.
    pub std: f64,
    /// Mean of `exp(-|alpha|)`: near 1 when agents barely trade.
    pub liquidity_proxy: f64,
}

impl ControlStats {
    /// Compute the statistics of `control`.
    pub fn of(control: &Field) -> Self {
        let values = control.as_slice();
        if values.is_empty() {
            return Self {
                mean_abs: 0.0,
                std: 0.0,
                liquidity_proxy: 1.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / n;
        Self {
            mean_abs: values.iter().map(|a| a.abs()).sum::<f64>() / n,
            std: var.sqrt(),
            liquidity_proxy: values.iter().map(|a| (-a.abs()).exp()).sum::<f64>() / n,
        }
    }
}

// ── SolveMetrics ───────────────────────────────────────────────────

/// Diagnostics record of one solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveMetrics {
    /// Absolute error of the last iteration, zero if none ran.
    pub final_error: f64,
    /// Relative error of the last iteration, zero if none ran.
    pub final_error_relative: f64,
    /// Completed Picard iterations.
    pub iterations: usize,
    /// Absolute error per iteration.
    pub errors: Vec<f64>,
    /// Relative error per iteration.
    pub relative_errors: Vec<f64>,
    /// Mixing coefficient per iteration.
    pub mix_history: Vec<f64>,
    /// Configured starting mix.
    pub mix_initial: f64,
    /// Mix in effect at termination.
    pub mix_final: f64,
    /// Configured mix floor.
    pub mix_min: f64,
    /// Mean of `|alpha|` over all nodes.
    pub mean_abs_alpha: f64,
    /// Standard deviation of `alpha` over all nodes.
    pub std_alpha: f64,
    /// Mean of `exp(-|alpha|)` over all nodes.
    pub liquidity_proxy: f64,
    /// `true` if the solve ended stagnated.
    pub stalled: bool,
    /// FP steps flagged for negative mass over the whole solve.
    pub fp_warnings: usize,
    /// Price statistics, when pricing ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceSummary>,
    /// Raw clearing prices, when pricing ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices: Option<Vec<f64>>,
}

impl SolveMetrics {
    pub(crate) fn assemble(
        history: &History,
        control: &Field,
        mix_initial: f64,
        mix_final: f64,
        mix_min: f64,
        stalled: bool,
        prices: Option<&PriceTrajectory>,
    ) -> Self {
        let stats = ControlStats::of(control);
        Self {
            final_error: history.last_error().unwrap_or(0.0),
            final_error_relative: history.last_relative_error().unwrap_or(0.0),
            iterations: history.len(),
            errors: history.errors.clone(),
            relative_errors: history.relative_errors.clone(),
            mix_history: history.mix.clone(),
            mix_initial,
            mix_final,
            mix_min,
            mean_abs_alpha: stats.mean_abs,
            std_alpha: stats.std,
            liquidity_proxy: stats.liquidity_proxy,
            stalled,
            fp_warnings: history.fp_warnings,
            price: prices.map(PriceTrajectory::summary),
            prices: prices.map(|p| p.prices.clone()),
        }
    }

    /// Scalar fields in a stable order, for tabular writers.
    ///
    /// Price statistics appear as `price_mean` through `price_span` only
    /// when pricing ran.
    pub fn scalar_summary(&self) -> IndexMap<&'static str, f64> {
        let mut out = IndexMap::new();
        out.insert("iterations", self.iterations as f64);
        out.insert("final_error", self.final_error);
        out.insert("final_error_relative", self.final_error_relative);
        out.insert("mix_initial", self.mix_initial);
        out.insert("mix_final", self.mix_final);
        out.insert("mean_abs_alpha", self.mean_abs_alpha);
        out.insert("std_alpha", self.std_alpha);
        out.insert("liquidity_proxy", self.liquidity_proxy);
        out.insert("fp_warnings", self.fp_warnings as f64);
        out.insert("stalled", if self.stalled { 1.0 } else { 0.0 });
        if let Some(p) = &self.price {
            out.insert("price_mean", p.mean);
            out.insert("price_std", p.std);
            out.insert("price_min", p.min);
            out.insert("price_max", p.max);
            out.insert("price_span", p.span);
            out.insert("price_unresolved", p.unresolved as f64);
        }
        out
    }
}
