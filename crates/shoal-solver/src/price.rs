//! Endogenous price clearing against an empirical supply curve.
//!
//! At each time node the clearing price `P` solves
//!
//! ```text
//! sum_i (alpha_i - s * P) * m_i * dx = supply_n
//! ```
//!
//! where `s` is the price sensitivity. The left side is the signed
//! aggregate order flow once agents shade their trading by the price.
//! Prices are a read-only diagnostic: nothing here feeds back into the
//! HJB or FP sweeps.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use shoal_core::Field;
use shoal_grid::Grid;

use crate::config::PricingConfig;

// ── Supply curve ───────────────────────────────────────────────────

/// One quantile bucket of historical trading activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplyBucket {
    /// Position of the bucket in the trading session, strictly inside `(0, 1)`.
    pub quantile: f64,
    /// Traded volume in the bucket.
    pub volume_share: f64,
    /// Relative spread observed in the bucket.
    #[serde(default)]
    pub spread_rel: f64,
}

/// An ordered table of [`SupplyBucket`]s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplyCurve {
    buckets: Vec<SupplyBucket>,
}

impl SupplyCurve {
    /// Build and validate a curve.
    pub fn new(buckets: Vec<SupplyBucket>) -> Result<Self, SupplyCurveError> {
        let curve = Self { buckets };
        curve.validate()?;
        Ok(curve)
    }

    /// Check the table is non-empty, quantiles are strictly increasing
    /// inside `(0, 1)`, and volumes and spreads are finite and `>= 0`.
    pub fn validate(&self) -> Result<(), SupplyCurveError> {
        if self.buckets.is_empty() {
            return Err(SupplyCurveError::Empty);
        }
        let mut prev = 0.0;
        for (index, b) in self.buckets.iter().enumerate() {
            if !(b.quantile > 0.0 && b.quantile < 1.0) {
                return Err(SupplyCurveError::QuantileOutOfRange {
                    index,
                    quantile: b.quantile,
                });
            }
            if index > 0 && !(b.quantile > prev) {
                return Err(SupplyCurveError::NotIncreasing { index });
            }
            prev = b.quantile;
            if !(b.volume_share >= 0.0) || !b.volume_share.is_finite() {
                return Err(SupplyCurveError::InvalidVolume {
                    index,
                    value: b.volume_share,
                });
            }
            if !(b.spread_rel >= 0.0) || !b.spread_rel.is_finite() {
                return Err(SupplyCurveError::InvalidSpread {
                    index,
                    value: b.spread_rel,
                });
            }
        }
        Ok(())
    }

    /// The buckets in order.
    pub fn buckets(&self) -> &[SupplyBucket] {
        &self.buckets
    }

    /// Dense supply schedule at normalized times `taus` (each in `[0, 1]`).
    ///
    /// Volumes are log-compressed with `ln(1 + v)`, centered, and scaled
    /// to unit peak magnitude, then linearly interpolated over the bucket
    /// quantiles (held constant outside them). Both ends of the schedule
    /// are pinned to zero and the result is re-centered and multiplied by
    /// `scale`. A flat volume profile yields an all-zero schedule.
    pub fn schedule(&self, taus: &[f64], scale: f64) -> Vec<f64> {
        let logs: Vec<f64> = self.buckets.iter().map(|b| b.volume_share.ln_1p()).collect();
        let mean = logs.iter().sum::<f64>() / logs.len() as f64;
        let centered: Vec<f64> = logs.iter().map(|v| v - mean).collect();
        let peak = centered.iter().fold(0.0f64, |a, v| a.max(v.abs()));
        if peak == 0.0 || taus.is_empty() {
            return vec![0.0; taus.len()];
        }
        let quantiles: Vec<f64> = self.buckets.iter().map(|b| b.quantile).collect();
        let profile: Vec<f64> = centered.iter().map(|v| v / peak).collect();

        let mut out: Vec<f64> = taus
            .iter()
            .map(|&t| interp_clamped(&quantiles, &profile, t))
            .collect();
        let last = out.len() - 1;
        out[0] = 0.0;
        out[last] = 0.0;
        let mean = out.iter().sum::<f64>() / out.len() as f64;
        for v in &mut out {
            *v = (*v - mean) * scale;
        }
        out
    }
}

/// Piecewise-linear interpolation, constant beyond the end points.
///
/// `xp` must be strictly increasing and the same length as `fp`.
pub(crate) fn interp_clamped(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let n = xp.len();
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let j = xp.partition_point(|&q| q <= x);
    let (x0, x1) = (xp[j - 1], xp[j]);
    let w = (x - x0) / (x1 - x0);
    fp[j - 1] + w * (fp[j] - fp[j - 1])
}

// ── Supply source ──────────────────────────────────────────────────

/// Where the per-time supply levels come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SupplySource {
    /// The same supply at every time node.
    Constant {
        /// Supply level.
        level: f64,
    },
    /// A schedule built from an empirical bucket table.
    Curve {
        /// The bucket table.
        curve: SupplyCurve,
        /// Multiplier applied to the normalized schedule. Default: 5e-5.
        #[serde(default = "default_supply_scale")]
        scale: f64,
    },
    /// Explicit levels, resampled linearly over `[0, T]` when their count
    /// differs from the number of time nodes.
    Levels {
        /// Supply levels, evenly spaced in time.
        levels: Vec<f64>,
    },
}

fn default_supply_scale() -> f64 {
    5e-5
}

impl Default for SupplySource {
    fn default() -> Self {
        Self::Constant { level: 0.0 }
    }
}

impl SupplySource {
    /// Check the source is usable.
    pub fn validate(&self) -> Result<(), SupplyCurveError> {
        match self {
            Self::Constant { level } if !level.is_finite() => Err(SupplyCurveError::InvalidLevels {
                reason: format!("constant level must be finite, got {level}"),
            }),
            Self::Constant { .. } => Ok(()),
            Self::Curve { curve, scale } => {
                if !scale.is_finite() {
                    return Err(SupplyCurveError::InvalidLevels {
                        reason: format!("scale must be finite, got {scale}"),
                    });
                }
                curve.validate()
            }
            Self::Levels { levels } => {
                if levels.is_empty() {
                    return Err(SupplyCurveError::InvalidLevels {
                        reason: "levels must not be empty".to_string(),
                    });
                }
                if let Some(v) = levels.iter().find(|v| !v.is_finite()) {
                    return Err(SupplyCurveError::InvalidLevels {
                        reason: format!("levels must be finite, got {v}"),
                    });
                }
                Ok(())
            }
        }
    }

    /// Supply level at every time node of `grid`.
    pub fn resolve(&self, grid: &Grid) -> Vec<f64> {
        let nt = grid.nt();
        match self {
            Self::Constant { level } => vec![*level; nt],
            Self::Curve { curve, scale } => curve.schedule(&grid.normalized_times(), *scale),
            Self::Levels { levels } if levels.is_empty() => vec![0.0; nt],
            Self::Levels { levels } if levels.len() == nt => levels.clone(),
            Self::Levels { levels } if levels.len() == 1 => vec![levels[0]; nt],
            Self::Levels { levels } => {
                let last = (levels.len() - 1) as f64;
                let knots: Vec<f64> = (0..levels.len()).map(|k| k as f64 / last).collect();
                grid.normalized_times()
                    .iter()
                    .map(|&t| interp_clamped(&knots, levels, t))
                    .collect()
            }
        }
    }
}

// ── SupplyCurveError ───────────────────────────────────────────────

/// A supply table or supply source failed validation.
#[derive(Clone, Debug, PartialEq)]
pub enum SupplyCurveError {
    /// The bucket table is empty.
    Empty,
    /// A quantile lies outside `(0, 1)`.
    QuantileOutOfRange {
        /// Bucket position.
        index: usize,
        /// The offending quantile.
        quantile: f64,
    },
    /// Quantiles are not strictly increasing at this bucket.
    NotIncreasing {
        /// Bucket position.
        index: usize,
    },
    /// A volume is negative or not finite.
    InvalidVolume {
        /// Bucket position.
        index: usize,
        /// The offending volume.
        value: f64,
    },
    /// A spread is negative or not finite.
    InvalidSpread {
        /// Bucket position.
        index: usize,
        /// The offending spread.
        value: f64,
    },
    /// Constant or explicit levels are unusable.
    InvalidLevels {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for SupplyCurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "supply curve has no buckets"),
            Self::QuantileOutOfRange { index, quantile } => {
                write!(f, "bucket {index}: quantile {quantile} must lie strictly inside (0, 1)")
            }
            Self::NotIncreasing { index } => {
                write!(f, "bucket {index}: quantiles must be strictly increasing")
            }
            Self::InvalidVolume { index, value } => {
                write!(f, "bucket {index}: volume must be finite and >= 0, got {value}")
            }
            Self::InvalidSpread { index, value } => {
                write!(f, "bucket {index}: spread must be finite and >= 0, got {value}")
            }
            Self::InvalidLevels { reason } => write!(f, "invalid supply levels: {reason}"),
        }
    }
}

impl Error for SupplyCurveError {}

// ── Clearing ───────────────────────────────────────────────────────

/// Find a root of `imbalance` by bracket expansion and bisection.
///
/// The bracket starts at `config.bracket` and is widened by its own
/// width on both sides, up to `config.max_expansions` times, until the
/// imbalance changes sign. Bisection then runs for at most
/// `config.max_iter` halvings, stopping once `|f| < tol` or the half
/// width drops below `tol`. Returns `None` when no sign change is found
/// or the imbalance is not finite, which covers non-monotone curves
/// without a root inside the search range.
///
/// # Examples
///
/// ```
/// use shoal_solver::{clear_price, PricingConfig};
///
/// let cfg = PricingConfig::default();
/// let root = clear_price(|p| 3.0 - 2.0 * p, &cfg).unwrap();
/// assert!((root - 1.5).abs() < 1e-7);
///
/// // No sign change anywhere: unresolved.
/// assert!(clear_price(|p| p * p + 1.0, &cfg).is_none());
/// ```
pub fn clear_price(mut imbalance: impl FnMut(f64) -> f64, config: &PricingConfig) -> Option<f64> {
    let (mut lower, mut upper) = config.bracket;
    let mut f_lower = imbalance(lower);
    let mut f_upper = imbalance(upper);
    let mut expansions = 0;
    while f_lower * f_upper > 0.0 && expansions < config.max_expansions {
        let width = upper - lower;
        lower -= width;
        upper += width;
        f_lower = imbalance(lower);
        f_upper = imbalance(upper);
        expansions += 1;
    }
    if !f_lower.is_finite() || !f_upper.is_finite() || f_lower * f_upper > 0.0 {
        return None;
    }
    if f_lower == 0.0 {
        return Some(lower);
    }
    if f_upper == 0.0 {
        return Some(upper);
    }

    let mut mid = 0.5 * (lower + upper);
    for _ in 0..config.max_iter {
        mid = 0.5 * (lower + upper);
        let f_mid = imbalance(mid);
        if !f_mid.is_finite() {
            return None;
        }
        if f_mid.abs() < config.tol || 0.5 * (upper - lower) < config.tol {
            return Some(mid);
        }
        if f_lower * f_mid <= 0.0 {
            upper = mid;
        } else {
            lower = mid;
            f_lower = f_mid;
        }
    }
    Some(mid)
}

/// Clearing price at every time node.
///
/// Unresolved steps are `NaN`. Each price is computed once from that
/// node's control and density rows and never revised.
///
/// # Panics
///
/// Panics if `control`, `density` and `supply` disagree on the number
/// of time nodes.
pub fn clearing_prices(
    control: &Field,
    density: &Field,
    supply: &[f64],
    dx: f64,
    config: &PricingConfig,
) -> PriceTrajectory {
    assert!(
        control.nt() == density.nt() && density.nt() == supply.len(),
        "control, density and supply must share the time dimension"
    );
    let s = config.price_sensitivity;
    let prices = (0..density.nt())
        .map(|n| {
            let alpha = control.row(n);
            let m = density.row(n);
            let flow: f64 = alpha.iter().zip(m).map(|(a, w)| a * w).sum::<f64>() * dx;
            let mass: f64 = m.iter().sum::<f64>() * dx;
            let target = supply[n];
            clear_price(|p| flow - s * p * mass - target, config).unwrap_or(f64::NAN)
        })
        .collect();
    PriceTrajectory { prices }
}

// ── Trajectory ─────────────────────────────────────────────────────

/// Clearing price per time node; `NaN` where clearing failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceTrajectory {
    /// One price per time node.
    pub prices: Vec<f64>,
}

/// Summary statistics over the resolved prices of a trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Mean resolved price.
    pub mean: f64,
    /// Population standard deviation of resolved prices.
    pub std: f64,
    /// Smallest resolved price.
    pub min: f64,
    /// Largest resolved price.
    pub max: f64,
    /// `max - min`.
    pub span: f64,
    /// Number of time nodes whose price could not be cleared.
    pub unresolved: usize,
}

impl PriceTrajectory {
    /// Statistics over resolved prices. All `NaN` if none resolved.
    pub fn summary(&self) -> PriceSummary {
        let resolved: Vec<f64> = self.prices.iter().copied().filter(|p| p.is_finite()).collect();
        let unresolved = self.prices.len() - resolved.len();
        if resolved.is_empty() {
            return PriceSummary {
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                span: f64::NAN,
                unresolved,
            };
        }
        let n = resolved.len() as f64;
        let mean = resolved.iter().sum::<f64>() / n;
        let var = resolved.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / n;
        let min = resolved.iter().copied().fold(f64::INFINITY, f64::min);
        let max = resolved.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        PriceSummary {
            mean,
            std: var.sqrt(),
            min,
            max,
            span: max - min,
            unresolved,
        }
    }
}
