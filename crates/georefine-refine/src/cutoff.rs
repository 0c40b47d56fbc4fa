//! Robust outlier cutoff over a set of residual magnitudes.

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fraction of samples guaranteed to survive one cutoff.
pub const SURVIVAL_QUANTILE: f64 = 0.9;
/// Multiple of the median beyond which a residual counts as an outlier.
pub const MEDIAN_FACTOR: f64 = 6.0;

/// Cutoff and the two statistics it was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobustCutoff {
    pub median: f64,
    /// `median * MEDIAN_FACTOR`.
    pub median_cutoff: f64,
    /// Sorted sample at index `floor(0.9 * n)`.
    pub quantile_cutoff: f64,
}

impl RobustCutoff {
    /// Residuals strictly above this value are outliers.
    #[inline]
    pub fn value(&self) -> f64 {
        self.median_cutoff.max(self.quantile_cutoff)
    }
}

/// Median of an ascending slice; the mean of the two middle values for an
/// even count, `0.0` for an empty slice.
pub fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    } else {
        sorted[n / 2]
    }
}

/// Derive the outlier cutoff for `residuals` (any order).
///
/// Returns `None` for fewer than two samples: the cutoff is undefined and
/// callers stop refining instead of guessing.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(residuals), fields(n = residuals.len())))]
pub fn robust_cutoff(residuals: &[f64]) -> Option<RobustCutoff> {
    if residuals.len() < 2 {
        return None;
    }
    let mut sorted = residuals.to_vec();
    sorted.sort_by(f64::total_cmp);

    let median = median_of_sorted(&sorted);
    let q = ((sorted.len() as f64 * SURVIVAL_QUANTILE).floor() as usize).min(sorted.len() - 1);

    Some(RobustCutoff {
        median,
        median_cutoff: median * MEDIAN_FACTOR,
        quantile_cutoff: sorted[q],
    })
}
