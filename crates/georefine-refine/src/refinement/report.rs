use crate::cutoff::RobustCutoff;
use crate::engine::AccuracyBound;
use serde::{Deserialize, Serialize};

/// Why the loop stopped iterating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The accuracy bound shrank below the configured floor.
    FloorReached,
    /// Fewer than the minimum fraction of eligible poses were retained.
    RetainedBelowMinimum,
    /// The retained fraction dropped too sharply relative to the previous
    /// iteration.
    RetainedDropped,
    /// Fewer than two enabled poses had a residual.
    InsufficientData,
}

/// Lifecycle of a refinement session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementState {
    Initializing,
    Iterating,
    Converged(StopReason),
    Aborted,
}

/// Outcome of the one-time attitude pre-filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefilterSummary {
    pub threshold_deg: f64,
    /// Poses whose attitude could be compared.
    pub checked: usize,
    pub passed: usize,
    pub disabled: usize,
}

/// Diagnostics of one loop iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub accuracy: f64,
    /// Enabled poses with a residual.
    pub evaluated: usize,
    /// Evaluated poses within the retention gate.
    pub retained: usize,
    pub eligible: usize,
    pub retained_fraction: f64,
    /// Mean residual of retained poses; diagnostic only.
    pub mean_retained_error: Option<f64>,
    /// Disabling threshold actually applied; `None` when the iteration stopped
    /// before disabling.
    pub threshold: Option<f64>,
    pub robust_cutoff: Option<RobustCutoff>,
    pub disabled: usize,
}

/// Full record of a completed refinement run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementReport {
    pub prefilter: Option<PrefilterSummary>,
    pub iterations: Vec<IterationRecord>,
    pub stop_reason: StopReason,
    /// Bound used for the final re-optimization.
    pub final_bound: AccuracyBound,
    pub eligible: usize,
    pub enabled: usize,
}

impl RefinementReport {
    /// Accuracy bounds visited by the loop, in order.
    pub fn accuracies(&self) -> impl Iterator<Item = f64> + '_ {
        self.iterations.iter().map(|r| r.accuracy)
    }

    pub fn total_disabled(&self) -> usize {
        self.iterations.iter().map(|r| r.disabled).sum::<usize>()
            + self.prefilter.map_or(0, |p| p.disabled)
    }
}
