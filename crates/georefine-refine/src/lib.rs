//! Iterative camera-position accuracy refinement.
//!
//! Current focus:
//! - robust median/quantile outlier cutoff over pose residuals,
//! - the refinement loop that shrinks the assumed accuracy, re-optimizes
//!   through a [`ReconstructionEngine`], and disables outlier poses,
//! - JSON snapshots, parameter files and run reports.
//!
//! Pose, frame and residual types live in `georefine-core`.

mod cutoff;
mod engine;
mod io;
mod refinement;

pub use cutoff::{median_of_sorted, robust_cutoff, RobustCutoff, MEDIAN_FACTOR, SURVIVAL_QUANTILE};
pub use engine::{AccuracyBound, CancelFlag, EngineError, ReconstructionEngine, SnapshotEngine};
pub use io::{PoseSnapshot, RefineIoError, ScreeningReport};
pub use refinement::{
    AccuracyState, AccuracyStep, AngularPrefilter, CutoffMode, IterationRecord, PrefilterSummary,
    RefineError, RefinementOutcome, RefinementParams, RefinementParamsError, RefinementPreset,
    RefinementReport, RefinementSession, RefinementState, StopReason,
};

pub use georefine_core::{Pose, PoseId, ResidualSample, WorldFrame};
