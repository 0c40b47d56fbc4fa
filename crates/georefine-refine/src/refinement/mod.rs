//! Iterative accuracy refinement.
//!
//! The session repeatedly tightens the assumed camera-position accuracy,
//! lets the engine re-optimize, measures every enabled pose against its
//! reference, and disables the outliers, until the retained share of poses
//! collapses or the bound reaches its floor. A final re-optimization with a
//! slightly looser, vertically scaled bound completes the run.

mod error;
mod params;
mod report;
mod session;

pub use error::RefineError;
pub use params::{
    AccuracyStep, AngularPrefilter, CutoffMode, RefinementParams, RefinementParamsError,
    RefinementPreset,
};
pub use report::{
    IterationRecord, PrefilterSummary, RefinementReport, RefinementState, StopReason,
};
pub use session::{AccuracyState, RefinementOutcome, RefinementSession};
