use super::RefinementParamsError;
use crate::engine::EngineError;

/// Errors that abort a refinement run.
#[derive(thiserror::Error, Debug)]
pub enum RefineError {
    #[error(transparent)]
    InvalidParams(#[from] RefinementParamsError),
    #[error("no pose has an estimated position")]
    NoUsablePoses,
    #[error("optimization failed at accuracy {accuracy} m: {source}")]
    OptimizationFailed {
        accuracy: f64,
        #[source]
        source: EngineError,
    },
    #[error("interrupted by user")]
    Interrupted,
}

impl RefineError {
    pub(crate) fn from_engine(accuracy: f64, err: EngineError) -> Self {
        match err {
            EngineError::Interrupted => RefineError::Interrupted,
            source => RefineError::OptimizationFailed { accuracy, source },
        }
    }
}
