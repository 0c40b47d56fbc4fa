//! Seam between the refinement loop and the reconstruction engine.

use georefine_core::{Pose, WorldFrame};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Assumed camera-position accuracy handed to the engine, in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyBound {
    pub horizontal: f64,
    pub vertical: f64,
}

impl AccuracyBound {
    pub fn isotropic(accuracy: f64) -> Self {
        Self {
            horizontal: accuracy,
            vertical: accuracy,
        }
    }

    /// Bound with the vertical axis trusted `vertical_scale` times less.
    pub fn with_vertical_scale(accuracy: f64, vertical_scale: f64) -> Self {
        Self {
            horizontal: accuracy,
            vertical: accuracy * vertical_scale,
        }
    }

    /// Per-axis `[x, y, z]` form most engines take.
    pub fn as_axes(&self) -> [f64; 3] {
        [self.horizontal, self.horizontal, self.vertical]
    }
}

/// Failure reported by a reconstruction engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),
    #[error("interrupted")]
    Interrupted,
}

/// External photogrammetric engine driven by the refinement loop.
///
/// Calls are synchronous and may block for a long time. The loop owns the
/// pose list; the engine reads each pose's `enabled` flag and reference,
/// and writes back refreshed estimates.
pub trait ReconstructionEngine {
    /// Re-run camera optimization with `bound` as the reference accuracy,
    /// using only enabled poses as position constraints.
    fn reoptimize(
        &mut self,
        bound: &AccuracyBound,
        poses: &mut [Pose],
    ) -> Result<WorldFrame, EngineError>;

    /// World frame of the current solution, without re-optimizing.
    fn current_world_frame(&self) -> WorldFrame;
}

/// Engine over a fixed, already exported solution.
///
/// Re-optimization always succeeds and leaves the frame and estimates
/// untouched, so running the loop against it screens reference positions
/// for outliers without a live engine.
#[derive(Clone, Debug, Default)]
pub struct SnapshotEngine {
    frame: WorldFrame,
    calls: Vec<AccuracyBound>,
}

impl SnapshotEngine {
    pub fn new(frame: WorldFrame) -> Self {
        Self {
            frame,
            calls: Vec::new(),
        }
    }

    /// Bounds passed to `reoptimize`, in call order.
    pub fn calls(&self) -> &[AccuracyBound] {
        &self.calls
    }
}

impl ReconstructionEngine for SnapshotEngine {
    fn reoptimize(
        &mut self,
        bound: &AccuracyBound,
        _poses: &mut [Pose],
    ) -> Result<WorldFrame, EngineError> {
        self.calls.push(*bound);
        Ok(self.frame.clone())
    }

    fn current_world_frame(&self) -> WorldFrame {
        self.frame.clone()
    }
}

/// Shared interrupt flag; raise it from a signal handler or another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
