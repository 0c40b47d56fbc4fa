//! Screening an exported solution for reference-position outliers.
//!
//! The refinement loop runs against a [`SnapshotEngine`], so no
//! re-optimization happens: poses are judged against the frame and
//! estimates stored in the snapshot.
//!
//! The `_with_cancel` variants take a [`CancelFlag`]; raising it ends the
//! run with [`RefineError::Interrupted`] before the next step.

use georefine_core::Pose;
use georefine_refine::{
    CancelFlag, PoseSnapshot, RefineError, RefineIoError, RefinementOutcome, RefinementParams,
    RefinementSession, ScreeningReport, SnapshotEngine,
};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ScreenError {
    #[error("failed to read snapshot: {0}")]
    Snapshot(#[from] RefineIoError),
    #[error(transparent)]
    Refine(#[from] RefineError),
}

/// Run the loop over `snapshot` and return the outcome with the poses as
/// left by the run.
pub fn screen_snapshot(
    snapshot: PoseSnapshot,
    params: RefinementParams,
) -> Result<(RefinementOutcome, Vec<Pose>), RefineError> {
    screen_snapshot_with_cancel(snapshot, params, CancelFlag::new())
}

pub fn screen_snapshot_with_cancel(
    snapshot: PoseSnapshot,
    params: RefinementParams,
    cancel: CancelFlag,
) -> Result<(RefinementOutcome, Vec<Pose>), RefineError> {
    let mut engine = SnapshotEngine::new(snapshot.frame);
    let mut session = RefinementSession::new(snapshot.poses, params)?.with_cancel_flag(cancel);
    let outcome = session.run(&mut engine)?;
    Ok((outcome, session.into_poses()))
}

/// Load a snapshot from `path`, screen it, and build the report.
pub fn screen_file(
    path: impl AsRef<Path>,
    params: RefinementParams,
) -> Result<ScreeningReport, ScreenError> {
    screen_file_with_cancel(path, params, CancelFlag::new())
}

pub fn screen_file_with_cancel(
    path: impl AsRef<Path>,
    params: RefinementParams,
    cancel: CancelFlag,
) -> Result<ScreeningReport, ScreenError> {
    let path = path.as_ref();
    let snapshot = PoseSnapshot::load_json(path)?;
    log::info!(
        "screening {} poses from {}",
        snapshot.poses.len(),
        path.display()
    );
    let (outcome, poses) = screen_snapshot_with_cancel(snapshot, params.clone(), cancel)?;
    Ok(ScreeningReport::new(
        path.display().to_string(),
        params,
        outcome,
        &poses,
    ))
}
