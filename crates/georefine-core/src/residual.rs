//! Per-pose discrepancy between the engine's estimate and the reference.
//!
//! Both evaluators are pure: they read a pose and a world frame and never
//! touch the pose's `enabled` flag. A pose that is disabled or was never
//! localized yields `None`.

use crate::frame::WorldFrame;
use crate::pose::{camera_axis_flip, Pose, PoseId, Ypr};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Residual of one pose against the current world frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResidualSample {
    pub pose_id: PoseId,
    /// Index of the pose in the slice it was evaluated from.
    pub index: usize,
    /// Non-negative error magnitude (metres or degrees).
    pub error: f64,
    /// Signed error components: ENU metres (or world metres for a local
    /// CRS) for positions, wrapped yaw/pitch/roll degrees for attitudes.
    pub components: Vector3<f64>,
}

/// World position of the GNSS antenna for a localized pose.
///
/// The antenna offset is rotated but not scaled: it is already metric.
pub fn antenna_position(frame: &WorldFrame, pose: &Pose) -> Option<Point3<f64>> {
    let centre = frame.to_world(pose.estimated_position.as_ref()?);
    let Some(offset) = pose.antenna_offset else {
        return Some(centre);
    };
    let camera_to_world = match pose.estimated_orientation {
        Some(r) => frame.rotation_matrix() * r,
        None => frame.rotation_matrix(),
    };
    Some(centre + camera_to_world.matrix() * camera_axis_flip() * offset)
}

/// Positional residual in metres.
///
/// The estimate is mapped into world coordinates; for a geodetic CRS both
/// the estimate and the reference are expressed in the ENU frame centred at
/// the estimate before differencing.
pub fn positional_residual(frame: &WorldFrame, pose: &Pose, index: usize) -> Option<ResidualSample> {
    if !pose.enabled {
        return None;
    }
    let estimate = antenna_position(frame, pose)?;
    let reference = frame.reference_to_world(&pose.reference_position);
    let components = frame.level_frame_at(&estimate) * (estimate - reference);
    Some(ResidualSample {
        pose_id: pose.id,
        index,
        error: components.norm(),
        components,
    })
}

/// Estimated attitude of a pose in the local level frame at its position.
pub fn estimated_attitude(frame: &WorldFrame, pose: &Pose) -> Option<Ypr> {
    let centre = frame.to_world(pose.estimated_position.as_ref()?);
    let camera = pose.estimated_orientation?;
    let level = frame.level_frame_at(&centre) * frame.rotation_matrix() * camera;
    let body = level.matrix() * camera_axis_flip();
    Some(Ypr::from_rotation(&orthonormalize_rows(&body)))
}

/// Angular residual in degrees: the norm of the wrapped yaw/pitch/roll
/// differences between reference and estimate.
pub fn angular_residual(frame: &WorldFrame, pose: &Pose, index: usize) -> Option<ResidualSample> {
    if !pose.enabled {
        return None;
    }
    let reference = pose.reference_orientation?;
    let estimate = estimated_attitude(frame, pose)?;
    let components = reference.wrapped_difference(&estimate);
    Some(ResidualSample {
        pose_id: pose.id,
        index,
        error: components.norm(),
        components,
    })
}

/// Residuals of every enabled, localized pose in `poses`.
pub fn positional_residuals(frame: &WorldFrame, poses: &[Pose]) -> Vec<ResidualSample> {
    let samples: Vec<ResidualSample> = poses
        .iter()
        .enumerate()
        .filter_map(|(i, p)| positional_residual(frame, p, i))
        .collect();
    log::trace!(
        "{} of {} poses enabled and localized",
        samples.len(),
        poses.len()
    );
    samples
}

// Row-normalize a nearly orthonormal matrix. The chunk transform carries a
// scale that has already been split off, so only round-off remains.
fn orthonormalize_rows(m: &Matrix3<f64>) -> Rotation3<f64> {
    let mut out = *m;
    for mut row in out.row_iter_mut() {
        let n = row.norm();
        if n > 1e-12 {
            row /= n;
        }
    }
    Rotation3::from_matrix_unchecked(out)
}
