//! Core types for georeferenced photogrammetry refinement.
//!
//! This crate holds the pose and world-frame model, ellipsoid geodesy, and
//! the pure residual evaluators the refinement loop is built on. It does
//! *not* know about any particular reconstruction engine.

mod frame;
mod geodesy;
mod pose;
mod residual;

pub use frame::{Crs, WorldFrame};
pub use geodesy::{enu_offset, Ellipsoid};
pub use pose::{camera_axis_flip, wrap_degrees, Pose, PoseId, Ypr};
pub use residual::{
    angular_residual, antenna_position, estimated_attitude, positional_residual,
    positional_residuals, ResidualSample,
};
