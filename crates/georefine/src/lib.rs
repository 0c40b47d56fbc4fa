//! High-level facade crate for the `georefine-*` workspace.
//!
//! This crate provides:
//! - re-exports of the underlying crates under short module names
//! - an end-to-end helper that screens an exported pose snapshot for
//!   reference-position outliers
//! - (feature `cli`) the `georefine` command-line tool
//!
//! ## Quickstart
//!
//! ```no_run
//! use georefine::refine::RefinementPreset;
//! use georefine::screen;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = screen::screen_file("snapshot.json", RefinementPreset::RtkLinear.params())?;
//! println!("disabled: {:?}", report.disabled_poses);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `georefine::core`: poses, world frames, geodesy, residual evaluators.
//! - `georefine::refine`: robust cutoff, engine seam, refinement loop.
//! - `georefine::raster`: tile planning for orthomosaic and DEM exports.
//! - `georefine::screen`: offline screening of a pose snapshot.

pub use georefine_core as core;
pub use georefine_raster as raster;
pub use georefine_refine as refine;

pub use georefine_core::{Pose, PoseId, WorldFrame};
pub use georefine_raster::{plan_tiles, TilePlan, TilingParams};
pub use georefine_refine::{RefinementParams, RefinementPreset, RefinementSession};

pub mod screen;
