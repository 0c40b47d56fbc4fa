//! JSON snapshot, parameter and report helpers.

use crate::refinement::{RefinementOutcome, RefinementParams, RefinementReport};
use georefine_core::{Pose, PoseId, WorldFrame};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum RefineIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, RefineIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), RefineIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Exported solution: the world frame plus every pose with its estimate
/// and reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSnapshot {
    #[serde(default)]
    pub frame: WorldFrame,
    pub poses: Vec<Pose>,
}

impl PoseSnapshot {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RefineIoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RefineIoError> {
        write_json(self, path)
    }
}

impl RefinementParams {
    /// Load parameters from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RefineIoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RefineIoError> {
        write_json(self, path)
    }
}

/// Report written after screening a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub input_path: String,
    pub params: RefinementParams,
    pub report: RefinementReport,
    /// Localized poses left disabled at the end of the run.
    pub disabled_poses: Vec<PoseId>,
}

impl ScreeningReport {
    pub fn new(
        input_path: impl Into<String>,
        params: RefinementParams,
        outcome: RefinementOutcome,
        poses: &[Pose],
    ) -> Self {
        Self {
            input_path: input_path.into(),
            params,
            report: outcome.report,
            disabled_poses: poses
                .iter()
                .filter(|p| p.is_localized() && !p.enabled)
                .map(|p| p.id)
                .collect(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RefineIoError> {
        write_json(self, path)
    }
}
