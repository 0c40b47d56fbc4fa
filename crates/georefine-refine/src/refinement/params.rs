use serde::{Deserialize, Serialize};

/// How the accuracy bound shrinks after each accepted iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccuracyStep {
    /// `accuracy -= delta`.
    Subtract { delta: f64 },
    /// `accuracy /= ratio`.
    Divide { ratio: f64 },
}

impl AccuracyStep {
    #[inline]
    pub fn shrink(&self, accuracy: f64) -> f64 {
        match *self {
            AccuracyStep::Subtract { delta } => accuracy - delta,
            AccuracyStep::Divide { ratio } => accuracy / ratio,
        }
    }

    /// Inverse of [`AccuracyStep::shrink`].
    #[inline]
    pub fn undo(&self, accuracy: f64) -> f64 {
        match *self {
            AccuracyStep::Subtract { delta } => accuracy + delta,
            AccuracyStep::Divide { ratio } => accuracy * ratio,
        }
    }

    /// Upper bound on loop iterations between `initial` and `floor`.
    pub fn max_iterations(&self, initial: f64, floor: f64) -> usize {
        if initial < floor {
            return 0;
        }
        let span = match *self {
            AccuracyStep::Subtract { delta } => (initial - floor) / delta,
            AccuracyStep::Divide { ratio } => (initial / floor).ln() / ratio.ln(),
        };
        // Small slack for floating-point accumulation in repeated shrinking.
        (span + 1e-9).floor() as usize + 1
    }
}

/// Which rule disables poses inside one iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffMode {
    /// Disable poses with a residual above `retention_gate_factor * accuracy`.
    AccuracyGate,
    /// Disable poses with a residual above the robust median/quantile cutoff.
    #[default]
    Robust,
}

/// One-time attitude check run before positional refinement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngularPrefilter {
    /// Poses whose combined yaw/pitch/roll error exceeds this are disabled.
    pub threshold_deg: f64,
}

impl Default for AngularPrefilter {
    fn default() -> Self {
        Self {
            threshold_deg: 10.0,
        }
    }
}

/// Parameters of the accuracy refinement loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementParams {
    /// Starting accuracy bound (metres).
    pub initial_accuracy: f64,
    /// The loop iterates while the bound is at or above this value.
    pub floor_accuracy: f64,
    pub step: AccuracyStep,
    /// Stop once fewer than this fraction of eligible poses are retained.
    pub minimum_retained_fraction: f64,
    /// Stop once the retained fraction falls below this multiple of the
    /// previous iteration's fraction.
    #[serde(default)]
    pub drop_tolerance: Option<f64>,
    /// Residuals within `retention_gate_factor * accuracy` count as retained.
    #[serde(default = "default_gate_factor")]
    pub retention_gate_factor: f64,
    #[serde(default)]
    pub cutoff_mode: CutoffMode,
    #[serde(default)]
    pub angular_prefilter: Option<AngularPrefilter>,
    /// Vertical accuracy multiplier applied to the final re-optimization.
    #[serde(default = "default_vertical_scale")]
    pub vertical_accuracy_scale: f64,
}

fn default_gate_factor() -> f64 {
    20.0
}

fn default_vertical_scale() -> f64 {
    1.0
}

/// Parameter validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RefinementParamsError {
    #[error("initial_accuracy must be finite and > 0 (got {0})")]
    InvalidInitialAccuracy(f64),
    #[error("floor_accuracy must be finite, > 0 and <= initial_accuracy (got {0})")]
    InvalidFloorAccuracy(f64),
    #[error("subtract step delta must be finite and > 0 (got {0})")]
    InvalidStepDelta(f64),
    #[error("divide step ratio must be finite and > 1 (got {0})")]
    InvalidStepRatio(f64),
    #[error("minimum_retained_fraction must be in (0, 1] (got {0})")]
    InvalidMinimumRetainedFraction(f64),
    #[error("drop_tolerance must be in (0, 1] (got {0})")]
    InvalidDropTolerance(f64),
    #[error("retention_gate_factor must be finite and > 0 (got {0})")]
    InvalidGateFactor(f64),
    #[error("vertical_accuracy_scale must be finite and > 0 (got {0})")]
    InvalidVerticalScale(f64),
    #[error("angular prefilter threshold must be finite and > 0 (got {0})")]
    InvalidAngularThreshold(f64),
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn unit_fraction(v: f64) -> bool {
    v.is_finite() && v > 0.0 && v <= 1.0
}

impl RefinementParams {
    pub fn validate(&self) -> Result<(), RefinementParamsError> {
        use RefinementParamsError as E;

        if !positive(self.initial_accuracy) {
            return Err(E::InvalidInitialAccuracy(self.initial_accuracy));
        }
        if !positive(self.floor_accuracy) || self.floor_accuracy > self.initial_accuracy {
            return Err(E::InvalidFloorAccuracy(self.floor_accuracy));
        }
        match self.step {
            AccuracyStep::Subtract { delta } if !positive(delta) => {
                return Err(E::InvalidStepDelta(delta))
            }
            AccuracyStep::Divide { ratio } if !(ratio.is_finite() && ratio > 1.0) => {
                return Err(E::InvalidStepRatio(ratio))
            }
            _ => {}
        }
        if !unit_fraction(self.minimum_retained_fraction) {
            return Err(E::InvalidMinimumRetainedFraction(
                self.minimum_retained_fraction,
            ));
        }
        if let Some(tol) = self.drop_tolerance {
            if !unit_fraction(tol) {
                return Err(E::InvalidDropTolerance(tol));
            }
        }
        if !positive(self.retention_gate_factor) {
            return Err(E::InvalidGateFactor(self.retention_gate_factor));
        }
        if !positive(self.vertical_accuracy_scale) {
            return Err(E::InvalidVerticalScale(self.vertical_accuracy_scale));
        }
        if let Some(pre) = self.angular_prefilter {
            if !positive(pre.threshold_deg) {
                return Err(E::InvalidAngularThreshold(pre.threshold_deg));
            }
        }
        Ok(())
    }

    /// Upper bound on the number of loop iterations for these parameters.
    pub fn max_iterations(&self) -> usize {
        self.step
            .max_iterations(self.initial_accuracy, self.floor_accuracy)
    }
}

impl Default for RefinementParams {
    fn default() -> Self {
        RefinementPreset::RtkRatio.params()
    }
}

/// Named parameter sets for the processing generations in use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementPreset {
    /// Geometric shrink with the robust cutoff.
    #[default]
    RtkRatio,
    /// Linear shrink with the 20x accuracy gate and a 10 % drop check.
    RtkLinear,
    /// Linear shrink with an attitude pre-filter, a looser retention floor
    /// and a softer vertical bound.
    RtkOrientation,
}

impl RefinementPreset {
    pub const ALL: [RefinementPreset; 3] = [
        RefinementPreset::RtkRatio,
        RefinementPreset::RtkLinear,
        RefinementPreset::RtkOrientation,
    ];

    pub fn params(self) -> RefinementParams {
        match self {
            RefinementPreset::RtkRatio => RefinementParams {
                initial_accuracy: 0.2,
                floor_accuracy: 0.005,
                step: AccuracyStep::Divide { ratio: 1.5 },
                minimum_retained_fraction: 0.6,
                drop_tolerance: None,
                retention_gate_factor: 20.0,
                cutoff_mode: CutoffMode::Robust,
                angular_prefilter: None,
                vertical_accuracy_scale: 1.0,
            },
            RefinementPreset::RtkLinear => RefinementParams {
                initial_accuracy: 0.1,
                floor_accuracy: 0.004,
                step: AccuracyStep::Subtract { delta: 0.005 },
                minimum_retained_fraction: 0.6,
                drop_tolerance: Some(0.9),
                retention_gate_factor: 20.0,
                cutoff_mode: CutoffMode::AccuracyGate,
                angular_prefilter: None,
                vertical_accuracy_scale: 1.0,
            },
            RefinementPreset::RtkOrientation => RefinementParams {
                initial_accuracy: 0.1,
                floor_accuracy: 0.004,
                step: AccuracyStep::Subtract { delta: 0.005 },
                minimum_retained_fraction: 0.45,
                drop_tolerance: Some(0.8),
                retention_gate_factor: 20.0,
                cutoff_mode: CutoffMode::AccuracyGate,
                angular_prefilter: Some(AngularPrefilter::default()),
                vertical_accuracy_scale: 1.5,
            },
        }
    }
}
