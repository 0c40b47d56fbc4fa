use super::{
    AngularPrefilter, CutoffMode, IterationRecord, PrefilterSummary, RefineError,
    RefinementParams, RefinementReport, RefinementState, StopReason,
};
use crate::cutoff::robust_cutoff;
use crate::engine::{AccuracyBound, CancelFlag, ReconstructionEngine};
use georefine_core::{angular_residual, positional_residuals, Pose, WorldFrame};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Accuracy bookkeeping, updated once per iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyState {
    pub current_accuracy: f64,
    pub previous_retained_fraction: f64,
    /// Shrink steps applied so far in this run.
    pub decrements: usize,
}

impl AccuracyState {
    fn start(initial: f64) -> Self {
        Self {
            current_accuracy: initial,
            previous_retained_fraction: 0.0,
            decrements: 0,
        }
    }
}

/// Result of a converged run. Pose enablement lives on in the session.
#[derive(Clone, Debug)]
pub struct RefinementOutcome {
    pub stop_reason: StopReason,
    /// World frame returned by the final re-optimization.
    pub world_frame: WorldFrame,
    pub report: RefinementReport,
}

enum Step {
    Continue(WorldFrame),
    Stop(StopReason),
}

/// One refinement run over an owned pose set.
///
/// The session is the only writer of the poses' `enabled` flags; the engine
/// only receives them for reading during re-optimization.
pub struct RefinementSession {
    poses: Vec<Pose>,
    params: RefinementParams,
    state: RefinementState,
    accuracy: AccuracyState,
    eligible: usize,
    frame: Option<WorldFrame>,
    prefilter: Option<PrefilterSummary>,
    iterations: Vec<IterationRecord>,
    cancel: Option<CancelFlag>,
}

impl RefinementSession {
    /// Validate `params` and create a session over `poses`.
    pub fn new(poses: Vec<Pose>, params: RefinementParams) -> Result<Self, RefineError> {
        params.validate()?;
        Ok(Self {
            accuracy: AccuracyState::start(params.initial_accuracy),
            poses,
            params,
            state: RefinementState::Initializing,
            eligible: 0,
            frame: None,
            prefilter: None,
            iterations: Vec::new(),
            cancel: None,
        })
    }

    /// Abort with [`RefineError::Interrupted`] once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[inline]
    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn into_poses(self) -> Vec<Pose> {
        self.poses
    }

    #[inline]
    pub fn params(&self) -> &RefinementParams {
        &self.params
    }

    #[inline]
    pub fn state(&self) -> RefinementState {
        self.state
    }

    #[inline]
    pub fn accuracy(&self) -> &AccuracyState {
        &self.accuracy
    }

    /// Latest world frame obtained from the engine.
    pub fn world_frame(&self) -> Option<&WorldFrame> {
        self.frame.as_ref()
    }

    /// Poses with an estimated position.
    pub fn eligible(&self) -> usize {
        self.eligible
    }

    pub fn enabled_count(&self) -> usize {
        self.poses.iter().filter(|p| p.enabled).count()
    }

    /// Run the loop to convergence against `engine`.
    ///
    /// On error the session is left `Aborted` with the `enabled` flags as
    /// they were last computed.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(poses = self.poses.len())))]
    pub fn run<E: ReconstructionEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<RefinementOutcome, RefineError> {
        let result = self.run_to_convergence(engine);
        if let Err(err) = &result {
            warn!("refinement aborted: {err}");
            self.state = RefinementState::Aborted;
        }
        result
    }

    fn run_to_convergence<E: ReconstructionEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<RefinementOutcome, RefineError> {
        let mut frame = self.initialize(engine)?;
        self.state = RefinementState::Iterating;

        let mut stop_reason = StopReason::FloorReached;
        while self.accuracy.current_accuracy >= self.params.floor_accuracy {
            match self.step(engine, &frame)? {
                Step::Continue(next) => frame = next,
                Step::Stop(reason) => {
                    stop_reason = reason;
                    break;
                }
            }
        }

        let final_bound = self.restored_bound();
        info!(
            "final re-optimization at {:.4} m horizontal, {:.4} m vertical",
            final_bound.horizontal, final_bound.vertical
        );
        let world_frame = self.reoptimize(engine, final_bound)?;
        self.state = RefinementState::Converged(stop_reason);

        let report = RefinementReport {
            prefilter: self.prefilter,
            iterations: std::mem::take(&mut self.iterations),
            stop_reason,
            final_bound,
            eligible: self.eligible,
            enabled: self.enabled_count(),
        };
        info!(
            "refinement finished ({stop_reason:?}): {} of {} poses enabled after {} iterations",
            report.enabled,
            report.eligible,
            report.iterations.len()
        );

        Ok(RefinementOutcome {
            stop_reason,
            world_frame,
            report,
        })
    }

    fn initialize<E: ReconstructionEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<WorldFrame, RefineError> {
        self.state = RefinementState::Initializing;
        self.iterations.clear();
        self.prefilter = None;
        self.accuracy = AccuracyState::start(self.params.initial_accuracy);

        for pose in &mut self.poses {
            pose.enabled = pose.is_localized();
        }
        self.eligible = self.enabled_count();
        if self.eligible == 0 {
            return Err(RefineError::NoUsablePoses);
        }
        info!(
            "{} of {} poses localized, starting at accuracy {} m",
            self.eligible,
            self.poses.len(),
            self.params.initial_accuracy
        );

        if let Some(prefilter) = self.params.angular_prefilter {
            let current = engine.current_world_frame();
            self.prefilter = Some(self.apply_angular_prefilter(&current, prefilter));
        }

        self.reoptimize(
            engine,
            AccuracyBound::isotropic(self.accuracy.current_accuracy),
        )
    }

    fn apply_angular_prefilter(
        &mut self,
        frame: &WorldFrame,
        prefilter: AngularPrefilter,
    ) -> PrefilterSummary {
        let mut summary = PrefilterSummary {
            threshold_deg: prefilter.threshold_deg,
            ..PrefilterSummary::default()
        };
        for (i, pose) in self.poses.iter_mut().enumerate() {
            let Some(sample) = angular_residual(frame, pose, i) else {
                continue;
            };
            summary.checked += 1;
            if sample.error > prefilter.threshold_deg {
                debug!(
                    "pose {} attitude off by {:.2}° (yaw/pitch/roll {:.2}/{:.2}/{:.2})",
                    pose.id,
                    sample.error,
                    sample.components.x,
                    sample.components.y,
                    sample.components.z
                );
                pose.enabled = false;
                summary.disabled += 1;
            } else {
                summary.passed += 1;
            }
        }
        info!(
            "attitude pre-filter: {} of {} checked poses within {:.1}°",
            summary.passed, summary.checked, summary.threshold_deg
        );
        summary
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(accuracy = self.accuracy.current_accuracy)))]
    fn step<E: ReconstructionEngine>(
        &mut self,
        engine: &mut E,
        frame: &WorldFrame,
    ) -> Result<Step, RefineError> {
        self.check_cancelled()?;

        let accuracy = self.accuracy.current_accuracy;
        let samples = positional_residuals(frame, &self.poses);
        let gate = self.params.retention_gate_factor * accuracy;
        let (retained, retained_sum) = samples
            .iter()
            .filter(|s| s.error <= gate)
            .fold((0usize, 0.0), |(n, sum), s| (n + 1, sum + s.error));
        let retained_fraction = retained as f64 / self.eligible as f64;

        let mut record = IterationRecord {
            iteration: self.iterations.len(),
            accuracy,
            evaluated: samples.len(),
            retained,
            eligible: self.eligible,
            retained_fraction,
            mean_retained_error: (retained > 0).then(|| retained_sum / retained as f64),
            threshold: None,
            robust_cutoff: None,
            disabled: 0,
        };

        if samples.len() < 2 {
            info!(
                "stopping at {accuracy:.4} m: only {} enabled poses left",
                samples.len()
            );
            return Ok(self.stop(record, StopReason::InsufficientData));
        }

        info!(
            "accuracy {accuracy:.4} m: {retained} of {} poses within {gate:.4} m ({:.1}%), mean error {:.4} m",
            self.eligible,
            retained_fraction * 100.0,
            record.mean_retained_error.unwrap_or(f64::NAN)
        );

        if retained_fraction < self.params.minimum_retained_fraction {
            info!(
                "stopping at {accuracy:.4} m: fewer than {:.0}% of poses would be used",
                self.params.minimum_retained_fraction * 100.0
            );
            return Ok(self.stop(record, StopReason::RetainedBelowMinimum));
        }
        if let Some(tolerance) = self.params.drop_tolerance {
            if retained_fraction < tolerance * self.accuracy.previous_retained_fraction {
                info!(
                    "stopping at {accuracy:.4} m: retained share dropped by more than {:.0}%",
                    (1.0 - tolerance) * 100.0
                );
                return Ok(self.stop(record, StopReason::RetainedDropped));
            }
        }
        self.accuracy.previous_retained_fraction = retained_fraction;

        let threshold = match self.params.cutoff_mode {
            CutoffMode::AccuracyGate => gate,
            CutoffMode::Robust => {
                let errors: Vec<f64> = samples.iter().map(|s| s.error).collect();
                let Some(cutoff) = robust_cutoff(&errors) else {
                    return Ok(self.stop(record, StopReason::InsufficientData));
                };
                debug!(
                    "cutoff {:.4} m = max(6 x median {:.4} m, 90% quantile {:.4} m)",
                    cutoff.value(),
                    cutoff.median,
                    cutoff.quantile_cutoff
                );
                record.robust_cutoff = Some(cutoff);
                cutoff.value()
            }
        };
        record.threshold = Some(threshold);

        for sample in samples.iter().filter(|s| s.error > threshold) {
            self.poses[sample.index].enabled = false;
            record.disabled += 1;
        }
        if record.disabled > 0 {
            debug!("disabled {} poses above {threshold:.4} m", record.disabled);
        }
        self.iterations.push(record);

        let next = self.params.step.shrink(accuracy);
        self.accuracy.current_accuracy = next;
        self.accuracy.decrements += 1;
        let frame = self.reoptimize(engine, AccuracyBound::isotropic(next))?;
        Ok(Step::Continue(frame))
    }

    fn stop(&mut self, record: IterationRecord, reason: StopReason) -> Step {
        self.iterations.push(record);
        Step::Stop(reason)
    }

    /// Undo the last shrink and apply the vertical scale.
    ///
    /// A stop on the first iteration never shrank, so the initial accuracy
    /// is used as is.
    fn restored_bound(&mut self) -> AccuracyBound {
        if self.accuracy.decrements > 0 {
            self.accuracy.current_accuracy = self.params.step.undo(self.accuracy.current_accuracy);
        }
        AccuracyBound::with_vertical_scale(
            self.accuracy.current_accuracy,
            self.params.vertical_accuracy_scale,
        )
    }

    fn reoptimize<E: ReconstructionEngine>(
        &mut self,
        engine: &mut E,
        bound: AccuracyBound,
    ) -> Result<WorldFrame, RefineError> {
        self.check_cancelled()?;
        debug!("re-optimizing with accuracy {:?}", bound.as_axes());
        let frame = engine
            .reoptimize(&bound, &mut self.poses)
            .map_err(|err| RefineError::from_engine(bound.horizontal, err))?;
        for pose in &mut self.poses {
            if !pose.is_localized() {
                pose.enabled = false;
            }
        }
        self.frame = Some(frame.clone());
        Ok(frame)
    }

    fn check_cancelled(&self) -> Result<(), RefineError> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(RefineError::Interrupted),
            _ => Ok(()),
        }
    }
}
