use georefine_core::{camera_axis_flip, Pose, Ypr};
use georefine_refine::{
    AccuracyBound, AccuracyStep, AngularPrefilter, CancelFlag, CutoffMode, EngineError,
    ReconstructionEngine, RefineError, RefinementParams, RefinementPreset, RefinementSession,
    RefinementState, SnapshotEngine, StopReason, WorldFrame,
};
use nalgebra::{Point3, Rotation3, Vector3};

type Script = Box<dyn FnMut(usize, &AccuracyBound, &mut [Pose]) -> Result<WorldFrame, EngineError>>;

/// Engine whose re-optimization result is produced by a closure receiving
/// the call index, the bound, and the pose list.
struct ScriptedEngine {
    calls: Vec<AccuracyBound>,
    script: Script,
}

impl ScriptedEngine {
    fn new(
        script: impl FnMut(usize, &AccuracyBound, &mut [Pose]) -> Result<WorldFrame, EngineError>
            + 'static,
    ) -> Self {
        Self {
            calls: Vec::new(),
            script: Box::new(script),
        }
    }
}

impl ReconstructionEngine for ScriptedEngine {
    fn reoptimize(
        &mut self,
        bound: &AccuracyBound,
        poses: &mut [Pose],
    ) -> Result<WorldFrame, EngineError> {
        let index = self.calls.len();
        self.calls.push(*bound);
        (self.script)(index, bound, poses)
    }

    fn current_world_frame(&self) -> WorldFrame {
        WorldFrame::identity()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Localized pose whose residual in the identity frame is exactly `error`.
fn pose_with_error(id: u32, error: f64) -> Pose {
    let reference = Point3::new(id as f64, 0.0, 100.0);
    Pose::new(id, reference).with_estimate(reference + Vector3::new(0.0, 0.0, error))
}

fn with_attitude_error(pose: Pose, yaw_error: f64) -> Pose {
    let estimated = Ypr::new(45.0, 2.0, -1.0);
    let reference = Ypr::new(45.0 + yaw_error, 2.0, -1.0);
    let camera = Rotation3::from_matrix_unchecked(estimated.to_rotation().matrix() * camera_axis_flip());
    pose.with_orientations(camera, reference)
}

/// 90 poses between 1 and 5 cm, 10 poses 5 m off.
fn ninety_good_ten_bad() -> Vec<Pose> {
    (0..100)
        .map(|i| {
            if i < 90 {
                pose_with_error(i, 0.01 + 0.04 * i as f64 / 89.0)
            } else {
                pose_with_error(i, 5.0)
            }
        })
        .collect()
}

fn assert_non_increasing_then_one_restore(calls: &[AccuracyBound]) {
    let (last, loop_calls) = calls.split_last().expect("at least one call");
    for pair in loop_calls.windows(2) {
        assert!(pair[1].horizontal <= pair[0].horizontal, "bound grew inside the loop");
    }
    let smallest = loop_calls.last().expect("initial call").horizontal;
    assert!(last.horizontal >= smallest);
}

#[test]
fn prefiltered_outliers_leave_robust_cutoff_untouched() {
    init_logging();
    let poses: Vec<Pose> = ninety_good_ten_bad()
        .into_iter()
        .enumerate()
        .map(|(i, p)| with_attitude_error(p, if i < 90 { 2.0 } else { 20.0 }))
        .collect();
    let params = RefinementParams {
        angular_prefilter: Some(AngularPrefilter::default()),
        ..RefinementPreset::RtkRatio.params()
    };

    let mut session = RefinementSession::new(poses, params).expect("params");
    let mut engine = SnapshotEngine::new(WorldFrame::identity());
    let outcome = session.run(&mut engine).expect("run");

    let prefilter = outcome.report.prefilter.expect("prefilter ran");
    assert_eq!(prefilter.checked, 100);
    assert_eq!(prefilter.disabled, 10);

    let first = &outcome.report.iterations[0];
    assert!((first.accuracy - 0.2).abs() < 1e-12);
    assert_eq!(first.evaluated, 90);
    assert_eq!(first.retained, 90);
    assert!((first.retained_fraction - 0.9).abs() < 1e-12);
    let cutoff = first.robust_cutoff.expect("robust cutoff");
    assert!((cutoff.median - 0.03).abs() < 1e-3);
    assert!((cutoff.value() - 0.18).abs() < 1e-2);
    assert_eq!(first.disabled, 0);

    assert_eq!(outcome.stop_reason, StopReason::FloorReached);
    assert_eq!(session.enabled_count(), 90);
    assert_eq!(outcome.report.iterations.len(), 10);
}

#[test]
fn accuracy_gate_disables_far_outliers_first_iteration() {
    let params = RefinementParams {
        initial_accuracy: 0.2,
        ..RefinementPreset::RtkLinear.params()
    };
    let mut session = RefinementSession::new(ninety_good_ten_bad(), params).expect("params");
    let outcome = session
        .run(&mut SnapshotEngine::new(WorldFrame::identity()))
        .expect("run");

    let first = &outcome.report.iterations[0];
    assert_eq!(first.retained, 90);
    assert!((first.retained_fraction - 0.9).abs() < 1e-12);
    assert_eq!(first.threshold, Some(first.accuracy * 20.0));
    assert_eq!(first.disabled, 10);
    assert!(session.poses()[90..].iter().all(|p| !p.enabled));
    assert!(session.poses()[..90].iter().all(|p| p.enabled));
}

#[test]
fn robust_mode_keeps_quantile_survivors() {
    let mut session =
        RefinementSession::new(ninety_good_ten_bad(), RefinementPreset::RtkRatio.params())
            .expect("params");
    let outcome = session
        .run(&mut SnapshotEngine::new(WorldFrame::identity()))
        .expect("run");
    // The 90 % quantile of 100 samples is the first 5 m residual itself.
    let first = &outcome.report.iterations[0];
    assert_eq!(first.robust_cutoff.map(|c| c.quantile_cutoff), Some(5.0));
    assert_eq!(first.disabled, 0);
}

#[test]
fn stops_when_retained_share_falls_below_minimum() {
    let poses: Vec<Pose> = (0..100).map(|i| pose_with_error(i, i as f64 * 0.01)).collect();
    let mut session =
        RefinementSession::new(poses, RefinementPreset::RtkRatio.params()).expect("params");
    let mut engine = SnapshotEngine::new(WorldFrame::identity());
    let outcome = session.run(&mut engine).expect("run");

    assert_eq!(outcome.stop_reason, StopReason::RetainedBelowMinimum);
    assert_eq!(outcome.report.iterations.len(), 6);
    let last = outcome.report.iterations.last().expect("records");
    assert_eq!(last.retained, 53);
    assert_eq!(last.threshold, None);

    // initial + five shrinks + final
    assert_eq!(engine.calls().len(), 7);
    assert_non_increasing_then_one_restore(engine.calls());
    let restored = 0.2 / 1.5_f64.powi(4);
    assert!((outcome.report.final_bound.horizontal - restored).abs() < 1e-12);
    assert_eq!(session.enabled_count(), 100);
}

#[test]
fn sharp_drop_stops_without_disabling() {
    let poses: Vec<Pose> = (0..100)
        .map(|i| pose_with_error(i, if i < 70 { 0.01 } else { 1.85 }))
        .collect();
    let mut session =
        RefinementSession::new(poses, RefinementPreset::RtkLinear.params()).expect("params");
    let outcome = session
        .run(&mut SnapshotEngine::new(WorldFrame::identity()))
        .expect("run");

    assert_eq!(outcome.stop_reason, StopReason::RetainedDropped);
    assert_eq!(outcome.report.iterations.len(), 3);
    assert!((outcome.report.iterations[2].retained_fraction - 0.7).abs() < 1e-12);
    assert_eq!(session.enabled_count(), 100);
    assert!((outcome.report.final_bound.horizontal - 0.095).abs() < 1e-9);
}

#[test]
fn perfect_poses_run_to_the_floor_within_iteration_bound() {
    let poses: Vec<Pose> = (0..20).map(|i| pose_with_error(i, 0.0)).collect();
    let params = RefinementPreset::RtkOrientation.params();
    let bound = params.max_iterations();
    let mut session = RefinementSession::new(poses, params).expect("params");
    let mut engine = SnapshotEngine::new(WorldFrame::identity());
    let outcome = session.run(&mut engine).expect("run");

    assert_eq!(outcome.stop_reason, StopReason::FloorReached);
    assert_eq!(outcome.report.iterations.len(), 20);
    assert!(outcome.report.iterations.len() <= bound);
    assert!(outcome.report.prefilter.is_some());

    // initial + 19 shrinks above the floor + one below it + final
    assert_eq!(engine.calls().len(), 22);
    assert_non_increasing_then_one_restore(engine.calls());

    let accuracies: Vec<f64> = outcome.report.accuracies().collect();
    assert!(accuracies.windows(2).all(|w| w[1] < w[0]));

    let last = engine.calls().last().expect("final call");
    assert!((last.horizontal - 0.005).abs() < 1e-9);
    assert!((last.vertical - 0.0075).abs() < 1e-9);
}

#[test]
fn shrink_below_floor_is_reoptimized_before_restoring() {
    let poses: Vec<Pose> = (0..20).map(|i| pose_with_error(i, 0.0)).collect();
    let params = RefinementPreset::RtkRatio.params();
    let floor = params.floor_accuracy;
    let mut session = RefinementSession::new(poses, params).expect("params");
    let mut engine = SnapshotEngine::new(WorldFrame::identity());
    let outcome = session.run(&mut engine).expect("run");

    assert_eq!(outcome.stop_reason, StopReason::FloorReached);
    assert_eq!(outcome.report.iterations.len(), 10);
    assert_eq!(engine.calls().len(), 12);

    let calls = engine.calls();
    let below = calls[calls.len() - 2];
    assert!(below.horizontal < floor);
    assert!((below.horizontal - 0.2 / 1.5_f64.powi(10)).abs() < 1e-12);

    let restored = 0.2 / 1.5_f64.powi(9);
    assert!((calls[calls.len() - 1].horizontal - restored).abs() < 1e-12);
    assert!((outcome.report.final_bound.horizontal - restored).abs() < 1e-12);
}

#[test]
fn first_iteration_stop_keeps_initial_accuracy() {
    let poses: Vec<Pose> = (0..10).map(|i| pose_with_error(i, 5.0)).collect();
    let params = RefinementPreset::RtkRatio.params();
    let initial = params.initial_accuracy;
    let mut session = RefinementSession::new(poses, params).expect("params");
    let mut engine = SnapshotEngine::new(WorldFrame::identity());
    let outcome = session.run(&mut engine).expect("run");

    assert_eq!(outcome.stop_reason, StopReason::RetainedBelowMinimum);
    assert_eq!(outcome.report.iterations.len(), 1);
    assert_eq!(outcome.report.iterations[0].retained, 0);
    assert_eq!(session.accuracy().decrements, 0);

    // Nothing was shrunk, so the final pass reuses the initial bound.
    let horizontal: Vec<f64> = engine.calls().iter().map(|b| b.horizontal).collect();
    assert_eq!(horizontal, vec![initial, initial]);
    assert_eq!(outcome.report.final_bound.horizontal, initial);
    assert_eq!(session.enabled_count(), 10);
}

#[test]
fn loop_uses_refreshed_world_frame() {
    let poses: Vec<Pose> = (0..10).map(|i| pose_with_error(i, 0.0)).collect();
    let mut engine = ScriptedEngine::new(|_, bound, _| {
        let mut frame = WorldFrame::identity();
        if bound.horizontal < 0.15 {
            frame.translation = Vector3::new(0.0, 0.0, 10.0);
        }
        Ok(frame)
    });
    let mut session =
        RefinementSession::new(poses, RefinementPreset::RtkRatio.params()).expect("params");
    let outcome = session.run(&mut engine).expect("run");

    assert_eq!(outcome.stop_reason, StopReason::RetainedBelowMinimum);
    assert_eq!(outcome.report.iterations.len(), 2);
    assert_eq!(outcome.report.iterations[1].retained, 0);
    assert_eq!(outcome.report.iterations[1].mean_retained_error, None);
    assert!((outcome.world_frame.translation.z - 0.0).abs() < 1e-12);
}

#[test]
fn engine_can_lose_a_pose() {
    let poses: Vec<Pose> = (0..5).map(|i| pose_with_error(i, 0.0)).collect();
    let mut engine = ScriptedEngine::new(|call, _, poses: &mut [Pose]| {
        if call == 1 {
            poses[0].estimated_position = None;
        }
        Ok(WorldFrame::identity())
    });
    let mut session =
        RefinementSession::new(poses, RefinementPreset::RtkRatio.params()).expect("params");
    session.run(&mut engine).expect("run");
    assert!(!session.poses()[0].enabled);
    assert_eq!(session.eligible(), 5);
}

#[test]
fn engine_failure_aborts_with_named_error() {
    let poses: Vec<Pose> = (0..10).map(|i| pose_with_error(i, 0.0)).collect();
    let mut engine = ScriptedEngine::new(|call, _, _| {
        if call == 2 {
            Err(EngineError::Failed("optimizeCameras returned false".into()))
        } else {
            Ok(WorldFrame::identity())
        }
    });
    let mut session =
        RefinementSession::new(poses, RefinementPreset::RtkRatio.params()).expect("params");
    let err = session.run(&mut engine).expect_err("engine failure");

    match &err {
        RefineError::OptimizationFailed { accuracy, .. } => {
            assert!((accuracy - 0.2 / 1.5 / 1.5).abs() < 1e-12);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("optimization failed"));
    assert_eq!(session.state(), RefinementState::Aborted);
}

#[test]
fn cancellation_keeps_last_enablement() {
    let flag = CancelFlag::new();
    let raise = flag.clone();
    let mut engine = ScriptedEngine::new(move |call, _, _| {
        if call == 1 {
            raise.cancel();
        }
        Ok(WorldFrame::identity())
    });
    let params = RefinementParams {
        cutoff_mode: CutoffMode::AccuracyGate,
        ..RefinementPreset::RtkRatio.params()
    };
    let mut session = RefinementSession::new(ninety_good_ten_bad(), params)
        .expect("params")
        .with_cancel_flag(flag);
    let err = session.run(&mut engine).expect_err("interrupted");

    assert!(matches!(err, RefineError::Interrupted));
    assert_eq!(session.state(), RefinementState::Aborted);
    assert_eq!(session.enabled_count(), 90);
    assert_eq!(engine.calls.len(), 2);
}

#[test]
fn engine_interrupt_maps_to_interrupted() {
    let poses: Vec<Pose> = (0..3).map(|i| pose_with_error(i, 0.0)).collect();
    let mut engine = ScriptedEngine::new(|_, _, _| Err(EngineError::Interrupted));
    let mut session = RefinementSession::new(poses, RefinementParams::default()).expect("params");
    assert!(matches!(
        session.run(&mut engine),
        Err(RefineError::Interrupted)
    ));
}

#[test]
fn subtract_step_bound_holds_for_custom_params() {
    let params = RefinementParams {
        initial_accuracy: 0.05,
        floor_accuracy: 0.01,
        step: AccuracyStep::Subtract { delta: 0.01 },
        ..RefinementParams::default()
    };
    let bound = params.max_iterations();
    let poses: Vec<Pose> = (0..4).map(|i| pose_with_error(i, 0.0)).collect();
    let mut session = RefinementSession::new(poses, params).expect("params");
    let outcome = session
        .run(&mut SnapshotEngine::new(WorldFrame::identity()))
        .expect("run");
    assert!(outcome.report.iterations.len() <= bound);
    assert!(outcome.report.iterations.len() >= 4);
}
