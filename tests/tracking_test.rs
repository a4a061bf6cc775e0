//! Frame-to-frame behavior of the tracking cascade with scripted stages.

mod test_helpers;

use face_mesh_tracker::config::TrackerConfig;
use face_mesh_tracker::eye_landmarks::EyeSide;
use face_mesh_tracker::face_detection::{DetectionBox, SelectionStrategy};
use face_mesh_tracker::tracking::{FaceTracker, FrameOutcome, TrackingPhase};
use face_mesh_tracker::Error;
use test_helpers::{
    blank_frame, face_box, BlankFrames, Calls, FixedDetector, Recorder, RoiEyes, ScriptedMesh,
};

struct Harness {
    tracker: FaceTracker,
    detector_calls: Calls,
    mesh_calls: Calls,
    eye_calls: Calls,
}

fn harness(candidates: Vec<DetectionBox>, mesh: ScriptedMesh, config: &TrackerConfig) -> Harness {
    let detector_calls = Calls::default();
    let mesh_calls = mesh.calls.clone();
    let eye_calls = Calls::default();

    let tracker = FaceTracker::with_models(
        Box::new(FixedDetector {
            candidates,
            calls: detector_calls.clone(),
        }),
        Box::new(mesh),
        Box::new(RoiEyes {
            calls: eye_calls.clone(),
        }),
        config,
    );

    Harness {
        tracker,
        detector_calls,
        mesh_calls,
        eye_calls,
    }
}

#[test]
fn test_mesh_scores_drive_the_state_machine() {
    let config = TrackerConfig::default();
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.9, 0.9, 0.3, 0.9]),
        &config,
    );

    let frame = blank_frame();
    let results: Vec<_> = (0..4).map(|_| h.tracker.process(&frame).unwrap()).collect();

    let phases: Vec<_> = results.iter().map(|r| r.phase).collect();
    assert_eq!(
        phases,
        vec![
            TrackingPhase::Tracking,
            TrackingPhase::Tracking,
            TrackingPhase::Detecting,
            TrackingPhase::Tracking,
        ]
    );

    let outcomes: Vec<_> = results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            FrameOutcome::Tracked,
            FrameOutcome::Tracked,
            FrameOutcome::LowConfidence,
            FrameOutcome::Tracked,
        ]
    );

    // detector runs on the first frame and after confidence was lost
    let detected: Vec<_> = results.iter().map(|r| r.detected).collect();
    assert_eq!(detected, vec![true, false, false, true]);
    assert_eq!(h.detector_calls.count(), 2);
    assert_eq!(h.mesh_calls.count(), 4);
    assert_eq!(h.tracker.state().last_score(), Some(0.9));
}

#[test]
fn test_low_confidence_keeps_mesh_but_skips_eyes() {
    let config = TrackerConfig::default();
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.2]),
        &config,
    );

    let result = h.tracker.process(&blank_frame()).unwrap();
    assert_eq!(result.outcome, FrameOutcome::LowConfidence);
    assert!(result.face.is_some());
    assert!(result.mesh.is_some());
    assert!(result.eyes.is_none());
    assert_eq!(h.eye_calls.count(), 0);
}

#[test]
fn test_no_detection_short_circuits() {
    let config = TrackerConfig::default();
    let mut h = harness(Vec::new(), ScriptedMesh::new(&[0.9]), &config);

    let mut recorder = Recorder::default();
    let count = h
        .tracker
        .run(&mut BlankFrames { count: 3 }, &mut recorder)
        .unwrap();

    assert_eq!(count, 3);
    assert_eq!(h.detector_calls.count(), 3);
    assert_eq!(h.mesh_calls.count(), 0);
    assert_eq!(h.eye_calls.count(), 0);

    assert_eq!(recorder.results.len(), 3);
    for result in &recorder.results {
        assert_eq!(result.outcome, FrameOutcome::NoDetection);
        assert_eq!(result.phase, TrackingPhase::Detecting);
        assert!(result.face.is_none() && result.mesh.is_none() && result.eyes.is_none());
    }
}

#[test]
fn test_synthesized_box_follows_the_mesh() {
    let config = TrackerConfig::default();
    let mesh = ScriptedMesh::new(&[0.9]);
    let faces = mesh.faces.clone();
    let mut h = harness(vec![face_box(0.2, 0.25, 0.5, 0.9)], mesh, &config);

    let frame = blank_frame();
    let first = h.tracker.process(&frame).unwrap();
    h.tracker.process(&frame).unwrap();

    let faces = faces.lock().unwrap();
    assert_eq!(faces.len(), 2);
    // the second box is the bounding box of the first mesh, anchored at the outer eye corners
    let synthesized = &faces[1];
    assert!((synthesized.rect.x - 0.2).abs() < 1e-5);
    assert!((synthesized.rect.width - 0.5).abs() < 1e-5);
    let mesh = first.mesh.unwrap();
    assert_eq!(synthesized.left_eye(), mesh.keypoints[33].xy());
    assert_eq!(synthesized.right_eye(), mesh.keypoints[263].xy());
    assert!(synthesized.eye_regions.iter().all(|r| r.is_none()));
}

#[test]
fn test_eye_regions_are_stored_on_the_face() {
    let config = TrackerConfig::default();
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.9]),
        &config,
    );

    let result = h.tracker.process(&blank_frame()).unwrap();
    let face = result.face.unwrap();
    let eyes = result.eyes.unwrap();
    for side in EyeSide::BOTH {
        let roi = face.eye_region(side).unwrap();
        assert_eq!(roi, eyes.get(side).roi);
        // square in the pixels of the 64x48 frame
        assert!((roi.width * 64.0 - roi.height * 48.0).abs() < 1e-4);
    }
    assert!(eyes.left.roi.center().x < eyes.right.roi.center().x);
    assert_eq!(h.eye_calls.count(), 2);
}

#[test]
fn test_forced_detection_runs_detector_every_frame() {
    let mut config = TrackerConfig::default();
    config.tracking.use_landmark_to_detection = false;
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.9]),
        &config,
    );

    let frame = blank_frame();
    for _ in 0..3 {
        let result = h.tracker.process(&frame).unwrap();
        assert_eq!(result.outcome, FrameOutcome::Tracked);
        assert_eq!(result.phase, TrackingPhase::Detecting);
        assert!(result.detected);
    }
    assert_eq!(h.detector_calls.count(), 3);
}

#[test]
fn test_degenerate_eye_region_is_treated_as_no_detection() {
    let config = TrackerConfig::default();
    let mut mesh = ScriptedMesh::new(&[0.9]);
    mesh.degenerate_eyes = true;
    let mut h = harness(vec![face_box(0.3, 0.3, 0.4, 0.9)], mesh, &config);

    let frame = blank_frame();
    let result = h.tracker.process(&frame).unwrap();
    assert_eq!(result.outcome, FrameOutcome::NoDetection);
    assert_eq!(result.phase, TrackingPhase::Detecting);
    assert!(result.mesh.is_none() && result.eyes.is_none());

    h.tracker.process(&frame).unwrap();
    assert_eq!(h.detector_calls.count(), 2);
}

#[test]
fn test_model_failure_propagates() {
    let config = TrackerConfig::default();
    let mut mesh = ScriptedMesh::new(&[0.9]);
    mesh.fail = true;
    let mut h = harness(vec![face_box(0.3, 0.3, 0.4, 0.9)], mesh, &config);

    assert!(matches!(
        h.tracker.process(&blank_frame()),
        Err(Error::ModelRun(_))
    ));
}

#[test]
fn test_selection_strategy_from_config() {
    let mut config = TrackerConfig::default();
    config.detection.selection = SelectionStrategy::HighestScore;
    let mesh = ScriptedMesh::new(&[0.9]);
    let faces = mesh.faces.clone();
    let mut h = harness(
        vec![face_box(0.1, 0.1, 0.2, 0.8), face_box(0.5, 0.5, 0.3, 0.95)],
        mesh,
        &config,
    );

    h.tracker.process(&blank_frame()).unwrap();
    assert_eq!(faces.lock().unwrap()[0].score, 0.95);
}

#[test]
fn test_parallel_eyes_match_sequential() {
    let frame = blank_frame();
    let mut results = Vec::new();
    for parallel in [false, true] {
        let mut config = TrackerConfig::default();
        config.tracking.parallel_eyes = parallel;
        let mut h = harness(
            vec![face_box(0.3, 0.3, 0.4, 0.9)],
            ScriptedMesh::new(&[0.9]),
            &config,
        );
        results.push(h.tracker.process(&frame).unwrap());
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_eye_indices_from_config() {
    let mut config = TrackerConfig::default();
    // both regions built from the left eye's corners
    config.iris.right_eye = config.iris.left_eye;
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.9]),
        &config,
    );

    let eyes = h.tracker.process(&blank_frame()).unwrap().eyes.unwrap();
    assert_eq!(eyes.left.roi, eyes.right.roi);
    assert_eq!(eyes.right.side, EyeSide::Right);
}

#[test]
fn test_reset_forces_detection() {
    let config = TrackerConfig::default();
    let mut h = harness(
        vec![face_box(0.3, 0.3, 0.4, 0.9)],
        ScriptedMesh::new(&[0.9]),
        &config,
    );

    let frame = blank_frame();
    h.tracker.process(&frame).unwrap();
    h.tracker.reset();
    let result = h.tracker.process(&frame).unwrap();
    assert!(result.detected);
    assert_eq!(h.detector_calls.count(), 2);
}
