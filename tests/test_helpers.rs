//! Scripted stand-ins for the three model stages.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use face_mesh_tracker::crop::{NormalizedRect, Point2};
use face_mesh_tracker::eye_landmarks::{
    eye_roi, EyeIndexPair, EyeIrisResult, EyeLandmarksModel, EyeSide,
};
use face_mesh_tracker::face_detection::{DetectionBox, FaceDetectionModel};
use face_mesh_tracker::face_landmarks::{FaceLandmarksModel, MeshResult, Point3, NUM_LANDMARKS};
use face_mesh_tracker::frame::{Frame, FrameSource};
use face_mesh_tracker::tracking::{FrameResult, TrackingConsumer};
use face_mesh_tracker::{Error, Result};
use image::RgbImage;

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn face_box(x: f32, y: f32, size: f32, score: f32) -> DetectionBox {
    DetectionBox::new(
        NormalizedRect::new(x, y, size, size),
        score,
        Point2::new(x + 0.25 * size, y + 0.4 * size),
        Point2::new(x + 0.75 * size, y + 0.4 * size),
    )
}

/// Returns the same candidates for every frame.
pub struct FixedDetector {
    pub candidates: Vec<DetectionBox>,
    pub calls: Calls,
}

impl FaceDetectionModel for FixedDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionBox>> {
        self.calls.hit();
        Ok(self.candidates.clone())
    }
}

/// A mesh filling `rect`, eyes level at 40% of its height.
pub fn mesh_in(rect: &NormalizedRect, score: f32) -> MeshResult {
    let mut keypoints: Vec<Point3> = (0..NUM_LANDMARKS)
        .map(|i| {
            let col = (i % 26) as f32 / 25.0;
            let row = (i / 26) as f32 / 17.0;
            Point3::new(rect.x + col * rect.width, rect.y + row * rect.height, 0.0)
        })
        .collect();

    let eye_y = rect.y + 0.4 * rect.height;
    for (index, fraction) in [(33, 0.25), (133, 0.4), (362, 0.6), (263, 0.75)] {
        keypoints[index] = Point3::new(rect.x + fraction * rect.width, eye_y, 0.0);
    }

    MeshResult::new(keypoints, score)
}

/// Plays back mesh scores in order, then repeats the last one.
pub struct ScriptedMesh {
    scores: Mutex<VecDeque<f32>>,
    pub faces: Arc<Mutex<Vec<DetectionBox>>>,
    pub calls: Calls,
    /// Collapses both eyes of the produced mesh onto one point.
    pub degenerate_eyes: bool,
    pub fail: bool,
}

impl ScriptedMesh {
    pub fn new(scores: &[f32]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            faces: Arc::new(Mutex::new(Vec::new())),
            calls: Calls::default(),
            degenerate_eyes: false,
            fail: false,
        }
    }
}

impl FaceLandmarksModel for ScriptedMesh {
    fn regress(&self, _frame: &Frame, face: &DetectionBox) -> Result<MeshResult> {
        self.calls.hit();
        self.faces.lock().unwrap().push(face.clone());
        if self.fail {
            return Err(Error::ModelRun("scripted failure".to_string()));
        }

        let score = {
            let mut scores = self.scores.lock().unwrap();
            if scores.len() > 1 {
                scores.pop_front().unwrap()
            } else {
                *scores.front().unwrap()
            }
        };

        let mut mesh = mesh_in(&face.rect, score);
        if self.degenerate_eyes {
            let p = mesh.keypoints[33];
            mesh.keypoints[133] = p;
            mesh.keypoints[362] = p;
            mesh.keypoints[263] = p;
        }
        Ok(mesh)
    }
}

/// Reports the eye region with empty landmark lists.
pub struct RoiEyes {
    pub calls: Calls,
}

impl EyeLandmarksModel for RoiEyes {
    fn regress(
        &self,
        frame: &Frame,
        eye: EyeIndexPair,
        _face: &DetectionBox,
        mesh: &MeshResult,
        side: EyeSide,
    ) -> Result<EyeIrisResult> {
        self.calls.hit();
        let roi = eye_roi(mesh, eye, frame.aspect())?;
        let center = roi.center();
        Ok(EyeIrisResult {
            side,
            roi,
            eye_contour: Vec::new(),
            iris: vec![Point3::new(center.x, center.y, 0.0)],
        })
    }
}

/// Yields `count` blank frames.
pub struct BlankFrames {
    pub count: usize,
}

impl FrameSource for BlankFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.count == 0 {
            return Ok(None);
        }
        self.count -= 1;
        Ok(Some(Frame::new(RgbImage::new(64, 48))))
    }
}

/// Keeps every result it is handed.
#[derive(Default)]
pub struct Recorder {
    pub results: Vec<FrameResult>,
}

impl TrackingConsumer for Recorder {
    fn consume(&mut self, _frame: &Frame, result: &FrameResult) {
        self.results.push(result.clone());
    }
}

pub fn blank_frame() -> Frame {
    Frame::new(RgbImage::new(64, 48))
}
