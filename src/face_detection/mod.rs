pub mod model_blazeface;

use serde::{Deserialize, Serialize};

use crate::crop::{face_rotation, NormalizedRect, Point2};
use crate::eye_landmarks::EyeSide;
use crate::frame::Frame;
use crate::Result;

/// Locates candidate faces in a whole frame.
pub trait FaceDetectionModel: Send + Sync {
    /// All candidates above the detector's score threshold, in model output order.
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionBox>>;
}

/// A face region in normalized upright frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
    pub rect: NormalizedRect,
    pub score: f32,
    /// Image-left and image-right eye anchors, used to level the face.
    pub eye_anchors: [Point2; 2],
    /// Every keypoint the producer reported, anchors included.
    pub keypoints: Vec<Point2>,
    /// Square eye regions computed by the iris stage for this frame.
    pub eye_regions: [Option<NormalizedRect>; 2],
}

impl DetectionBox {
    pub fn new(rect: NormalizedRect, score: f32, left_eye: Point2, right_eye: Point2) -> Self {
        Self {
            rect,
            score,
            eye_anchors: [left_eye, right_eye],
            keypoints: vec![left_eye, right_eye],
            eye_regions: [None, None],
        }
    }

    pub fn with_keypoints(mut self, keypoints: Vec<Point2>) -> Self {
        self.keypoints = keypoints;
        self
    }

    pub fn left_eye(&self) -> Point2 {
        self.eye_anchors[0]
    }

    pub fn right_eye(&self) -> Point2 {
        self.eye_anchors[1]
    }

    /// Rotation that brings the eye anchors level on a frame of the given
    /// upright width/height ratio.
    pub fn rotation(&self, aspect: f32) -> f32 {
        face_rotation(&self.left_eye(), &self.right_eye(), aspect)
    }

    pub fn eye_region(&self, side: EyeSide) -> Option<NormalizedRect> {
        self.eye_regions[side.index()]
    }

    pub fn set_eye_region(&mut self, side: EyeSide, rect: NormalizedRect) {
        self.eye_regions[side.index()] = Some(rect);
    }
}

/// Picks the face to track from the detector's candidates.
pub trait CandidateSelector: Send + Sync {
    fn select(&self, candidates: Vec<DetectionBox>) -> Option<DetectionBox>;
}

/// Takes the first candidate in model output order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidate;

impl CandidateSelector for FirstCandidate {
    fn select(&self, candidates: Vec<DetectionBox>) -> Option<DetectionBox> {
        candidates.into_iter().next()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HighestScore;

impl CandidateSelector for HighestScore {
    fn select(&self, candidates: Vec<DetectionBox>) -> Option<DetectionBox> {
        candidates
            .into_iter()
            .reduce(|best, next| if next.score > best.score { next } else { best })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LargestArea;

impl CandidateSelector for LargestArea {
    fn select(&self, candidates: Vec<DetectionBox>) -> Option<DetectionBox> {
        candidates.into_iter().reduce(|best, next| {
            if next.rect.area() > best.rect.area() {
                next
            } else {
                best
            }
        })
    }
}

/// Configurable name for a [`CandidateSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    First,
    HighestScore,
    LargestArea,
}

impl SelectionStrategy {
    pub fn selector(&self) -> Box<dyn CandidateSelector> {
        match self {
            SelectionStrategy::First => Box::new(FirstCandidate),
            SelectionStrategy::HighestScore => Box::new(HighestScore),
            SelectionStrategy::LargestArea => Box::new(LargestArea),
        }
    }
}
