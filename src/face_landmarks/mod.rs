pub mod model_mediapipe;

use ndarray::ArrayD;

use crate::crop::{CropTransform, NormalizedRect, Point2};
use crate::face_detection::DetectionBox;
use crate::frame::Frame;
use crate::{Error, Result};

pub type Point3 = nalgebra::Point3<f32>;

/// Number of points in the face mesh.
pub const NUM_LANDMARKS: usize = 468;

/// Mesh landmarks the tracker relies on. "Left" and "right" are image sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkPoint {
    LeftEyeOuter,
    LeftEyeInner,
    RightEyeInner,
    RightEyeOuter,
}

impl LandmarkPoint {
    pub fn index(&self) -> usize {
        match self {
            LandmarkPoint::LeftEyeOuter => 33,
            LandmarkPoint::LeftEyeInner => 133,
            LandmarkPoint::RightEyeInner => 362,
            LandmarkPoint::RightEyeOuter => 263,
        }
    }
}

/// Regresses the dense face mesh inside a detected face.
pub trait FaceLandmarksModel: Send + Sync {
    fn regress(&self, frame: &Frame, face: &DetectionBox) -> Result<MeshResult>;
}

/// Face mesh in normalized upright frame coordinates, `z` relative depth.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshResult {
    pub keypoints: Vec<Point3>,
    /// Face presence confidence in `[0, 1]`.
    pub score: f32,
}

impl MeshResult {
    pub fn new(keypoints: Vec<Point3>, score: f32) -> Self {
        Self { keypoints, score }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get_landmark(&self, index: usize) -> Result<Point3> {
        self.keypoints
            .get(index)
            .copied()
            .ok_or(Error::LandmarkIndex {
                index,
                len: self.keypoints.len(),
            })
    }

    pub fn get_point(&self, point: LandmarkPoint) -> Result<Point3> {
        self.get_landmark(point.index())
    }

    /// Axis-aligned bounds of all keypoints.
    pub fn bounding_rect(&self) -> Option<NormalizedRect> {
        let first = self.keypoints.first()?.xy();
        let (min, max) = self
            .keypoints
            .iter()
            .fold((first, first), |(min, max), p| (min.inf(&p.xy()), max.sup(&p.xy())));

        Some(NormalizedRect::from_min_max(min, max))
    }

    /// Builds next frame's face box from this mesh instead of running the detector.
    ///
    /// The box bounds the whole mesh; the outer eye corners become its anchors.
    pub fn to_detection(&self) -> Result<DetectionBox> {
        let left = self.get_point(LandmarkPoint::LeftEyeOuter)?;
        let right = self.get_point(LandmarkPoint::RightEyeOuter)?;
        let rect = self.bounding_rect().ok_or(Error::LandmarkIndex {
            index: 0,
            len: 0,
        })?;

        Ok(DetectionBox::new(rect, self.score, left.xy(), right.xy()))
    }
}

/// Maps raw `(x, y, z)` triples in tile pixels back to frame space.
pub(crate) fn decode_landmarks(
    raw: &ArrayD<f32>,
    tile_size: u32,
    transform: &CropTransform,
) -> Vec<Point3> {
    let scale = 1.0 / tile_size as f32;
    let values: Vec<f32> = raw.iter().copied().collect();

    values
        .chunks_exact(3)
        .map(|c| {
            let p = transform.tile_to_frame(&Point2::new(c[0] * scale, c[1] * scale));
            Point3::new(p.x, p.y, c[2] * scale)
        })
        .collect()
}
