pub mod model_mediapipe;

use crate::crop::{NormalizedRect, Point2};
use crate::face_detection::DetectionBox;
use crate::face_landmarks::{LandmarkPoint, MeshResult, Point3};
use crate::frame::Frame;
use crate::{Error, Result};

pub const EYE_CONTOUR_POINTS: usize = 71;
pub const IRIS_POINTS: usize = 5;

/// Mesh indices of the two corners bounding one eye, image-left corner first.
pub type EyeIndexPair = (usize, usize);

/// Which eye, by image side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub const BOTH: [EyeSide; 2] = [EyeSide::Left, EyeSide::Right];

    pub fn index(&self) -> usize {
        match self {
            EyeSide::Left => 0,
            EyeSide::Right => 1,
        }
    }

    /// `+1` for the left eye, `-1` for the right one.
    pub fn sign(&self) -> f32 {
        match self {
            EyeSide::Left => 1.0,
            EyeSide::Right => -1.0,
        }
    }

    /// The eye corners of the 468-point mesh.
    pub fn default_indices(&self) -> EyeIndexPair {
        let (a, b) = match self {
            EyeSide::Left => (LandmarkPoint::LeftEyeOuter, LandmarkPoint::LeftEyeInner),
            EyeSide::Right => (LandmarkPoint::RightEyeInner, LandmarkPoint::RightEyeOuter),
        };
        (a.index(), b.index())
    }

    /// The right eye is flipped so both eyes reach the model in the same orientation.
    pub fn is_mirrored(&self) -> bool {
        matches!(self, EyeSide::Right)
    }
}

/// Eye contour and iris ring of one eye, in normalized upright frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeIrisResult {
    pub side: EyeSide,
    /// Square region the eye was cropped around.
    pub roi: NormalizedRect,
    pub eye_contour: Vec<Point3>,
    /// Iris center first, then four points on its boundary.
    pub iris: Vec<Point3>,
}

impl EyeIrisResult {
    pub fn iris_center(&self) -> Option<Point3> {
        self.iris.first().copied()
    }
}

/// Regresses eye contour and iris of one eye from the face mesh.
///
/// `eye` names the two mesh landmarks the eye region is built from and `side`
/// tells which image side they lie on.
pub trait EyeLandmarksModel: Send + Sync {
    fn regress(
        &self,
        frame: &Frame,
        eye: EyeIndexPair,
        face: &DetectionBox,
        mesh: &MeshResult,
        side: EyeSide,
    ) -> Result<EyeIrisResult>;
}

/// Pixel-square region centered between the two landmarks, as wide as their
/// larger axis-aligned separation in pixels.
pub fn eye_roi(mesh: &MeshResult, eye: EyeIndexPair, aspect: f32) -> Result<NormalizedRect> {
    let a = mesh.get_landmark(eye.0)?.xy();
    let b = mesh.get_landmark(eye.1)?.xy();

    let center = Point2::from((a.coords + b.coords) / 2.0);
    // in frame heights
    let extent = ((b.x - a.x) * aspect).abs().max((b.y - a.y).abs());
    if !(extent > 0.0) || !extent.is_finite() {
        return Err(Error::DegenerateRoi {
            width: extent,
            height: extent,
        });
    }

    Ok(NormalizedRect::square_around(center, extent, aspect))
}
