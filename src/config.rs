//! Configuration of the tracking pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crop::FrameOrientation;
use crate::eye_landmarks::{EyeIndexPair, EyeSide};
use crate::face_detection::SelectionStrategy;
use crate::inference::InputRange;
use crate::{Error, Result};

/// Tracker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Model files and runtime settings
    pub models: ModelConfig,

    /// Face detector stage
    pub detection: DetectionConfig,

    /// Face mesh stage
    pub mesh: MeshConfig,

    /// Eye and iris stage
    pub iris: IrisConfig,

    /// Detect/track state machine
    pub tracking: TrackingConfig,

    /// Incoming frames
    pub frame: FrameConfig,
}

/// Model file paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the BlazeFace short-range ONNX model
    pub face_detector: PathBuf,

    /// Path to the face mesh ONNX model
    pub face_mesh: PathBuf,

    /// Path to the iris landmark ONNX model
    pub iris: PathBuf,

    /// Detector anchors as an `(n, 4)` `.npy` file; generated when absent
    pub anchors: Option<PathBuf>,

    /// Intra-op threads per ONNX Runtime session
    pub intra_threads: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Square detector input size in pixels
    pub input_size: u32,

    /// Minimum candidate score (0.0-1.0)
    pub score_threshold: f32,

    /// Which candidate becomes the tracked face
    pub selection: SelectionStrategy,

    pub input_range: InputRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub input_size: u32,

    /// Crop center offset in units of the scaled face box
    pub shift: [f32; 2],

    /// Face box growth so the tile covers the whole head
    pub scale: [f32; 2],

    /// Mesh score below which tracking falls back to detection (0.0-1.0)
    pub score_threshold: f32,

    pub input_range: InputRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrisConfig {
    pub input_size: u32,

    /// Crop center offset in units of the scaled eye region
    pub shift: [f32; 2],

    /// Eye region growth, for context around the eye
    pub scale: [f32; 2],

    pub input_range: InputRange,

    /// Mesh indices of the image-left eye's corners
    pub left_eye: [usize; 2],

    /// Mesh indices of the image-right eye's corners
    pub right_eye: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Derive the next face box from the mesh instead of re-running the detector
    pub use_landmark_to_detection: bool,

    /// Regress both eyes concurrently
    pub parallel_eyes: bool,
}

/// How incoming frames are stored relative to upright
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Clockwise rotation that makes a stored frame upright, a multiple of 90
    pub rotation_degrees: u32,

    pub mirror_horizontal: bool,

    pub mirror_vertical: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/face_detection_short_range.onnx"),
            face_mesh: PathBuf::from("assets/face_landmark.onnx"),
            iris: PathBuf::from("assets/iris_landmark.onnx"),
            anchors: None,
            intra_threads: 1,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_size: 128,
            score_threshold: 0.75,
            selection: SelectionStrategy::First,
            input_range: InputRange::MinusOneToOne,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            input_size: 192,
            shift: [0.0, 0.0],
            scale: [1.6, 1.6],
            score_threshold: 0.5,
            input_range: InputRange::ZeroToOne,
        }
    }
}

impl Default for IrisConfig {
    fn default() -> Self {
        Self {
            input_size: 64,
            shift: [0.0, 0.0],
            scale: [2.0, 2.0],
            input_range: InputRange::ZeroToOne,
            left_eye: [33, 133],
            right_eye: [362, 263],
        }
    }
}

impl IrisConfig {
    pub fn eye_indices(&self, side: EyeSide) -> EyeIndexPair {
        let [a, b] = match side {
            EyeSide::Left => self.left_eye,
            EyeSide::Right => self.right_eye,
        };
        (a, b)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            use_landmark_to_detection: true,
            parallel_eyes: false,
        }
    }
}

impl ModelConfig {
    /// Checks that every configured model file exists.
    pub fn check_files(&self) -> Result<()> {
        let anchors = self.anchors.iter().map(|p| ("anchors", p));
        for (what, path) in [
            ("face detector", &self.face_detector),
            ("face mesh", &self.face_mesh),
            ("iris", &self.iris),
        ]
        .into_iter()
        .chain(anchors)
        {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "{} file not found: {}",
                    what,
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

impl FrameConfig {
    pub fn orientation(&self) -> Result<FrameOrientation> {
        if self.rotation_degrees % 90 != 0 {
            return Err(Error::Config(format!(
                "frame rotation must be a multiple of 90 degrees, got {}",
                self.rotation_degrees
            )));
        }

        Ok(FrameOrientation {
            quarter_turns: ((self.rotation_degrees / 90) % 4) as u8,
            mirror_horizontal: self.mirror_horizontal,
            mirror_vertical: self.mirror_vertical,
        })
    }
}

impl TrackerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // thresholds
        if !(0.0..=1.0).contains(&self.detection.score_threshold) {
            return Err(Error::Config(
                "detection score threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mesh.score_threshold) {
            return Err(Error::Config(
                "mesh score threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        // tile sizes
        for (stage, size) in [
            ("detection", self.detection.input_size),
            ("mesh", self.mesh.input_size),
            ("iris", self.iris.input_size),
        ] {
            if size == 0 {
                return Err(Error::Config(format!(
                    "{} input size must be greater than 0",
                    stage
                )));
            }
        }

        // crop growth
        for (stage, scale) in [("mesh", self.mesh.scale), ("iris", self.iris.scale)] {
            if !scale.iter().all(|s| *s > 0.0 && s.is_finite()) {
                return Err(Error::Config(format!(
                    "{} scale must be positive, got {:?}",
                    stage, scale
                )));
            }
        }

        for side in EyeSide::BOTH {
            let (a, b) = self.iris.eye_indices(side);
            if a == b {
                return Err(Error::Config(format!(
                    "{:?} eye landmarks must be two distinct indices, got {}",
                    side, a
                )));
            }
        }

        if self.models.intra_threads < 1 {
            return Err(Error::Config(
                "intra_threads must be at least 1".to_string(),
            ));
        }

        self.frame.orientation()?;

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face mesh tracker configuration

models:
  face_detector: "assets/face_detection_short_range.onnx"
  face_mesh: "assets/face_landmark.onnx"
  iris: "assets/iris_landmark.onnx"
  intra_threads: 1

detection:
  input_size: 128
  score_threshold: 0.75
  selection: first
  input_range: minus_one_to_one

mesh:
  input_size: 192
  shift: [0.0, 0.0]
  scale: [1.6, 1.6]
  score_threshold: 0.5
  input_range: zero_to_one

iris:
  input_size: 64
  shift: [0.0, 0.0]
  scale: [2.0, 2.0]
  input_range: zero_to_one

tracking:
  use_landmark_to_detection: true
  parallel_eyes: false

frame:
  rotation_degrees: 0
  mirror_horizontal: false
  mirror_vertical: false
"#;
