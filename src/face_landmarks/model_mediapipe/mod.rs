use std::sync::Arc;

use nalgebra::Vector2;
use ndarray::ArrayD;

use crate::config::MeshConfig;
use crate::crop::{CropOptions, CropTransform};
use crate::face_detection::DetectionBox;
use crate::face_landmarks::{decode_landmarks, FaceLandmarksModel, MeshResult, NUM_LANDMARKS};
use crate::frame::{Frame, Resampler};
use crate::inference::{output_with_len, sigmoid, tile_to_tensor, InputRange, ModelRunner};
use crate::{Error, Result};

/// MediaPipe face mesh regressor.
///
/// Crops the face box levelled by its eye anchors and enlarged so the tile
/// covers the whole head, then maps the 468 mesh points back into the frame.
pub struct FaceMeshModel {
    runner: Box<dyn ModelRunner>,
    resampler: Arc<dyn Resampler>,
    input_size: u32,
    shift: Vector2<f32>,
    scale: Vector2<f32>,
    input_range: InputRange,
}

impl FaceMeshModel {
    pub fn new(
        runner: Box<dyn ModelRunner>,
        resampler: Arc<dyn Resampler>,
        config: &MeshConfig,
    ) -> Self {
        FaceMeshModel {
            runner,
            resampler,
            input_size: config.input_size,
            shift: Vector2::from(config.shift),
            scale: Vector2::from(config.scale),
            input_range: config.input_range,
        }
    }

    /// Crop around the face box made square in pixels along its longer side.
    pub fn crop(&self, frame: &Frame, face: &DetectionBox) -> Result<CropTransform> {
        let aspect = frame.aspect();
        CropTransform::build(
            &CropOptions::new(face.rect.square_long(aspect))
                .rotation(face.rotation(aspect))
                .shift(self.shift)
                .scale(self.scale)
                .orientation(frame.orientation)
                .aspect(aspect),
        )
    }

    /// Reads the mesh and its face flag from raw model outputs.
    pub fn decode(&self, outputs: &[ArrayD<f32>], transform: &CropTransform) -> Result<MeshResult> {
        // attention meshes append iris points after the 468 face points
        let landmarks = outputs
            .iter()
            .filter(|output| output.len() >= NUM_LANDMARKS * 3 && output.len() % 3 == 0)
            .max_by_key(|output| output.len())
            .ok_or_else(|| {
                Error::ModelRun(format!(
                    "no mesh output with at least {} values",
                    NUM_LANDMARKS * 3
                ))
            })?;
        let flag = output_with_len(outputs, 1, "face flag")?;

        let mut keypoints = decode_landmarks(landmarks, self.input_size, transform);
        keypoints.truncate(NUM_LANDMARKS);

        let logit = flag.iter().next().copied().unwrap_or(f32::NEG_INFINITY);
        let score = sigmoid(logit);

        Ok(MeshResult::new(keypoints, score))
    }
}

impl FaceLandmarksModel for FaceMeshModel {
    fn regress(&self, frame: &Frame, face: &DetectionBox) -> Result<MeshResult> {
        let transform = self.crop(frame, face)?;
        let tile = self
            .resampler
            .resample(frame, self.input_size, self.input_size, &transform)?;
        let input = tile_to_tensor(&tile, self.input_range)?;

        let outputs = self.runner.run(&input)?;
        let mesh = self.decode(&outputs, &transform)?;
        log::debug!("face mesh score {:.3}", mesh.score);

        Ok(mesh)
    }
}
