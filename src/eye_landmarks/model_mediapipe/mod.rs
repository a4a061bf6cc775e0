use std::sync::Arc;

use nalgebra::Vector2;
use ndarray::ArrayD;

use crate::config::IrisConfig;
use crate::crop::{CropOptions, CropTransform, NormalizedRect};
use crate::eye_landmarks::{
    eye_roi, EyeIndexPair, EyeIrisResult, EyeLandmarksModel, EyeSide, EYE_CONTOUR_POINTS,
    IRIS_POINTS,
};
use crate::face_detection::DetectionBox;
use crate::face_landmarks::{decode_landmarks, MeshResult};
use crate::frame::{Frame, Resampler};
use crate::inference::{output_with_len, tile_to_tensor, InputRange, ModelRunner};
use crate::Result;

/// MediaPipe iris landmark regressor, run once per eye.
pub struct IrisModel {
    runner: Box<dyn ModelRunner>,
    resampler: Arc<dyn Resampler>,
    input_size: u32,
    shift: Vector2<f32>,
    scale: Vector2<f32>,
    input_range: InputRange,
}

impl IrisModel {
    pub fn new(
        runner: Box<dyn ModelRunner>,
        resampler: Arc<dyn Resampler>,
        config: &IrisConfig,
    ) -> Self {
        IrisModel {
            runner,
            resampler,
            input_size: config.input_size,
            shift: Vector2::from(config.shift),
            scale: Vector2::from(config.scale),
            input_range: config.input_range,
        }
    }

    /// Crop around `roi`, levelled like the face and flipped for the mirrored side.
    pub fn crop(
        &self,
        frame: &Frame,
        face: &DetectionBox,
        roi: NormalizedRect,
        side: EyeSide,
    ) -> Result<CropTransform> {
        let mut shift = self.shift;
        if side.is_mirrored() {
            shift.x = -shift.x;
        }

        let aspect = frame.aspect();
        CropTransform::build(
            &CropOptions::new(roi)
                .rotation(face.rotation(aspect))
                .shift(shift)
                .scale(self.scale)
                .mirror(side.is_mirrored(), false)
                .orientation(frame.orientation)
                .aspect(aspect),
        )
    }

    /// Maps eye contour and iris outputs back through the (possibly mirrored) crop.
    pub fn decode(
        &self,
        outputs: &[ArrayD<f32>],
        transform: &CropTransform,
        roi: NormalizedRect,
        side: EyeSide,
    ) -> Result<EyeIrisResult> {
        let contour = output_with_len(outputs, EYE_CONTOUR_POINTS * 3, "eye contour")?;
        let iris = output_with_len(outputs, IRIS_POINTS * 3, "iris")?;

        Ok(EyeIrisResult {
            side,
            roi,
            eye_contour: decode_landmarks(contour, self.input_size, transform),
            iris: decode_landmarks(iris, self.input_size, transform),
        })
    }
}

impl EyeLandmarksModel for IrisModel {
    fn regress(
        &self,
        frame: &Frame,
        eye: EyeIndexPair,
        face: &DetectionBox,
        mesh: &MeshResult,
        side: EyeSide,
    ) -> Result<EyeIrisResult> {
        let roi = eye_roi(mesh, eye, frame.aspect())?;
        log::debug!("{:?} eye roi {:?}", side, roi);

        let transform = self.crop(frame, face, roi, side)?;
        let tile = self
            .resampler
            .resample(frame, self.input_size, self.input_size, &transform)?;
        let input = tile_to_tensor(&tile, self.input_range)?;

        let outputs = self.runner.run(&input)?;
        self.decode(&outputs, &transform, roi, side)
    }
}
