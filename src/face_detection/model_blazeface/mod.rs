use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use ndarray::prelude::*;
use ndarray_npy::ReadNpyExt;

use crate::config::DetectionConfig;
use crate::crop::{CropOptions, CropTransform, NormalizedRect, Point2};
use crate::face_detection::{DetectionBox, FaceDetectionModel};
use crate::frame::{Frame, Resampler};
use crate::inference::{sigmoid, tile_to_tensor, InputRange, ModelRunner};
use crate::{Error, Result};

/// Keypoints per detection: image-left eye, image-right eye, nose, mouth,
/// image-left ear, image-right ear.
pub const NUM_KEYPOINTS: usize = 6;

/// Values per raw box: center, size, then `NUM_KEYPOINTS` (x, y) pairs.
pub const BOX_VALUES: usize = 4 + 2 * NUM_KEYPOINTS;

/// Anchor strides of the short-range (front camera) face detector.
pub const SHORT_RANGE_STRIDES: [u32; 4] = [8, 16, 16, 16];

/// Generates SSD anchors with fixed anchor size, one row `[cx, cy, w, h]` each.
///
/// Consecutive layers sharing a stride share one feature map and contribute
/// two anchors per cell each.
pub fn generate_anchors(input_size: u32, strides: &[u32]) -> Result<Array2<f32>> {
    let mut values = Vec::new();

    let mut layer = 0;
    while layer < strides.len() {
        let stride = strides[layer];
        let mut per_cell = 0;
        while layer < strides.len() && strides[layer] == stride {
            per_cell += 2;
            layer += 1;
        }

        let feature_map = (input_size as f32 / stride as f32).ceil() as usize;
        for y in 0..feature_map {
            for x in 0..feature_map {
                let cx = (x as f32 + 0.5) / feature_map as f32;
                let cy = (y as f32 + 0.5) / feature_map as f32;
                for _ in 0..per_cell {
                    values.extend_from_slice(&[cx, cy, 1.0, 1.0]);
                }
            }
        }
    }

    Ok(Array2::from_shape_vec((values.len() / 4, 4), values)?)
}

/// Reads anchors from an `.npy` file of shape `(n, 4)`.
pub fn load_anchors<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let file = File::open(path)?;
    let anchors: Array2<f64> = ReadNpyExt::read_npy(file)?;
    if anchors.ncols() != 4 {
        return Err(Error::Config(format!(
            "anchors must have 4 columns, found {}",
            anchors.ncols()
        )));
    }

    // convert to f32
    Ok(anchors.map(|x| *x as f32))
}

pub struct BlazefaceModel {
    runner: Box<dyn ModelRunner>,
    resampler: Arc<dyn Resampler>,
    anchors: Array2<f32>,
    input_size: u32,
    score_threshold: f32,
    input_range: InputRange,
}

impl BlazefaceModel {
    pub fn new(
        runner: Box<dyn ModelRunner>,
        resampler: Arc<dyn Resampler>,
        anchors: Array2<f32>,
        config: &DetectionConfig,
    ) -> Self {
        BlazefaceModel {
            runner,
            resampler,
            anchors,
            input_size: config.input_size,
            score_threshold: config.score_threshold,
            input_range: config.input_range,
        }
    }

    /// Decodes raw boxes into tile-normalized `[ymin, xmin, ymax, xmax, kx0, ky0, ...]`.
    fn decode_boxes(&self, raw_boxes: &Array3<f32>) -> Array3<f32> {
        let anchors = &self.anchors;
        let scale = self.input_size as f32;

        let shape = raw_boxes.shape();
        let num_boxes = shape[1];

        let mut boxes = Array3::zeros(Ix3(shape[0], shape[1], shape[2]));

        for i in 0..num_boxes {
            let x_center = raw_boxes[[0, i, 0]] / scale * anchors[[i, 2]] + anchors[[i, 0]];
            let y_center = raw_boxes[[0, i, 1]] / scale * anchors[[i, 3]] + anchors[[i, 1]];

            let w = raw_boxes[[0, i, 2]] / scale * anchors[[i, 2]];
            let h = raw_boxes[[0, i, 3]] / scale * anchors[[i, 3]];

            boxes[[0, i, 0]] = y_center - h / 2.0; // ymin
            boxes[[0, i, 1]] = x_center - w / 2.0; // xmin
            boxes[[0, i, 2]] = y_center + h / 2.0; // ymax
            boxes[[0, i, 3]] = x_center + w / 2.0; // xmax

            for k in 0..NUM_KEYPOINTS {
                let offset = 4 + k * 2;
                boxes[[0, i, offset]] =
                    raw_boxes[[0, i, offset]] / scale * anchors[[i, 2]] + anchors[[i, 0]];
                boxes[[0, i, offset + 1]] =
                    raw_boxes[[0, i, offset + 1]] / scale * anchors[[i, 3]] + anchors[[i, 1]];
            }
        }

        boxes
    }

    /// Turns raw model outputs into candidates in frame space.
    ///
    /// Candidates below the score threshold are dropped; the rest keep model
    /// output order.
    pub fn decode(
        &self,
        outputs: &[ArrayD<f32>],
        transform: &CropTransform,
    ) -> Result<Vec<DetectionBox>> {
        let (scores, raw_boxes) = split_outputs(outputs)?;

        let num_boxes = raw_boxes.shape()[1];
        if scores.shape()[1] != num_boxes || self.anchors.nrows() != num_boxes {
            return Err(Error::ModelRun(format!(
                "detector produced {} boxes and {} scores for {} anchors",
                num_boxes,
                scores.shape()[1],
                self.anchors.nrows()
            )));
        }

        let boxes = self.decode_boxes(&raw_boxes);

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let score = sigmoid(scores[[0, i, 0]].clamp(-100.0, 100.0));
            if score < self.score_threshold {
                continue;
            }

            let a = transform.tile_to_frame(&Point2::new(boxes[[0, i, 1]], boxes[[0, i, 0]]));
            let b = transform.tile_to_frame(&Point2::new(boxes[[0, i, 3]], boxes[[0, i, 2]]));
            let rect = NormalizedRect::from_min_max(a.inf(&b), a.sup(&b));

            let keypoints: Vec<Point2> = (0..NUM_KEYPOINTS)
                .map(|k| {
                    let offset = 4 + k * 2;
                    transform.tile_to_frame(&Point2::new(
                        boxes[[0, i, offset]],
                        boxes[[0, i, offset + 1]],
                    ))
                })
                .collect();

            let face = DetectionBox::new(rect, score, keypoints[0], keypoints[1]);
            candidates.push(face.with_keypoints(keypoints));
        }

        Ok(candidates)
    }
}

impl FaceDetectionModel for BlazefaceModel {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        // pad to a square so faces keep their proportions
        let aspect = frame.aspect();
        let transform = CropTransform::build(
            &CropOptions::new(NormalizedRect::letterbox(aspect))
                .orientation(frame.orientation)
                .aspect(aspect),
        )?;
        let tile = self
            .resampler
            .resample(frame, self.input_size, self.input_size, &transform)?;
        let input = tile_to_tensor(&tile, self.input_range)?;

        let outputs = self.runner.run(&input)?;
        let candidates = self.decode(&outputs, &transform)?;
        log::debug!("face detector kept {} candidates", candidates.len());

        Ok(candidates)
    }
}

/// Gathers score and box outputs, concatenating split heads along the anchor axis.
fn split_outputs(outputs: &[ArrayD<f32>]) -> Result<(Array3<f32>, Array3<f32>)> {
    let mut scores = Vec::new();
    let mut boxes = Vec::new();
    for output in outputs {
        match output.shape() {
            [_, _, 1] => scores.push(output.view().into_dimensionality::<Ix3>()?),
            [_, _, BOX_VALUES] => boxes.push(output.view().into_dimensionality::<Ix3>()?),
            shape => {
                return Err(Error::ModelRun(format!(
                    "unexpected detector output shape {:?}",
                    shape
                )))
            }
        }
    }

    if scores.is_empty() || boxes.is_empty() {
        return Err(Error::ModelRun(
            "detector needs both score and box outputs".to_string(),
        ));
    }

    // concatenate results along the anchor axis
    let scores = ndarray::concatenate(Axis(1), &scores)?;
    let boxes = ndarray::concatenate(Axis(1), &boxes)?;

    Ok((scores, boxes))
}
