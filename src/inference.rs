//! Model invocation: tiles in, raw output tensors out.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use ndarray::{Array, Array4, ArrayD, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{
    Environment, ExecutionProvider, GraphOptimizationLevel, LoggingLevel, Session,
    SessionBuilder, Value,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Runs one model on one input tensor.
///
/// Implementations treat the model as a pure function from a fixed-size NHWC
/// tile tensor to its output tensors, in model output order.
pub trait ModelRunner: Send + Sync {
    fn run(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>>;
}

/// Value range a model expects its input pixels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRange {
    ZeroToOne,
    MinusOneToOne,
}

impl InputRange {
    fn normalize(&self, value: u8) -> f32 {
        match self {
            InputRange::ZeroToOne => value as f32 / 255.0,
            InputRange::MinusOneToOne => value as f32 / 127.5 - 1.0,
        }
    }
}

/// Converts a tile to a `(1, height, width, 3)` tensor.
pub fn tile_to_tensor(tile: &RgbImage, range: InputRange) -> Result<Array4<f32>> {
    let data: Vec<f32> = tile
        .pixels()
        .flat_map(|p| p.0)
        .map(|v| range.normalize(v))
        .collect();

    Ok(Array::from_shape_vec(
        (1, tile.height() as usize, tile.width() as usize, 3),
        data,
    )?)
}

/// Shared `ONNX` Runtime environment for all model sessions.
pub fn ort_environment() -> Result<Arc<Environment>> {
    Ok(Environment::builder()
        .with_name("face_mesh_tracker")
        .with_log_level(LoggingLevel::Warning)
        .with_execution_providers([ExecutionProvider::CPU(Default::default())])
        .build()?
        .into_arc())
}

/// [`ModelRunner`] over an `ONNX` Runtime session.
///
/// The session is owned by the runner and released when the runner is dropped.
pub struct OrtModelRunner {
    name: String,
    session: Session,
}

impl OrtModelRunner {
    pub fn from_file<P: AsRef<Path>>(
        environment: &Arc<Environment>,
        name: &str,
        model_path: P,
        intra_threads: i16,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        log::info!("loading {} model from {}", name, model_path.display());

        let session = SessionBuilder::new(environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            name: name.to_string(),
            session,
        })
    }
}

impl ModelRunner for OrtModelRunner {
    fn run(&self, input: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let array: CowArray<f32, _> = CowArray::from(input.view().into_dyn());
        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        outputs
            .iter()
            .map(|output| -> Result<ArrayD<f32>> {
                let tensor: OrtOwnedTensor<f32, _> = output.try_extract()?;
                let owned = tensor.view().to_owned();
                Ok(owned)
            })
            .collect()
    }
}

impl Drop for OrtModelRunner {
    fn drop(&mut self) {
        log::debug!("releasing {} model session", self.name);
    }
}

/// Finds the single output with exactly `len` elements.
pub(crate) fn output_with_len<'a>(
    outputs: &'a [ArrayD<f32>],
    len: usize,
    what: &str,
) -> Result<&'a ArrayD<f32>> {
    let mut matching = outputs.iter().filter(|output| output.len() == len);
    match (matching.next(), matching.next()) {
        (Some(output), None) => Ok(output),
        (None, _) => Err(Error::ModelRun(format!(
            "no {} output with {} values among shapes {:?}",
            what,
            len,
            outputs.iter().map(|o| o.shape().to_vec()).collect::<Vec<_>>()
        ))),
        (Some(_), Some(_)) => Err(Error::ModelRun(format!(
            "ambiguous {} output: several outputs have {} values",
            what, len
        ))),
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
