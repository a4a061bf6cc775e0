//! Error types for the face mesh tracker.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// A region of interest or face box has no extent, so no invertible crop exists
    #[error("degenerate region of interest ({width} x {height})")]
    DegenerateRoi { width: f32, height: f32 },

    /// The model produced outputs this stage cannot decode
    #[error("model run failed: {0}")]
    ModelRun(String),

    /// A mesh landmark index is outside the mesh
    #[error("landmark index {index} out of range for mesh of {len} points")]
    LandmarkIndex { index: usize, len: usize },

    /// The affine warp of a frame into a model tile failed
    #[error("resampling failed: {0}")]
    Resample(String),

    /// `ONNX` Runtime error
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Anchor file could not be read
    #[error("npy error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
