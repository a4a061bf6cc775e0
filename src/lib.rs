//! Face tracking through a cascade of three landmark models.
//!
//! Each frame runs up to three stages:
//! 1. a BlazeFace detector locates the face (skipped while tracking),
//! 2. a face mesh model regresses 468 landmarks inside a levelled face crop,
//! 3. an iris model regresses eye contour and iris for each eye.
//!
//! Stages hand regions to one another in normalized upright frame coordinates.
//! Every model tile is cut with a [`crop::CropTransform`] and every model output
//! comes back through its inverse. While the mesh stays confident the next
//! frame's face box is derived from the mesh instead of re-running detection.
//!
//! ```no_run
//! use face_mesh_tracker::config::TrackerConfig;
//! use face_mesh_tracker::frame::Frame;
//! use face_mesh_tracker::tracking::FaceTracker;
//!
//! # fn main() -> face_mesh_tracker::Result<()> {
//! let mut tracker = FaceTracker::from_config(&TrackerConfig::default())?;
//! let frame = Frame::new(image::open("face.png")?.to_rgb8());
//! let result = tracker.process(&frame)?;
//! if let Some(eyes) = &result.eyes {
//!     println!("left iris at {:?}", eyes.left.iris_center());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crop;
pub mod error;
pub mod eye_landmarks;
pub mod face_detection;
pub mod face_landmarks;
pub mod frame;
pub mod inference;
pub mod tracking;

pub use error::{Error, Result};
