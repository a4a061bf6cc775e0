//! The per-frame cascade and the detect/track state machine around it.

use std::sync::Arc;

use ort::Environment;

use crate::config::TrackerConfig;
use crate::eye_landmarks::model_mediapipe::IrisModel;
use crate::eye_landmarks::{EyeIndexPair, EyeIrisResult, EyeLandmarksModel, EyeSide};
use crate::face_detection::model_blazeface::{
    generate_anchors, load_anchors, BlazefaceModel, SHORT_RANGE_STRIDES,
};
use crate::face_detection::{CandidateSelector, DetectionBox, FaceDetectionModel};
use crate::face_landmarks::model_mediapipe::FaceMeshModel;
use crate::face_landmarks::{FaceLandmarksModel, MeshResult};
use crate::frame::{AffineResampler, Frame, FrameSource, Resampler};
use crate::inference::{ort_environment, OrtModelRunner};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPhase {
    /// The next frame runs the face detector.
    Detecting,
    /// The next frame reuses a face box derived from this frame's mesh.
    Tracking,
}

/// Detect/track phase plus the last mesh score seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingState {
    phase: TrackingPhase,
    last_score: Option<f32>,
    force_detection: bool,
}

impl TrackingState {
    pub fn new() -> Self {
        Self {
            phase: TrackingPhase::Detecting,
            last_score: None,
            force_detection: false,
        }
    }

    /// A state that never leaves [`TrackingPhase::Detecting`].
    pub fn always_detecting() -> Self {
        Self {
            force_detection: true,
            ..Self::new()
        }
    }

    pub fn phase(&self) -> TrackingPhase {
        self.phase
    }

    pub fn last_score(&self) -> Option<f32> {
        self.last_score
    }

    pub fn is_tracking(&self) -> bool {
        self.phase == TrackingPhase::Tracking
    }

    /// Nothing usable this frame; detect again next frame.
    pub fn on_no_detection(&mut self) {
        if self.phase != TrackingPhase::Detecting {
            log::debug!("tracking lost, back to detection");
        }
        self.phase = TrackingPhase::Detecting;
    }

    /// Records a mesh score and returns whether it is confident enough to keep.
    pub fn on_mesh_score(&mut self, score: f32, threshold: f32) -> bool {
        self.last_score = Some(score);
        let confident = score >= threshold;

        let next = if confident && !self.force_detection {
            TrackingPhase::Tracking
        } else {
            TrackingPhase::Detecting
        };
        if next != self.phase {
            log::debug!("{:?} -> {:?} (mesh score {:.3})", self.phase, next, score);
        }
        self.phase = next;

        confident
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::new()
    }
}

/// How far the cascade got on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No face, or no usable region; nothing but the outcome is reported.
    NoDetection,
    /// The mesh was computed but scored below threshold; eyes were skipped.
    LowConfidence,
    /// Face box, mesh and both eyes are available.
    Tracked,
}

/// Both eyes of one frame, by image side.
#[derive(Debug, Clone, PartialEq)]
pub struct EyePair {
    pub left: EyeIrisResult,
    pub right: EyeIrisResult,
}

impl EyePair {
    pub fn get(&self, side: EyeSide) -> &EyeIrisResult {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }
}

/// Everything the cascade produced for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub outcome: FrameOutcome,
    /// Phase after this frame, i.e. what the next frame will do.
    pub phase: TrackingPhase,
    /// Whether this frame's face box came from the detector rather than the previous mesh.
    pub detected: bool,
    pub face: Option<DetectionBox>,
    pub mesh: Option<MeshResult>,
    pub eyes: Option<EyePair>,
}

impl FrameResult {
    fn no_detection(phase: TrackingPhase, detected: bool) -> Self {
        Self {
            outcome: FrameOutcome::NoDetection,
            phase,
            detected,
            face: None,
            mesh: None,
            eyes: None,
        }
    }
}

/// Receives every frame's results, in order.
pub trait TrackingConsumer {
    fn consume(&mut self, frame: &Frame, result: &FrameResult);
}

/// Detector, mesh and iris models chained with tracking across frames.
pub struct FaceTracker {
    // dropped in reverse order of construction
    eye_model: Box<dyn EyeLandmarksModel>,
    mesh_model: Box<dyn FaceLandmarksModel>,
    selector: Box<dyn CandidateSelector>,
    detector: Box<dyn FaceDetectionModel>,
    _environment: Option<Arc<Environment>>,
    mesh_score_threshold: f32,
    use_landmark_to_detection: bool,
    parallel_eyes: bool,
    /// Mesh corners of each eye, by [`EyeSide::index`].
    eye_indices: [EyeIndexPair; 2],
    state: TrackingState,
    /// Face box for the next frame, derived from the last confident mesh.
    basis: Option<DetectionBox>,
}

impl FaceTracker {
    /// Builds a tracker around already constructed stages.
    pub fn with_models(
        detector: Box<dyn FaceDetectionModel>,
        mesh_model: Box<dyn FaceLandmarksModel>,
        eye_model: Box<dyn EyeLandmarksModel>,
        config: &TrackerConfig,
    ) -> Self {
        let state = if config.tracking.use_landmark_to_detection {
            TrackingState::new()
        } else {
            TrackingState::always_detecting()
        };

        FaceTracker {
            eye_model,
            mesh_model,
            selector: config.detection.selection.selector(),
            detector,
            _environment: None,
            mesh_score_threshold: config.mesh.score_threshold,
            use_landmark_to_detection: config.tracking.use_landmark_to_detection,
            parallel_eyes: config.tracking.parallel_eyes,
            eye_indices: EyeSide::BOTH.map(|side| config.iris.eye_indices(side)),
            state,
            basis: None,
        }
    }

    /// Loads the three ONNX models named in `config`.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        config.models.check_files()?;

        let environment = ort_environment()?;
        let resampler: Arc<dyn Resampler> = Arc::new(AffineResampler::default());
        let threads = config.models.intra_threads;

        let anchors = match &config.models.anchors {
            Some(path) => load_anchors(path)?,
            None => generate_anchors(config.detection.input_size, &SHORT_RANGE_STRIDES)?,
        };

        let detector = BlazefaceModel::new(
            Box::new(OrtModelRunner::from_file(
                &environment,
                "face detector",
                &config.models.face_detector,
                threads,
            )?),
            resampler.clone(),
            anchors,
            &config.detection,
        );
        let mesh_model = FaceMeshModel::new(
            Box::new(OrtModelRunner::from_file(
                &environment,
                "face mesh",
                &config.models.face_mesh,
                threads,
            )?),
            resampler.clone(),
            &config.mesh,
        );
        let eye_model = IrisModel::new(
            Box::new(OrtModelRunner::from_file(
                &environment,
                "iris",
                &config.models.iris,
                threads,
            )?),
            resampler,
            &config.iris,
        );

        let mut tracker = Self::with_models(
            Box::new(detector),
            Box::new(mesh_model),
            Box::new(eye_model),
            config,
        );
        tracker._environment = Some(environment);

        Ok(tracker)
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Forgets the tracked face; the next frame runs the detector.
    pub fn reset(&mut self) {
        self.basis = None;
        self.state.on_no_detection();
    }

    /// Runs the cascade on one frame.
    ///
    /// Missing faces, unusable regions and low mesh scores are reported through
    /// [`FrameOutcome`]; only model failures are returned as errors.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameResult> {
        let tracked = match self.basis.take() {
            Some(face) if self.state.is_tracking() => Some(face),
            _ => None,
        };
        let detected = tracked.is_none();

        let mut face = match tracked {
            Some(face) => face,
            None => {
                let candidates = self.detector.detect(frame)?;
                match self.selector.select(candidates) {
                    Some(face) => face,
                    None => {
                        log::debug!("no face detected");
                        self.state.on_no_detection();
                        return Ok(FrameResult::no_detection(self.state.phase(), true));
                    }
                }
            }
        };

        let mesh = match self.mesh_model.regress(frame, &face) {
            Ok(mesh) => mesh,
            Err(Error::DegenerateRoi { width, height }) => {
                log::warn!("degenerate face box {}x{}, skipping frame", width, height);
                self.state.on_no_detection();
                return Ok(FrameResult::no_detection(self.state.phase(), detected));
            }
            Err(e) => return Err(e),
        };

        if !self
            .state
            .on_mesh_score(mesh.score, self.mesh_score_threshold)
        {
            log::warn!("low face mesh confidence {:.3}", mesh.score);
            return Ok(FrameResult {
                outcome: FrameOutcome::LowConfidence,
                phase: self.state.phase(),
                detected,
                face: Some(face),
                mesh: Some(mesh),
                eyes: None,
            });
        }

        let eyes = match self.regress_eyes(frame, &face, &mesh) {
            Ok(eyes) => eyes,
            Err(Error::DegenerateRoi { width, height }) => {
                log::warn!("degenerate eye region {}x{}, skipping frame", width, height);
                self.state.on_no_detection();
                return Ok(FrameResult::no_detection(self.state.phase(), detected));
            }
            Err(e) => return Err(e),
        };
        for side in EyeSide::BOTH {
            face.set_eye_region(side, eyes.get(side).roi);
        }

        if self.use_landmark_to_detection {
            self.basis = Some(mesh.to_detection()?);
        }

        Ok(FrameResult {
            outcome: FrameOutcome::Tracked,
            phase: self.state.phase(),
            detected,
            face: Some(face),
            mesh: Some(mesh),
            eyes: Some(eyes),
        })
    }

    fn regress_eyes(
        &self,
        frame: &Frame,
        face: &DetectionBox,
        mesh: &MeshResult,
    ) -> Result<EyePair> {
        let model = &self.eye_model;
        let indices = self.eye_indices;
        let regress =
            |side: EyeSide| model.regress(frame, indices[side.index()], face, mesh, side);
        let (left, right) = if self.parallel_eyes {
            rayon::join(|| regress(EyeSide::Left), || regress(EyeSide::Right))
        } else {
            (regress(EyeSide::Left), regress(EyeSide::Right))
        };

        Ok(EyePair {
            left: left?,
            right: right?,
        })
    }

    /// Feeds every frame of `source` through the cascade into `consumer`.
    ///
    /// Returns the number of frames processed.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        consumer: &mut dyn TrackingConsumer,
    ) -> Result<usize> {
        let mut count = 0;
        while let Some(frame) = source.next_frame()? {
            let result = self.process(&frame)?;
            consumer.consume(&frame, &result);
            count += 1;
        }
        log::info!("processed {} frames", count);

        Ok(count)
    }
}
