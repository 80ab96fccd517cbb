//! In-process comparator: SCRFD detection + ArcFace embeddings.

use super::{Comparator, ComparatorConfig, ComparatorError, DistanceMetric};
use crate::detector::{DetectorError, FaceDetector, STRICT_CONFIDENCE};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, RawComparison};
use image::RgbImage;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Detection floor used when detection is not enforced.
const RELAXED_CONFIDENCE: f32 = 0.2;

#[derive(Error, Debug)]
pub enum OnnxLoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// ONNX Runtime sessions need exclusive access, so each model sits behind
/// its own lock. Requests still stage and decode in parallel.
pub struct OnnxComparator {
    config: ComparatorConfig,
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl OnnxComparator {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, metric: DistanceMetric) -> Result<Self, OnnxLoadError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;

        Ok(Self {
            config: ComparatorConfig::arcface(metric),
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }

    fn detection_floor(&self) -> f32 {
        if self.config.enforce_detection {
            STRICT_CONFIDENCE
        } else {
            RELAXED_CONFIDENCE
        }
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, ComparatorError> {
        lock(&self.detector, "detector")?
            .detect(image, self.detection_floor())
            .map_err(|e| ComparatorError::Internal(e.to_string()))
    }

    /// Best face in the image, embedded.
    fn embed(&self, path: &Path) -> Result<Embedding, ComparatorError> {
        let image = read_rgb(path)?;
        let face = self
            .detect(&image)?
            .into_iter()
            .next()
            .ok_or(ComparatorError::NoFaceDetected)?;

        if face.confidence <= STRICT_CONFIDENCE {
            tracing::debug!(
                confidence = face.confidence,
                path = %path.display(),
                "using low-confidence face (detection not enforced)"
            );
        }

        lock(&self.recognizer, "recognizer")?
            .extract(&image, &face)
            .map_err(|e| ComparatorError::Internal(e.to_string()))
    }
}

impl Comparator for OnnxComparator {
    fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    fn compare(&self, probe: &Path, reference: &Path) -> Result<RawComparison, ComparatorError> {
        let probe = self.embed(probe)?;
        let reference = self.embed(reference)?;
        Ok(raw_comparison(&self.config, &probe, &reference))
    }

    fn detect_faces(&self, image: &Path) -> Result<usize, ComparatorError> {
        let image = read_rgb(image)?;
        Ok(self.detect(&image)?.len())
    }
}

/// Matched iff the distance falls strictly below the threshold, so a match
/// always carries a positive confidence.
fn raw_comparison(config: &ComparatorConfig, a: &Embedding, b: &Embedding) -> RawComparison {
    let distance = match config.metric {
        DistanceMetric::Cosine => a.cosine_distance(b),
        DistanceMetric::EuclideanL2 => a.euclidean_l2_distance(b),
    } as f64;

    RawComparison {
        matched: distance < config.threshold,
        distance,
        threshold: config.threshold,
    }
}

fn read_rgb(path: &Path) -> Result<RgbImage, ComparatorError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| ComparatorError::Internal(format!("cannot read {}: {e}", path.display())))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ComparatorError> {
    mutex
        .lock()
        .map_err(|_| ComparatorError::Internal(format!("{what} lock poisoned")))
}
