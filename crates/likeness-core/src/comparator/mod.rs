//! Face comparison capability.
//!
//! A [`Comparator`] takes two staged image paths and reports a raw distance
//! against its model-defined threshold. Implementations classify their own
//! failures into [`ComparatorError`]; callers never inspect error text.
//!
//! Availability is decided once at startup and carried by a
//! [`ComparatorHandle`] that is injected wherever comparisons happen.

pub mod onnx;
pub mod remote;

use crate::types::RawComparison;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use onnx::OnnxComparator;
pub use remote::RemoteComparator;

/// Cosine-distance decision boundary for ArcFace w600k_r50.
pub const ARCFACE_COSINE_THRESHOLD: f64 = 0.60;
/// The same boundary expressed as L2 distance between unit vectors:
/// `sqrt(2 * cosine)`.
pub const ARCFACE_EUCLIDEAN_L2_THRESHOLD: f64 = 1.0954;

/// Error text fragments the external face service uses for "no face".
const NO_FACE_MARKERS: [&str; 3] = ["Face could not be detected", "No face", "face could not"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparatorError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("comparator failure: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    EuclideanL2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }

    /// ArcFace decision boundary for this metric.
    pub fn arcface_threshold(&self) -> f64 {
        match self {
            DistanceMetric::Cosine => ARCFACE_COSINE_THRESHOLD,
            DistanceMetric::EuclideanL2 => ARCFACE_EUCLIDEAN_L2_THRESHOLD,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed comparator configuration. Not influenced by request input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparatorConfig {
    /// Embedding model identity.
    pub model: String,
    /// Face detection backend.
    pub detector: String,
    pub metric: DistanceMetric,
    /// When false, low-confidence detections are used instead of aborting.
    pub enforce_detection: bool,
    /// Distance at or above which two faces do not match.
    pub threshold: f64,
}

impl ComparatorConfig {
    /// ArcFace embeddings, SCRFD detection, detection enforcement off.
    pub fn arcface(metric: DistanceMetric) -> Self {
        Self {
            model: "ArcFace".to_string(),
            detector: "scrfd".to_string(),
            metric,
            enforce_detection: false,
            threshold: metric.arcface_threshold(),
        }
    }
}

/// A face detection and comparison capability.
///
/// Both operations block (model inference, file or network I/O).
pub trait Comparator: Send + Sync {
    fn config(&self) -> &ComparatorConfig;

    /// Compare the face in `probe` against the face in `reference`.
    fn compare(&self, probe: &Path, reference: &Path) -> Result<RawComparison, ComparatorError>;

    /// Count detectable faces in `image`, without comparison.
    fn detect_faces(&self, image: &Path) -> Result<usize, ComparatorError>;
}

/// Comparator availability, decided once at process start.
#[derive(Clone)]
pub enum ComparatorHandle {
    Available(Arc<dyn Comparator>),
    Unavailable { reason: String },
}

impl ComparatorHandle {
    pub fn available(comparator: impl Comparator + 'static) -> Self {
        Self::Available(Arc::new(comparator))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    /// Run `load` once and cache the outcome. A load failure is logged and
    /// leaves the service running in degraded mode.
    pub fn probe<C, E>(load: impl FnOnce() -> Result<C, E>) -> Self
    where
        C: Comparator + 'static,
        E: fmt::Display,
    {
        match load() {
            Ok(comparator) => {
                let config = comparator.config();
                tracing::info!(
                    model = %config.model,
                    detector = %config.detector,
                    metric = %config.metric,
                    enforce_detection = config.enforce_detection,
                    threshold = config.threshold,
                    "comparator available"
                );
                Self::available(comparator)
            }
            Err(e) => {
                tracing::warn!(error = %e, "comparator unavailable; verification disabled");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn get(&self) -> Option<&Arc<dyn Comparator>> {
        match self {
            Self::Available(c) => Some(c),
            Self::Unavailable { .. } => None,
        }
    }
}

impl fmt::Debug for ComparatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(c) => f.debug_tuple("Available").field(c.config()).finish(),
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

/// Classify free-form failure text from an external face service.
///
/// This is the only place error text is inspected.
pub fn classify_failure(message: &str) -> ComparatorError {
    if NO_FACE_MARKERS.iter().any(|marker| message.contains(marker)) {
        ComparatorError::NoFaceDetected
    } else {
        ComparatorError::Internal(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_no_face_strings() {
        for message in [
            "Face could not be detected in numpy array.Please confirm that the picture is a face photo or consider to set enforce_detection param to False.",
            "Exception while processing img1_path: Face could not be detected. Please confirm that the picture is a face photo",
            "No face detected in img2_path",
            "Detector says: face could not be found",
        ] {
            assert_eq!(classify_failure(message), ComparatorError::NoFaceDetected, "{message}");
        }
    }

    #[test]
    fn test_classify_other_failures_as_internal() {
        for message in [
            "Confirm that img1_path exists",
            "model weights could not be downloaded",
            "",
            "FACE COULD NOT BE DETECTED",
        ] {
            assert!(matches!(classify_failure(message), ComparatorError::Internal(_)), "{message}");
        }
    }

    #[test]
    fn test_arcface_config() {
        let cfg = ComparatorConfig::arcface(DistanceMetric::Cosine);
        assert_eq!(cfg.threshold, ARCFACE_COSINE_THRESHOLD);
        assert!(!cfg.enforce_detection);

        let l2 = ComparatorConfig::arcface(DistanceMetric::EuclideanL2);
        assert!((l2.threshold - (2.0 * ARCFACE_COSINE_THRESHOLD).sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let json = serde_json::to_value(ComparatorConfig::arcface(DistanceMetric::EuclideanL2)).unwrap();
        assert_eq!(json["metric"], "euclidean_l2");
        assert_eq!(json["enforceDetection"], false);
    }

    #[test]
    fn test_probe_failure_is_unavailable() {
        let handle = ComparatorHandle::probe(|| {
            Err::<crate::mock::ScriptedComparator, _>("model file not found: det_10g.onnx")
        });
        assert!(!handle.is_available());
        assert!(handle.get().is_none());
        match handle {
            ComparatorHandle::Unavailable { reason } => assert!(reason.contains("det_10g")),
            ComparatorHandle::Available(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_probe_success_is_available() {
        let handle = ComparatorHandle::probe(|| {
            Ok::<_, String>(crate::mock::ScriptedComparator::matching(0.1))
        });
        assert!(handle.is_available());
        assert_eq!(handle.get().unwrap().config().detector, "scrfd");
    }
}
