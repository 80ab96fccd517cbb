//! likeness-core: face verification pipeline.
//!
//! Decodes a captured base64 image, stages it as a temporary file, compares
//! it with a stored reference photo and turns the raw distance into a
//! bounded confidence score. Comparison runs in-process (SCRFD detection +
//! ArcFace recognition via ONNX Runtime) or against a remote face service.

pub mod alignment;
pub mod artifact;
pub mod codec;
pub mod comparator;
pub mod detector;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod normalize;
pub mod pipeline;
pub mod recognizer;
pub mod store;
pub mod types;

use std::path::PathBuf;

pub use artifact::StagingArea;
pub use comparator::{Comparator, ComparatorConfig, ComparatorError, ComparatorHandle, DistanceMetric};
pub use pipeline::{Verifier, VerifyError, VerifyRequest};
pub use store::{DirectoryPhotoStore, PhotoStore};
pub use types::{
    BoundingBox, DiagnosticsReport, Embedding, EnrollmentReport, HealthReport, RawComparison,
    VerificationOutcome,
};

/// Default model location: `$XDG_DATA_HOME/likeness/models`, falling back
/// to `~/.local/share/likeness/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("likeness")
        .join("models")
}
