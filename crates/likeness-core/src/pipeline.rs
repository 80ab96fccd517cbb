//! Verification orchestration.
//!
//! One [`Verifier`] serves every request; it holds no per-request state.
//! A verification runs availability → inputs → reference → decode →
//! stage + compare (+ cleanup) → normalize, and every failure leaves
//! through a [`VerifyError`] variant or a negative outcome.

use crate::artifact::{ArtifactError, StagingArea};
use crate::codec::{self, CodecError};
use crate::comparator::{ComparatorError, ComparatorHandle};
use crate::normalize::{normalize, round_confidence};
use crate::store::PhotoStore;
use crate::types::{DiagnosticsReport, EnrollmentReport, HealthReport, VerificationOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const MSG_VERIFIED: &str = "identity verified";
pub const MSG_NOT_RECOGNIZED: &str = "face not recognized";
pub const MSG_NO_FACE: &str = "no face detected; make sure your face is well lit and facing the camera";
pub const MSG_ENCODE_SKIPPED: &str = "skipped";
pub const MSG_FACE_FOUND: &str = "face detected";
pub const MSG_NO_FACE_IN_PHOTO: &str = "no face detected in this photo";

/// Default number of filenames listed by [`Verifier::diagnostics`].
pub const DEFAULT_SAMPLE_LIMIT: usize = 20;

/// Artifact name prefix for captured probes.
const PROBE_PREFIX: &str = "cap_";

#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    /// Base64 image, optionally prefixed with a media type (`data:...,`).
    pub captured_image: String,
    /// Reference photo identifier in the photo store.
    pub reference_photo: String,
    /// Opaque label used for logging and artifact naming.
    pub subject_id: String,
}

/// Display strings are safe to show callers; detail stays in the fields.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("captured image could not be decoded")]
    MalformedImage(#[source] CodecError),
    #[error("reference photo not found: {0}")]
    ReferenceNotFound(String),
    #[error("face comparison service unavailable")]
    ComparatorUnavailable,
    #[error("face comparison failed")]
    ComparatorInternal(String),
    #[error("captured image could not be staged")]
    Staging(#[from] ArtifactError),
}

pub struct Verifier {
    comparator: ComparatorHandle,
    store: Arc<dyn PhotoStore>,
    staging: StagingArea,
    sample_limit: usize,
}

impl Verifier {
    pub fn new(comparator: ComparatorHandle, store: Arc<dyn PhotoStore>, staging: StagingArea) -> Self {
        Self {
            comparator,
            store,
            staging,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    /// Decide whether the captured image shows the reference photo's subject.
    ///
    /// "No face" is a negative outcome, not an error. Nothing is staged
    /// unless the inputs are present, the reference exists and the probe
    /// decodes.
    pub fn verify(&self, request: &VerifyRequest) -> Result<VerificationOutcome, VerifyError> {
        let comparator = self.comparator.get().ok_or(VerifyError::ComparatorUnavailable)?;

        require(&request.captured_image, "capturedImage")?;
        require(&request.reference_photo, "referencePhoto")?;
        let reference = self.resolve(&request.reference_photo)?;

        let subject_id = request.subject_id.as_str();
        tracing::info!(subject_id, reference = %request.reference_photo, "verification requested");

        let probe = codec::decode(&request.captured_image).map_err(|e| {
            tracing::warn!(subject_id, error = %e, "captured image rejected");
            VerifyError::MalformedImage(e)
        })?;

        let hint = format!("{PROBE_PREFIX}{subject_id}");
        let compared = self
            .staging
            .with_temporary(&probe, &hint, |probe_path| comparator.compare(probe_path, &reference))?;

        match compared {
            Ok(raw) => {
                let confidence = round_confidence(normalize(raw.distance, raw.threshold));
                tracing::info!(
                    subject_id,
                    matched = raw.matched,
                    confidence,
                    distance = raw.distance,
                    threshold = raw.threshold,
                    "verification complete"
                );
                Ok(VerificationOutcome {
                    matched: raw.matched,
                    confidence,
                    message: if raw.matched { MSG_VERIFIED } else { MSG_NOT_RECOGNIZED }.to_string(),
                })
            }
            Err(ComparatorError::NoFaceDetected) => {
                tracing::warn!(subject_id, "no face detected");
                Ok(VerificationOutcome {
                    matched: false,
                    confidence: 0.0,
                    message: MSG_NO_FACE.to_string(),
                })
            }
            Err(ComparatorError::Internal(detail)) => {
                tracing::error!(subject_id, error = %detail, "comparator failed");
                Err(VerifyError::ComparatorInternal(detail))
            }
        }
    }

    /// Advisory check that a reference photo contains at least one face.
    ///
    /// Without a comparator the check is skipped and reported valid.
    /// Detection failures report `valid: false` instead of failing.
    pub fn check_has_face(&self, photo: &str) -> Result<EnrollmentReport, VerifyError> {
        let Some(comparator) = self.comparator.get() else {
            return Ok(EnrollmentReport {
                valid: true,
                faces_detected: None,
                message: MSG_ENCODE_SKIPPED.to_string(),
            });
        };

        require(photo, "photoFilename")?;
        let path = self.resolve(photo)?;

        let report = match comparator.detect_faces(&path) {
            Ok(0) => EnrollmentReport {
                valid: false,
                faces_detected: Some(0),
                message: MSG_NO_FACE_IN_PHOTO.to_string(),
            },
            Ok(count) => EnrollmentReport {
                valid: true,
                faces_detected: Some(count),
                message: MSG_FACE_FOUND.to_string(),
            },
            Err(e) => {
                tracing::warn!(photo, error = %e, "face detection failed on reference photo");
                EnrollmentReport {
                    valid: false,
                    faces_detected: None,
                    message: MSG_NO_FACE_IN_PHOTO.to_string(),
                }
            }
        };
        Ok(report)
    }

    pub fn health(&self) -> HealthReport {
        let comparator_available = self.comparator.is_available();
        HealthReport {
            status: if comparator_available { "ok" } else { "degraded" }.to_string(),
            comparator_available,
            reference_store_reachable: self.store.is_reachable(),
            reference_count: self.store.list().len(),
        }
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        let names = self.store.list();
        DiagnosticsReport {
            comparator_available: self.comparator.is_available(),
            reference_store_reachable: self.store.is_reachable(),
            total_count: names.len(),
            sample_filenames: names.into_iter().take(self.sample_limit).collect(),
            comparator: self.comparator.get().map(|c| c.config().clone()),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, VerifyError> {
        self.store
            .path(name)
            .filter(|_| self.store.exists(name))
            .ok_or_else(|| VerifyError::ReferenceNotFound(name.to_string()))
    }
}

fn require(value: &str, field: &'static str) -> Result<(), VerifyError> {
    if value.trim().is_empty() {
        Err(VerifyError::MissingField { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedComparator;
    use crate::store::DirectoryPhotoStore;
    use crate::types::RawComparison;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        photos: TempDir,
        staging: TempDir,
    }

    impl Fixture {
        fn new(photos: &[&str]) -> Self {
            let fixture = Self { photos: TempDir::new().unwrap(), staging: TempDir::new().unwrap() };
            for name in photos {
                RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]))
                    .save(fixture.photos.path().join(name))
                    .unwrap();
            }
            fixture
        }

        fn verifier(&self, comparator: ComparatorHandle) -> Verifier {
            Verifier::new(
                comparator,
                Arc::new(DirectoryPhotoStore::new(self.photos.path())),
                StagingArea::new(self.staging.path()),
            )
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.staging.path()).unwrap().count()
        }
    }

    fn captured_png() -> String {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([200, 150, 100])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }

    fn request(reference: &str) -> VerifyRequest {
        VerifyRequest {
            captured_image: captured_png(),
            reference_photo: reference.to_string(),
            subject_id: "42".to_string(),
        }
    }

    #[test]
    fn test_match_scenario() {
        let fx = Fixture::new(&["alice.jpg"]);
        let comparator = Arc::new(ScriptedComparator::returning(RawComparison {
            matched: true,
            distance: 0.25,
            threshold: 0.40,
        }));
        let verifier = fx.verifier(ComparatorHandle::Available(comparator.clone()));

        let outcome = verifier.verify(&request("alice.jpg")).unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.confidence, 0.375);
        assert_eq!(outcome.message, MSG_VERIFIED);

        let probes = comparator.probes();
        assert_eq!(probes.len(), 1);
        assert!(probes[0].existed, "probe must exist while compared");
        assert_eq!(probes[0].reference, fx.photos.path().join("alice.jpg"));
        assert!(probes[0].probe.file_name().unwrap().to_str().unwrap().starts_with("cap_42_"));
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_non_match_is_success_with_low_confidence() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::returning(
            RawComparison { matched: false, distance: 0.9, threshold: 0.6 },
        )));

        let outcome = verifier.verify(&request("alice.jpg")).unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.message, MSG_NOT_RECOGNIZED);
    }

    #[test]
    fn test_no_face_is_negative_outcome() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::no_face()));

        let outcome = verifier.verify(&request("alice.jpg")).unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.message.contains("no face"));
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_internal_failure_is_error_and_cleans_up() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier =
            fx.verifier(ComparatorHandle::available(ScriptedComparator::failing("onnx exploded")));

        let err = verifier.verify(&request("alice.jpg")).unwrap_err();
        assert!(matches!(&err, VerifyError::ComparatorInternal(d) if d == "onnx exploded"));
        assert!(!err.to_string().contains("onnx"));
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_missing_reference_stages_nothing() {
        let fx = Fixture::new(&["alice.jpg"]);
        let comparator = Arc::new(ScriptedComparator::returning(RawComparison {
            matched: true,
            distance: 0.0,
            threshold: 0.6,
        }));
        let verifier = fx.verifier(ComparatorHandle::Available(comparator.clone()));

        let err = verifier.verify(&request("bob.jpg")).unwrap_err();
        assert!(matches!(err, VerifyError::ReferenceNotFound(ref n) if n == "bob.jpg"));
        assert_eq!(fx.staged_files(), 0);
        assert_eq!(comparator.calls(), 0);
    }

    #[test]
    fn test_traversal_reference_is_not_found() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::matching(0.1)));
        let err = verifier.verify(&request("../alice.jpg")).unwrap_err();
        assert!(matches!(err, VerifyError::ReferenceNotFound(_)));
    }

    #[test]
    fn test_missing_fields() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::matching(0.1)));

        let mut req = request("alice.jpg");
        req.captured_image = "  ".into();
        assert!(matches!(
            verifier.verify(&req),
            Err(VerifyError::MissingField { field: "capturedImage" })
        ));

        let mut req = request("");
        req.reference_photo.clear();
        assert!(matches!(
            verifier.verify(&req),
            Err(VerifyError::MissingField { field: "referencePhoto" })
        ));
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_malformed_image_stages_nothing() {
        let fx = Fixture::new(&["alice.jpg"]);
        let comparator = Arc::new(ScriptedComparator::matching(0.1));
        let verifier = fx.verifier(ComparatorHandle::Available(comparator.clone()));

        let mut req = request("alice.jpg");
        req.captured_image = "data:image/png;base64,bm90IGFuIGltYWdl".into();
        assert!(matches!(verifier.verify(&req), Err(VerifyError::MalformedImage(_))));
        assert_eq!(comparator.calls(), 0);
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_staging_failure_skips_comparison() {
        let fx = Fixture::new(&["alice.jpg"]);
        let comparator = Arc::new(ScriptedComparator::matching(0.1));
        let verifier = Verifier::new(
            ComparatorHandle::Available(comparator.clone()),
            Arc::new(DirectoryPhotoStore::new(fx.photos.path())),
            StagingArea::new(fx.staging.path().join("missing")),
        );

        let err = verifier.verify(&request("alice.jpg")).unwrap_err();
        assert!(matches!(err, VerifyError::Staging(_)));
        assert!(!err.to_string().contains("missing"));
        assert_eq!(comparator.calls(), 0);
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_unavailable_comparator_short_circuits() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::unavailable("models missing"));

        // Even an empty request reports the degraded service first.
        assert!(matches!(
            verifier.verify(&VerifyRequest::default()),
            Err(VerifyError::ComparatorUnavailable)
        ));
        assert!(matches!(verifier.verify(&request("alice.jpg")), Err(VerifyError::ComparatorUnavailable)));
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn test_unavailable_comparator_skips_encode_check() {
        let fx = Fixture::new(&[]);
        let verifier = fx.verifier(ComparatorHandle::unavailable("models missing"));

        let report = verifier.check_has_face("anything.jpg").unwrap();
        assert!(report.valid);
        assert_eq!(report.faces_detected, None);
        assert_eq!(report.message, MSG_ENCODE_SKIPPED);
    }

    #[test]
    fn test_encode_check_counts_faces() {
        let fx = Fixture::new(&["alice.jpg"]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::with_faces(2)));

        let report = verifier.check_has_face("alice.jpg").unwrap();
        assert_eq!(report, EnrollmentReport {
            valid: true,
            faces_detected: Some(2),
            message: MSG_FACE_FOUND.to_string(),
        });
    }

    #[test]
    fn test_encode_check_zero_faces_and_failures_are_invalid() {
        let fx = Fixture::new(&["alice.jpg"]);

        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::with_faces(0)));
        let report = verifier.check_has_face("alice.jpg").unwrap();
        assert!(!report.valid);
        assert_eq!(report.faces_detected, Some(0));

        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::failing("boom")));
        let report = verifier.check_has_face("alice.jpg").unwrap();
        assert!(!report.valid);
        assert_eq!(report.message, MSG_NO_FACE_IN_PHOTO);
    }

    #[test]
    fn test_encode_check_missing_photo() {
        let fx = Fixture::new(&[]);
        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::with_faces(1)));

        assert!(matches!(verifier.check_has_face("ghost.jpg"), Err(VerifyError::ReferenceNotFound(_))));
        assert!(matches!(
            verifier.check_has_face(""),
            Err(VerifyError::MissingField { field: "photoFilename" })
        ));
    }

    #[test]
    fn test_health_and_diagnostics() {
        let fx = Fixture::new(&["a.jpg", "b.png", "c.jpeg"]);
        std::fs::write(fx.photos.path().join("readme.txt"), b"x").unwrap();

        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::matching(0.1)));
        let health = verifier.health();
        assert_eq!(health.status, "ok");
        assert!(health.comparator_available && health.reference_store_reachable);
        assert_eq!(health.reference_count, 3);

        let diag = fx
            .verifier(ComparatorHandle::unavailable("x"))
            .with_sample_limit(2)
            .diagnostics();
        assert!(!diag.comparator_available);
        assert_eq!(diag.total_count, 3);
        assert_eq!(diag.sample_filenames, vec!["a.jpg", "b.png"]);
        assert!(diag.comparator.is_none());

        let degraded = fx.verifier(ComparatorHandle::unavailable("x")).health();
        assert_eq!(degraded.status, "degraded");
    }

    #[test]
    fn test_health_and_diagnostics_count_webp_alike() {
        let fx = Fixture::new(&["a.jpg"]);
        std::fs::write(fx.photos.path().join("b.webp"), b"RIFF").unwrap();

        let verifier = fx.verifier(ComparatorHandle::available(ScriptedComparator::matching(0.1)));
        let health = verifier.health();
        let diag = verifier.diagnostics();
        assert_eq!(health.reference_count, 2);
        assert_eq!(diag.total_count, health.reference_count);
        assert_eq!(diag.sample_filenames, vec!["a.jpg", "b.webp"]);
    }
}
