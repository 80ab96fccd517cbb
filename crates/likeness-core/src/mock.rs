//! Scripted comparator for tests. Enabled by `cfg(test)` or the `mock` feature.

use crate::comparator::{Comparator, ComparatorConfig, ComparatorError, DistanceMetric};
use crate::types::RawComparison;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type CompareFn = dyn Fn(&Path, &Path) -> Result<RawComparison, ComparatorError> + Send + Sync;

/// One observed `compare` call.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub probe: PathBuf,
    pub reference: PathBuf,
    /// Whether the staged probe file existed when the comparator saw it.
    pub existed: bool,
}

pub struct ScriptedComparator {
    config: ComparatorConfig,
    compare: Box<CompareFn>,
    faces: Result<usize, ComparatorError>,
    calls: AtomicUsize,
    probes: Mutex<Vec<ProbeRecord>>,
}

impl ScriptedComparator {
    /// Compare with `f`; report one face on detection.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Path, &Path) -> Result<RawComparison, ComparatorError> + Send + Sync + 'static,
    {
        Self {
            config: ComparatorConfig::arcface(DistanceMetric::Cosine),
            compare: Box::new(f),
            faces: Ok(1),
            calls: AtomicUsize::new(0),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Always return `raw`.
    pub fn returning(raw: RawComparison) -> Self {
        Self::from_fn(move |_, _| Ok(raw))
    }

    /// Report `distance` against the default cosine threshold.
    pub fn matching(distance: f64) -> Self {
        let threshold = DistanceMetric::Cosine.arcface_threshold();
        Self::returning(RawComparison {
            matched: distance < threshold,
            distance,
            threshold,
        })
    }

    pub fn no_face() -> Self {
        let mut comparator = Self::from_fn(|_, _| Err(ComparatorError::NoFaceDetected));
        comparator.faces = Ok(0);
        comparator
    }

    /// Fail both operations with an internal error.
    pub fn failing(detail: &str) -> Self {
        let detail = detail.to_string();
        let error = ComparatorError::Internal(detail.clone());
        let mut comparator =
            Self::from_fn(move |_, _| Err(ComparatorError::Internal(detail.clone())));
        comparator.faces = Err(error);
        comparator
    }

    pub fn with_faces(count: usize) -> Self {
        let mut comparator = Self::matching(0.1);
        comparator.faces = Ok(count);
        comparator
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> Vec<ProbeRecord> {
        self.probes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Comparator for ScriptedComparator {
    fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    fn compare(&self, probe: &Path, reference: &Path) -> Result<RawComparison, ComparatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut probes) = self.probes.lock() {
            probes.push(ProbeRecord {
                probe: probe.to_path_buf(),
                reference: reference.to_path_buf(),
                existed: probe.is_file(),
            });
        }
        (self.compare)(probe, reference)
    }

    fn detect_faces(&self, _image: &Path) -> Result<usize, ComparatorError> {
        self.faces.clone()
    }
}
