use serde::{Deserialize, Serialize};

use crate::comparator::ComparatorConfig;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        (1.0 - self.similarity(other)).max(0.0)
    }

    /// Euclidean distance between the two vectors after L2 normalization.
    pub fn euclidean_l2_distance(&self, other: &Embedding) -> f32 {
        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let na = norm(&self.values);
        let nb = norm(&other.values);
        if na == 0.0 || nb == 0.0 {
            return 0.0;
        }

        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a / na - b / nb).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Raw comparator output. `distance` and `threshold` are only meaningful to
/// [`normalize`](crate::normalize::normalize).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawComparison {
    pub matched: bool,
    /// Non-negative dissimilarity score.
    pub distance: f64,
    /// Positive model-defined decision boundary.
    pub threshold: f64,
}

/// The only artifact returned to a verification caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    #[serde(rename = "match")]
    pub matched: bool,
    /// Relative confidence in [0, 1], rounded to 3 decimal places.
    pub confidence: f64,
    pub message: String,
}

/// Advisory result of checking a reference photo for a detectable face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faces_detected: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    pub comparator_available: bool,
    pub reference_store_reachable: bool,
    pub reference_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub comparator_available: bool,
    pub reference_store_reachable: bool,
    pub sample_filenames: Vec<String>,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<ComparatorConfig>,
}
