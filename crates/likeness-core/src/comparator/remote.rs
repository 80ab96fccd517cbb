//! Comparator backed by an external face service over HTTP.
//!
//! The service receives image paths (it shares the filesystem with this
//! process) and reports failures as free text, which is classified here
//! and nowhere else.

use super::{classify_failure, Comparator, ComparatorConfig, ComparatorError, DistanceMetric};
use crate::types::RawComparison;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("face service at {url} is not healthy (status {status})")]
    Unhealthy { url: String, status: u16 },
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    img1_path: &'a str,
    img2_path: &'a str,
    model_name: &'a str,
    detector_backend: &'a str,
    distance_metric: &'a str,
    enforce_detection: bool,
}

#[derive(Serialize)]
struct DetectBody<'a> {
    img_path: &'a str,
    detector_backend: &'a str,
    enforce_detection: bool,
}

#[derive(Deserialize)]
struct VerifyReply {
    verified: bool,
    distance: f64,
    threshold: f64,
}

#[derive(Deserialize)]
struct DetectReply {
    faces: usize,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

pub struct RemoteComparator {
    config: ComparatorConfig,
    base_url: String,
    client: Client,
}

impl RemoteComparator {
    /// Build the client and check `GET {base_url}/health` once.
    ///
    /// Uses a blocking client: call from a blocking context, not an async task.
    pub fn connect(
        base_url: &str,
        metric: DistanceMetric,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;

        let health_url = format!("{base_url}/health");
        let status = client.get(&health_url).send()?.status();
        if !status.is_success() {
            return Err(RemoteError::Unhealthy { url: health_url, status: status.as_u16() });
        }

        Ok(Self {
            config: ComparatorConfig::arcface(metric),
            base_url,
            client,
        })
    }

    fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<Response, ComparatorError> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .json(body)
            .send()
            .map_err(|e| ComparatorError::Internal(format!("{endpoint} request: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorReply>(&text)
            .map(|reply| reply.error)
            .unwrap_or(text);
        tracing::debug!(endpoint, status = status.as_u16(), %message, "face service failure");
        Err(classify_failure(&message))
    }
}

impl Comparator for RemoteComparator {
    fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    fn compare(&self, probe: &Path, reference: &Path) -> Result<RawComparison, ComparatorError> {
        let probe = probe.to_string_lossy();
        let reference = reference.to_string_lossy();
        let body = VerifyBody {
            img1_path: &probe,
            img2_path: &reference,
            model_name: &self.config.model,
            detector_backend: &self.config.detector,
            distance_metric: self.config.metric.as_str(),
            enforce_detection: self.config.enforce_detection,
        };

        let reply: VerifyReply = self
            .post("verify", &body)?
            .json()
            .map_err(|e| ComparatorError::Internal(format!("verify reply: {e}")))?;

        if !(reply.distance.is_finite() && reply.distance >= 0.0)
            || !(reply.threshold.is_finite() && reply.threshold > 0.0)
        {
            return Err(ComparatorError::Internal(format!(
                "verify reply out of contract: distance={}, threshold={}",
                reply.distance, reply.threshold
            )));
        }

        Ok(RawComparison {
            matched: reply.verified,
            distance: reply.distance,
            threshold: reply.threshold,
        })
    }

    fn detect_faces(&self, image: &Path) -> Result<usize, ComparatorError> {
        let path = image.to_string_lossy();
        let body = DetectBody {
            img_path: &path,
            detector_backend: &self.config.detector,
            enforce_detection: self.config.enforce_detection,
        };

        let reply: DetectReply = self
            .post("detect", &body)?
            .json()
            .map_err(|e| ComparatorError::Internal(format!("detect reply: {e}")))?;
        Ok(reply.faces)
    }
}
