use likeness_core::{
    DiagnosticsReport, EnrollmentReport, HealthReport, VerificationOutcome, Verifier, VerifyError,
    VerifyRequest,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("worker task failed: {0}")]
    WorkerFailed(String),
}

/// Clone-safe handle that runs verifier work on the blocking pool.
///
/// Comparisons block on model inference or a remote call, so they never
/// run on the async executor. Each operation is bounded by `timeout`; an
/// expired operation keeps running in the background until it finishes,
/// and its staged artifact is removed then.
#[derive(Clone)]
pub struct EngineHandle {
    verifier: Arc<Verifier>,
    timeout: Duration,
}

impl EngineHandle {
    pub fn new(verifier: Arc<Verifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    pub async fn verify(&self, request: VerifyRequest) -> Result<VerificationOutcome, EngineError> {
        Ok(self.run("verify", move |v| v.verify(&request)).await??)
    }

    pub async fn check_has_face(&self, photo: String) -> Result<EnrollmentReport, EngineError> {
        Ok(self.run("encode", move |v| v.check_has_face(&photo)).await??)
    }

    pub async fn health(&self) -> Result<HealthReport, EngineError> {
        self.run("health", |v| v.health()).await
    }

    pub async fn diagnostics(&self) -> Result<DiagnosticsReport, EngineError> {
        self.run("diagnostics", |v| v.diagnostics()).await
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Verifier) -> T + Send + 'static,
    {
        let verifier = Arc::clone(&self.verifier);
        let task = tokio::task::spawn_blocking(move || f(&verifier));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "worker task failed");
                Err(EngineError::WorkerFailed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "operation timed out"
                );
                Err(EngineError::TimedOut(self.timeout))
            }
        }
    }
}
