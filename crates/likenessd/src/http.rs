//! HTTP surface: health, diagnostics, encode check and verify.

use crate::engine::{EngineError, EngineHandle};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use likeness_core::{EnrollmentReport, VerificationOutcome, VerifyError, VerifyRequest};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const MSG_REFERENCE_NOT_FOUND: &str = "reference photo not found";
const MSG_TIMED_OUT: &str = "face verification timed out; please try again";
const MSG_INTERNAL: &str = "face verification failed; please try again";

/// `max_body_bytes` bounds request bodies; captured images arrive inline.
pub fn router(engine: EngineHandle, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/face/test", get(diagnostics_handler))
        .route("/api/face/encode", post(encode_handler))
        .route("/api/face/verify", post(verify_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Subject ids arrive as strings or as numeric user ids. Anything else is
/// kept as its JSON text; the id only labels logs and artifacts.
#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectId {
    Text(String),
    Number(serde_json::Number),
    Other(serde_json::Value),
}

impl SubjectId {
    fn into_label(self) -> String {
        match self {
            SubjectId::Text(s) => s,
            SubjectId::Number(n) => n.to_string(),
            SubjectId::Other(v) => v.to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct VerifyBody {
    #[serde(alias = "captured_image")]
    captured_image: String,
    #[serde(alias = "user_photo", alias = "reference_photo")]
    reference_photo: String,
    #[serde(alias = "user_id", alias = "subject_id")]
    subject_id: Option<SubjectId>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct EncodeBody {
    #[serde(alias = "photo_filename")]
    photo_filename: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Missing or unparsable bodies read as empty requests, so they surface
/// as missing-field errors.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    if body.is_empty() {
        return T::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unparsable request body; treating as empty");
        T::default()
    })
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Verify,
    Encode,
}

/// An engine failure on a given route, rendered with that route's body shape.
struct ApiError {
    route: Route,
    error: EngineError,
}

impl ApiError {
    fn verify(error: EngineError) -> Self {
        Self { route: Route::Verify, error }
    }

    fn encode(error: EngineError) -> Self {
        Self { route: Route::Encode, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.error {
            EngineError::Verify(VerifyError::MissingField { .. }) => {
                return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: self.error.to_string() }))
                    .into_response();
            }
            EngineError::Verify(VerifyError::ComparatorUnavailable) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody { error: self.error.to_string() }),
                )
                    .into_response();
            }
            EngineError::Verify(VerifyError::ReferenceNotFound(_)) => {
                (StatusCode::NOT_FOUND, MSG_REFERENCE_NOT_FOUND.to_string())
            }
            EngineError::Verify(e @ VerifyError::MalformedImage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            EngineError::Verify(VerifyError::ComparatorInternal(_) | VerifyError::Staging(_))
            | EngineError::WorkerFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL.to_string())
            }
            EngineError::TimedOut(_) => (StatusCode::GATEWAY_TIMEOUT, MSG_TIMED_OUT.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.error, status = status.as_u16(), "request failed");
        }

        match self.route {
            Route::Verify => (
                status,
                Json(VerificationOutcome { matched: false, confidence: 0.0, message }),
            )
                .into_response(),
            Route::Encode => (
                status,
                Json(EnrollmentReport { valid: false, faces_detected: None, message }),
            )
                .into_response(),
        }
    }
}

#[tracing::instrument(skip(engine))]
async fn health_handler(State(engine): State<EngineHandle>) -> Response {
    match engine.health().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: e.to_string() }),
        )
            .into_response(),
    }
}

#[tracing::instrument(skip(engine))]
async fn diagnostics_handler(State(engine): State<EngineHandle>) -> Response {
    match engine.diagnostics().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: e.to_string() }),
        )
            .into_response(),
    }
}

#[tracing::instrument(skip_all)]
async fn encode_handler(
    State(engine): State<EngineHandle>,
    body: Bytes,
) -> Result<Json<EnrollmentReport>, ApiError> {
    let body: EncodeBody = parse_body(&body);
    engine
        .check_has_face(body.photo_filename)
        .await
        .map(Json)
        .map_err(ApiError::encode)
}

#[tracing::instrument(skip_all)]
async fn verify_handler(
    State(engine): State<EngineHandle>,
    body: Bytes,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let body: VerifyBody = parse_body(&body);
    let request = VerifyRequest {
        captured_image: body.captured_image,
        reference_photo: body.reference_photo,
        subject_id: body.subject_id.map(SubjectId::into_label).unwrap_or_default(),
    };
    engine.verify(request).await.map(Json).map_err(ApiError::verify)
}
