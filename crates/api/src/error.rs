//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_store::EventStoreError;
use order_saga::{NotifierError, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga operation error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::NotFound(_) => StatusCode::NOT_FOUND,
        SagaError::AlreadyExists(_)
        | SagaError::ConcurrencyConflict { .. }
        | SagaError::InvalidTransition { .. }
        | SagaError::InvalidLegTransition { .. } => StatusCode::CONFLICT,
        SagaError::NotifierTransport(_) => StatusCode::BAD_GATEWAY,
        SagaError::EventStore(_) | SagaError::Serialization(_) => {
            tracing::error!(error = %err, "saga operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

/// Failure while wiring the server at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("event store: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("participant client: {0}")]
    Participant(#[from] NotifierError),
}
