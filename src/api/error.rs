use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::models::ErrorResponse;
use crate::error::Error;

/// Client-facing error. Internal causes are logged, never returned.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal_error",
            message: "the service failed to answer the question".to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(message) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                kind: "invalid_request",
                message,
            },
            Error::Timeout { steps } => {
                tracing::warn!(steps, "request timed out");
                Self {
                    status: StatusCode::GATEWAY_TIMEOUT,
                    kind: "timeout",
                    message: "answering took too long".to_string(),
                }
            }
            other => {
                tracing::error!(error = %other, "request failed");
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let mut err = ApiError::from(Error::Validation(rejection.body_text()));
        if status.is_client_error() {
            err.status = status;
        }
        err
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        tracing::error!(error = %e, "decoding worker did not finish");
        Self::internal()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
