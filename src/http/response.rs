//! Error responses.
//!
//! Every failure leaves the API as `{"error": <code>, "message": <text>}`.
//! Internal failures keep their details in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::blockchain::ChainError;
use crate::error::SettlementError;
use crate::payments::CallbackError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Callback(CallbackError),
    Settlement(SettlementError),
    BadRequest(String),
}

impl From<CallbackError> for ApiError {
    fn from(err: CallbackError) -> Self {
        ApiError::Callback(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Callback(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, e.code(), e.to_string())
            }
            ApiError::Callback(e) => (StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()),
            ApiError::Settlement(e) => settlement_parts(e),
        }
    }
}

fn settlement_parts(err: &SettlementError) -> (StatusCode, &'static str, String) {
    match err {
        SettlementError::RequestNotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        SettlementError::AlreadyRunning(_) => (StatusCode::CONFLICT, "already_running", err.to_string()),
        SettlementError::NotResumable { .. } | SettlementError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "not_resumable", err.to_string())
        }
        SettlementError::InvalidQuote(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.kind().as_str(), err.to_string())
        }
        SettlementError::Chain(ChainError::UnsupportedChain(_)) => {
            (StatusCode::BAD_REQUEST, "unsupported_chain", err.to_string())
        }
        SettlementError::Chain(ChainError::Unavailable(_)) => (
            StatusCode::BAD_GATEWAY,
            err.kind().as_str(),
            "chain RPC unavailable".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal error".to_string(),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        if status.is_server_error() {
            match &self {
                ApiError::Callback(CallbackError::Settlement(detail)) => {
                    tracing::error!(error = %detail, "Request failed")
                }
                ApiError::Settlement(e) => tracing::error!(error = %e, "Request failed"),
                _ => tracing::error!(error = %message, "Request failed"),
            }
        }
        (status, Json(ErrorBody { error, message })).into_response()
    }
}
