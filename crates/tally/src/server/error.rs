use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tally_core::CoreError;

// ==============================================================================
// Error Type
// ==============================================================================

#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAddress { .. } | CoreError::Config(_) => {
                Self::BadRequest(err.to_string())
            }
            CoreError::TxNotFound(txid) => Self::NotFound(format!("transaction not found: {txid}")),
            CoreError::Electrum(electrum) => {
                tracing::warn!(error = %electrum, "electrum request failed");
                Self::BadGateway(format!("electrum error: {electrum}"))
            }
            // The peer answered, but with something we could not decode.
            CoreError::InvalidTxData(message) => {
                Self::BadGateway(format!("invalid transaction data from peer: {message}"))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
