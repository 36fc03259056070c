//! Request-level error taxonomy.
//!
//! Every failure a request can hit maps to exactly one category, one HTTP
//! status and one error envelope (see [`crate::envelope`]).

use crate::engine::EngineError;
use crate::validate::ValidationError;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Body is not a JSON object (or is an empty one).
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AnalysisEngineFailure(#[from] EngineError),

    /// Only raised when persistence runs synchronously with the response.
    #[error("failed to persist analysis: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("failed to record feedback: {0:#}")]
    Feedback(#[source] anyhow::Error),

    /// A handler (or an engine it called) panicked.
    #[error("request handler panicked: {0}")]
    Panicked(String),
}

impl GatewayError {
    /// The `error` string of the envelope.
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "Invalid request",
            GatewayError::Validation(ValidationError::MissingFields { .. }) => {
                "Missing required fields"
            }
            GatewayError::Validation(_) => "Validation error",
            GatewayError::AnalysisEngineFailure(_)
            | GatewayError::Persistence(_)
            | GatewayError::Feedback(_)
            | GatewayError::Panicked(_) => "Internal server error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) | GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::AnalysisEngineFailure(_)
            | GatewayError::Persistence(_)
            | GatewayError::Feedback(_)
            | GatewayError::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Category name of the underlying server-side failure, `None` for client errors.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            GatewayError::AnalysisEngineFailure(e) => Some(e.kind()),
            GatewayError::Persistence(_) | GatewayError::Feedback(_) => Some("PersistenceFailure"),
            GatewayError::Panicked(_) => Some("HandlerPanic"),
            GatewayError::InvalidRequest(_) | GatewayError::Validation(_) => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}
