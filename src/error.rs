use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

pub type TripResult<T> = Result<T, TripError>;

#[derive(Debug, Error)]
pub enum TripError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] sqlx::Error),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("otp does not match")]
    OtpMismatch,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not signed in")]
    Unauthorized,

    #[error("too many wrong otp attempts, retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },
}

impl TripError {
    pub fn kind(&self) -> &'static str {
        use TripError::*;
        match self {
            InvalidMessage(_) => "InvalidMessage",
            PersistenceFailure(_) => "PersistenceFailure",
            Forbidden(_) => "Forbidden",
            InvalidTransition(_) => "InvalidTransition",
            OtpMismatch => "OtpMismatch",
            NotFound(_) => "NotFound",
            Unauthorized => "Unauthorized",
            TooManyAttempts { .. } => "TooManyAttempts",
        }
    }

    pub fn status(&self) -> StatusCode {
        use TripError::*;
        match self {
            InvalidMessage(_) => StatusCode::BAD_REQUEST,
            PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Forbidden(_) => StatusCode::FORBIDDEN,
            InvalidTransition(_) => StatusCode::CONFLICT,
            OtpMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            NotFound(_) => StatusCode::NOT_FOUND,
            Unauthorized => StatusCode::UNAUTHORIZED,
            TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for TripError {
    fn into_response(self) -> Response {
        if let TripError::PersistenceFailure(err) = &self {
            tracing::error!(%err, "store unavailable");
        }
        (self.status(), Json(self.body())).into_response()
    }
}
