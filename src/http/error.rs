use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::votes::VoteError;
use crate::domain::vote::TargetKind;

pub(crate) const INVALID_VOTE_VALUE: &str = "vote value must be 1 or -1";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::InvalidVoteValue(_) => Self::bad_request(INVALID_VOTE_VALUE),
            VoteError::TargetNotFound(target) => match target.kind {
                TargetKind::Post => Self::not_found("post not found"),
                TargetKind::Comment => Self::not_found("comment not found"),
            },
            VoteError::Persistence(err) => {
                tracing::error!(error = ?err, "failed to cast vote");
                Self::internal("failed to cast vote")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Postgres error code and constraint name behind a service error, if any.
pub(crate) fn db_violation(err: &anyhow::Error) -> Option<(String, String)> {
    let sqlx_err = err.downcast_ref::<sqlx::Error>()?;
    let db_err = sqlx_err.as_database_error()?;
    let code = db_err.code()?.into_owned();
    let constraint = db_err.constraint().unwrap_or_default().to_string();
    Some((code, constraint))
}

pub(crate) fn is_unique_violation(err: &anyhow::Error, constraint: &str) -> bool {
    matches!(db_violation(err), Some((code, name)) if code == "23505" && name == constraint)
}

pub(crate) fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    matches!(db_violation(err), Some((code, _)) if code == "23503")
}
