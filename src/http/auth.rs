use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName};
use subtle::ConstantTimeEq;

use crate::app::auth::AuthService;
use crate::http::AppError;
use crate::AppState;

const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");

/// The student behind a valid `Authorization: Bearer` access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthStudent {
    pub student_id: i64,
}

/// Proof that the request carried the configured `x-admin-token`.
#[derive(Debug, Clone, Copy)]
pub struct AdminToken;

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AppError::unauthorized("invalid Authorization header")),
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthStudent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        match AuthService::for_state(state).authenticate_access_token(token) {
            Ok(Some(session)) => Ok(AuthStudent {
                student_id: session.student_id,
            }),
            Ok(None) => Err(AppError::unauthorized("invalid token")),
            Err(err) => {
                tracing::warn!(error = ?err, "rejected access token");
                Err(AppError::unauthorized("invalid token"))
            }
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(AppError::forbidden("admin token not configured"));
        };

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .map(|value| value.as_bytes())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if bool::from(provided.ct_eq(expected.as_bytes())) {
            Ok(AdminToken)
        } else {
            tracing::warn!("admin token mismatch");
            Err(AppError::forbidden("invalid admin token"))
        }
    }
}
