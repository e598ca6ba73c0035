use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::app::rate_limiter::RateLimiter;
use crate::config::rate_limits::RateAction;
use crate::http::{AppError, AuthStudent};
use crate::AppState;

/// Write actions counted per student.
pub fn student_action(method: &Method, path: &str) -> Option<RateAction> {
    if method != Method::POST {
        return None;
    }
    let path = path.strip_prefix("/api").unwrap_or(path);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["posts"] => Some(RateAction::Post),
        ["comments"] => Some(RateAction::Comment),
        ["posts" | "comments", _, "votes"] => Some(RateAction::Vote),
        ["posts" | "comments", _, "report"] => Some(RateAction::Report),
        _ => None,
    }
}

/// Unauthenticated actions counted per client IP.
pub fn ip_action(method: &Method, path: &str) -> Option<RateAction> {
    if method != Method::POST {
        return None;
    }
    let path = path.strip_prefix("/api").unwrap_or(path);

    match path.trim_end_matches('/') {
        "/students" => Some(RateAction::Signup),
        "/students/verify" => Some(RateAction::Verify),
        _ => None,
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    auth: Option<AuthStudent>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let action = student_action(request.method(), request.uri().path());

    // Unauthenticated requests fall through; the handler rejects them.
    if let (Some(action), Some(auth)) = (action, auth) {
        let limiter = RateLimiter::new(state.cache.clone(), state.rate_limits);
        let info = limiter
            .hit(&format!("student:{}", auth.student_id), action)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to check rate limit");
                AppError::internal("failed to check rate limit")
            })?;

        if info.limited {
            tracing::warn!(
                student_id = auth.student_id,
                action = action.as_str(),
                limit = info.limit,
                "rate limit exceeded"
            );
            return Err(AppError::rate_limited(format!(
                "rate limit exceeded for action: {}",
                action.as_str()
            )));
        }
    }

    Ok(next.run(request).await)
}

pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(action) = ip_action(request.method(), request.uri().path()) else {
        return Ok(next.run(request).await);
    };

    let ip = addr.ip().to_string();
    let limiter = RateLimiter::new(state.cache.clone(), state.rate_limits);
    let info = limiter
        .hit(&format!("ip:{}", ip), action)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check IP rate limit");
            AppError::internal("failed to check rate limit")
        })?;

    if info.limited {
        tracing::warn!(ip = %ip, action = action.as_str(), "IP rate limit exceeded");
        return Err(AppError::rate_limited(
            "too many attempts from your IP address, try again later",
        ));
    }

    Ok(next.run(request).await)
}
