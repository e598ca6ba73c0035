use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
pub mod middleware;
mod routes;

pub use auth::{AdminToken, AuthStudent};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::health())
        .merge(routes::students())
        .merge(routes::groups())
        .merge(routes::posts())
        .merge(routes::comments())
        .merge(routes::reports())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::ip_rate_limit_middleware,
        ));

    Router::new().nest("/api", api).with_state(state)
}
