use axum::{routing::get, routing::patch, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn students() -> Router<AppState> {
    Router::new()
        .route(
            "/students",
            post(handlers::register_student).get(handlers::list_students),
        )
        .route("/students/verify", post(handlers::verify_student))
        .route(
            "/students/:id",
            get(handlers::get_student)
                .patch(handlers::update_student)
                .delete(handlers::delete_student),
        )
        .route("/students/:id/groups", get(handlers::list_student_groups))
}

pub fn groups() -> Router<AppState> {
    Router::new()
        .route(
            "/groups",
            get(handlers::list_groups).post(handlers::create_group),
        )
        .route("/groups/search", get(handlers::search_groups))
        .route(
            "/groups/:id",
            get(handlers::get_group)
                .patch(handlers::update_group)
                .delete(handlers::delete_group),
        )
        .route(
            "/groups/:id/join",
            post(handlers::join_group).delete(handlers::leave_group),
        )
        .route(
            "/groups/:id/subscription",
            patch(handlers::update_subscription),
        )
        .route("/groups/:id/members", get(handlers::list_group_members))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        .route("/posts/search", get(handlers::search_posts))
        .route(
            "/posts/:id",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route(
            "/posts/:id/votes",
            post(handlers::cast_post_vote).get(handlers::list_post_votes),
        )
        .route("/posts/:id/votes/me", get(handlers::my_post_vote))
        .route("/posts/:id/report", post(handlers::report_post))
        .route("/posts/:id/comments", get(handlers::list_post_comments))
}

pub fn comments() -> Router<AppState> {
    Router::new()
        .route("/comments", post(handlers::create_comment))
        .route(
            "/comments/:id",
            get(handlers::get_comment)
                .patch(handlers::update_comment)
                .delete(handlers::delete_comment),
        )
        .route(
            "/comments/:id/votes",
            post(handlers::cast_comment_vote).get(handlers::list_comment_votes),
        )
        .route("/comments/:id/votes/me", get(handlers::my_comment_vote))
        .route("/comments/:id/report", post(handlers::report_comment))
}

pub fn reports() -> Router<AppState> {
    Router::new().route("/reports", get(handlers::list_reports))
}
