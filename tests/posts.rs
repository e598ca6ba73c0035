//! Post CRUD, listing order, search and reports.

mod common;

use axum::http::{Method, StatusCode};
use campus::app::votes::VoteService;
use campus::domain::vote::VoteTarget;
use common::app;
use serde_json::json;

// ===========================================================================
// Creation
// ===========================================================================

#[tokio::test]
async fn create_post_as_member() {
    let app = app().await;
    let student = app.create_student("post_create").await;
    let group_id = app.create_group("post create group").await;
    app.join_group(student.id, group_id).await;

    let resp = app
        .post_json(
            "/api/posts",
            json!({
                "group_id": group_id,
                "description": "Lost umbrella in the library",
                "details": "Blue, second floor"
            }),
            Some(&student.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["student_id"], student.id);
    assert_eq!(body["group_id"], group_id);
    assert_eq!(body["vote_count"], 0);
    assert!(body["image"].is_null());
}

#[tokio::test]
async fn create_post_requires_membership() {
    let app = app().await;
    let student = app.create_student("post_nonmember").await;
    let group_id = app.create_group("post closed group").await;

    let resp = app
        .post_json(
            "/api/posts",
            json!({ "group_id": group_id, "description": "Hello?" }),
            Some(&student.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error_message(), "student is not a member of the group");
}

#[tokio::test]
async fn create_post_in_missing_group() {
    let app = app().await;
    let student = app.create_student("post_nogroup").await;

    let resp = app
        .post_json(
            "/api/posts",
            json!({ "group_id": 999999999, "description": "Anyone?" }),
            Some(&student.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_post_validates_fields() {
    let app = app().await;
    let student = app.create_student("post_validate").await;
    let group_id = app.create_group("post validate group").await;
    app.join_group(student.id, group_id).await;

    let resp = app
        .post_json(
            "/api/posts",
            json!({ "group_id": group_id, "description": "   " }),
            Some(&student.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post_json(
            "/api/posts",
            json!({ "group_id": group_id, "description": "d".repeat(1001) }),
            Some(&student.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "description must be at most 1000 characters");

    let resp = app
        .post_json(
            "/api/posts",
            json!({ "group_id": group_id, "description": "pic", "image": "i".repeat(256) }),
            Some(&student.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Reading, updating, deleting
// ===========================================================================

#[tokio::test]
async fn get_post() {
    let app = app().await;
    let student = app.create_student("post_get").await;
    let (post_id, _) = app.create_post_for(student.id, "post_get").await;

    let resp = app.get(&format!("/api/posts/{}", post_id), None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["id"], post_id);
}

#[tokio::test]
async fn get_missing_post() {
    let app = app().await;

    let resp = app.get("/api/posts/999999999", None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "post not found");
}

#[tokio::test]
async fn update_post_keeps_vote_count() {
    let app = app().await;
    let author = app.create_student("post_update_author").await;
    let voter = app.create_student("post_update_voter").await;
    let (post_id, _) = app.create_post_for(author.id, "post_update").await;

    VoteService::new(app.state.db.clone())
        .cast_vote(voter.id, VoteTarget::post(post_id), 1)
        .await
        .unwrap();

    let resp = app
        .patch_json(
            &format!("/api/posts/{}", post_id),
            json!({ "description": "Edited", "vote_count": 1000 }),
            Some(&author.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["description"], "Edited");
    assert_eq!(resp.json()["vote_count"], 1);
}

#[tokio::test]
async fn update_post_by_other_student() {
    let app = app().await;
    let author = app.create_student("post_update_owner").await;
    let other = app.create_student("post_update_other").await;
    let (post_id, _) = app.create_post_for(author.id, "post_update_other").await;

    let resp = app
        .patch_json(
            &format!("/api/posts/{}", post_id),
            json!({ "description": "Hijacked" }),
            Some(&other.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_post_by_owner_only() {
    let app = app().await;
    let author = app.create_student("post_delete_owner").await;
    let other = app.create_student("post_delete_other").await;
    let (post_id, _) = app.create_post_for(author.id, "post_delete").await;
    let path = format!("/api/posts/{}", post_id);

    let resp = app.delete(&path, Some(&other.access_token)).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.delete(&path, Some(&author.access_token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.get(&path, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Listing
// ===========================================================================

#[tokio::test]
async fn list_posts_newest_first_with_cursor() {
    let app = app().await;
    let author = app.create_student("post_list").await;
    let (first, group_id) = app.create_post_for(author.id, "post_list").await;
    let mut ids = vec![first];
    for _ in 0..2 {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (student_id, group_id, description) \
             VALUES ($1, $2, 'more') RETURNING id",
        )
        .bind(author.id)
        .bind(group_id)
        .fetch_one(app.pool())
        .await
        .unwrap();
        ids.push(id);
    }

    let resp = app
        .get(&format!("/api/posts?group_id={}&limit=2", group_id), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items[0]["id"], ids[2]);
    assert_eq!(items[1]["id"], ids[1]);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let resp = app
        .get(
            &format!("/api/posts?group_id={}&limit=2&cursor={}", group_id, cursor),
            None,
        )
        .await;
    let body = resp.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], ids[0]);
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn list_posts_sorted_by_votes() {
    let app = app().await;
    let author = app.create_student("post_sort_author").await;
    let a = app.create_student("post_sort_a").await;
    let b = app.create_student("post_sort_b").await;
    let (low, group_id) = app.create_post_for(author.id, "post_sort").await;
    let high: i64 = sqlx::query_scalar(
        "INSERT INTO posts (student_id, group_id, description) \
         VALUES ($1, $2, 'popular') RETURNING id",
    )
    .bind(author.id)
    .bind(group_id)
    .fetch_one(app.pool())
    .await
    .unwrap();
    let negative: i64 = sqlx::query_scalar(
        "INSERT INTO posts (student_id, group_id, description) \
         VALUES ($1, $2, 'unpopular') RETURNING id",
    )
    .bind(author.id)
    .bind(group_id)
    .fetch_one(app.pool())
    .await
    .unwrap();

    let votes = VoteService::new(app.state.db.clone());
    votes.cast_vote(a.id, VoteTarget::post(high), 1).await.unwrap();
    votes.cast_vote(b.id, VoteTarget::post(high), 1).await.unwrap();
    votes.cast_vote(a.id, VoteTarget::post(low), 1).await.unwrap();
    votes.cast_vote(a.id, VoteTarget::post(negative), -1).await.unwrap();

    let resp = app
        .get(&format!("/api/posts?group_id={}&sort_by_votes=true", group_id), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let order: Vec<i64> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![high, low, negative]);
    assert!(body["next_cursor"].is_null());

    let resp = app
        .get("/api/posts?sort_by_votes=true&cursor=2024-01-01T00:00:00Z/1", None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_posts_by_student() {
    let app = app().await;
    let author = app.create_student("post_by_student").await;
    let (post_id, _) = app.create_post_for(author.id, "post_by_student").await;

    let resp = app
        .get(&format!("/api/posts?student_id={}", author.id), None)
        .await;

    let body = resp.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], post_id);
}

#[tokio::test]
async fn search_posts() {
    let app = app().await;
    let author = app.create_student("post_search").await;
    let (_, group_id) = app.create_post_for(author.id, "post_search").await;
    sqlx::query(
        "INSERT INTO posts (student_id, group_id, description, details) \
         VALUES ($1, $2, 'Bike for sale', 'Barely ridden quokka-green frame')",
    )
    .bind(author.id)
    .bind(group_id)
    .execute(app.pool())
    .await
    .unwrap();

    let resp = app.get("/api/posts/search?query=QUOKKA", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    let items = resp.json();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["description"], "Bike for sale");
}

// ===========================================================================
// Reports
// ===========================================================================

#[tokio::test]
async fn report_post_and_list_as_admin() {
    let app = app().await;
    let author = app.create_student("post_report_author").await;
    let reporter = app.create_student("post_report_reporter").await;
    let (post_id, _) = app.create_post_for(author.id, "post_report").await;

    let resp = app
        .post_json(
            &format!("/api/posts/{}/report", post_id),
            json!({ "reason": "spam" }),
            Some(&reporter.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let report = resp.json();
    assert_eq!(report["target_kind"], "post");
    assert_eq!(report["target_id"], post_id);
    assert_eq!(report["status"], "pending");

    let resp = app.get("/api/reports", None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.admin(Method::GET, "/api/reports?limit=200", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.json()["items"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["id"] == report["id"]));
}

#[tokio::test]
async fn report_missing_post() {
    let app = app().await;
    let reporter = app.create_student("post_report_missing").await;

    let resp = app
        .post_json(
            "/api/posts/999999999/report",
            json!({ "reason": "spam" }),
            Some(&reporter.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "post not found");
}

#[tokio::test]
async fn report_requires_reason() {
    let app = app().await;
    let author = app.create_student("post_report_empty_a").await;
    let reporter = app.create_student("post_report_empty_r").await;
    let (post_id, _) = app.create_post_for(author.id, "post_report_empty").await;

    let resp = app
        .post_json(
            &format!("/api/posts/{}/report", post_id),
            json!({ "reason": "" }),
            Some(&reporter.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}
