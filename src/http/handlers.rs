use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::app::auth::AuthService;
use crate::app::comments::{CommentService, NewComment};
use crate::app::groups::GroupService;
use crate::app::memberships::MembershipService;
use crate::app::posts::{PostFilter, PostService};
use crate::app::reports::ReportService;
use crate::app::search::SearchService;
use crate::app::students::StudentService;
use crate::app::votes::{CastVote, VoteError, VoteService};
use crate::domain::comment::Comment;
use crate::domain::group::{Group, Membership};
use crate::domain::post::{Post, PostOrder};
use crate::domain::report::Report;
use crate::domain::student::Student;
use crate::domain::vote::{Vote, VoteTarget};
use crate::http::error::{is_foreign_key_violation, is_unique_violation, INVALID_VOTE_VALUE};
use crate::http::{AdminToken, AppError, AuthStudent};
use crate::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_GROUP_DESCRIPTION_LEN: usize = 1000;
const MAX_POST_DESCRIPTION_LEN: usize = 1000;
const MAX_IMAGE_LEN: usize = 255;
const MAX_COMMENT_LEN: usize = 5000;
const MAX_REASON_LEN: usize = 1000;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, i64)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (timestamp, id) = cursor
        .rsplit_once('/')
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = id
        .parse::<i64>()
        .map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, i64)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn page_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            max
        )));
    }
    Ok(limit)
}

/// Services are asked for `limit + 1` rows; the extra row only signals that
/// another page exists.
fn into_page<T>(
    mut items: Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> (OffsetDateTime, i64),
) -> ListResponse<T> {
    let next_cursor = if items.len() > limit as usize {
        items.truncate(limit as usize);
        items.last().map(&key)
    } else {
        None
    };

    ListResponse {
        items,
        next_cursor: encode_cursor(next_cursor),
    }
}

fn require_self(auth: AuthStudent, student_id: i64) -> Result<(), AppError> {
    if auth.student_id != student_id {
        return Err(AppError::forbidden("students may only modify their own account"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), AppError> {
    let len = name.chars().count();
    if len < 2 || len > MAX_NAME_LEN {
        return Err(AppError::bad_request("name must be between 2 and 100 characters"));
    }
    if !name.chars().all(|ch| ch.is_alphabetic() || ch == ' ') {
        return Err(AppError::bad_request("name may only contain letters and spaces"));
    }
    Ok(())
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::bad_request("email cannot be empty"));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::bad_request("email must be at most 255 characters"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::bad_request("email is invalid")),
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }
    let has_letter = password.chars().any(|ch| ch.is_alphabetic());
    let has_digit = password.chars().any(|ch| ch.is_ascii_digit());
    let has_special = password.chars().any(|ch| !ch.is_alphanumeric());
    if !(has_letter && has_digit && has_special) {
        return Err(AppError::bad_request(
            "password must contain a letter, a digit and a special character",
        ));
    }
    Ok(())
}

fn validate_text(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

// Students

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub async fn register_student(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    let name = payload.name.trim().to_string();
    validate_name(&name)?;
    let email = normalize_email(&payload.email)?;
    validate_password(&payload.password)?;

    let service = AuthService::for_state(&state);
    let student = service
        .register(name, email, payload.password)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "students_email_key") {
                return AppError::conflict("a student with this email already exists");
            }
            tracing::error!(error = ?err, "failed to register student");
            AppError::internal("failed to register student")
        })?;

    Ok((StatusCode::CREATED, Json(student)))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    pub student: Student,
}

pub async fn verify_student(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }
    if payload.password.chars().count() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }
    let email = payload.email.trim().to_lowercase();

    let service = AuthService::for_state(&state);
    let verified = service
        .verify(&email, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to verify student");
            AppError::internal("failed to verify student")
        })?;

    match verified {
        Some((student, token)) => Ok(Json(VerifyResponse {
            access_token: token.token,
            access_expires_at: token.expires_at,
            student,
        })),
        None => Err(AppError::unauthorized("invalid credentials")),
    }
}

pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Student>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = StudentService::new(state.db.clone());
    let students = service
        .list_students(cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list students");
            AppError::internal("failed to list students")
        })?;

    Ok(Json(into_page(students, limit, |student| {
        (student.created_at, student.id)
    })))
}

pub async fn get_student(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Student>, AppError> {
    let service = StudentService::new(state.db.clone());
    let student = service.get_student(id).await.map_err(|err| {
        tracing::error!(error = ?err, student_id = id, "failed to fetch student");
        AppError::internal("failed to fetch student")
    })?;

    match student {
        Some(student) => Ok(Json(student)),
        None => Err(AppError::not_found("student not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn update_student(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<Json<Student>, AppError> {
    require_self(auth, id)?;

    let name = match payload.name {
        Some(name) => {
            let name = name.trim().to_string();
            validate_name(&name)?;
            Some(name)
        }
        None => None,
    };
    let email = payload.email.as_deref().map(normalize_email).transpose()?;
    if let Some(password) = &payload.password {
        validate_password(password)?;
    }

    let service = StudentService::new(state.db.clone());
    let student = service
        .update_student(id, name, email, payload.password)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "students_email_key") {
                return AppError::conflict("a student with this email already exists");
            }
            tracing::error!(error = ?err, student_id = id, "failed to update student");
            AppError::internal("failed to update student")
        })?;

    match student {
        Some(student) => Ok(Json(student)),
        None => Err(AppError::not_found("student not found")),
    }
}

pub async fn delete_student(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    require_self(auth, id)?;

    let service = StudentService::new(state.db.clone());
    let deleted = service.delete_student(id).await.map_err(|err| {
        tracing::error!(error = ?err, student_id = id, "failed to delete student");
        AppError::internal("failed to delete student")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("student not found"))
    }
}

#[derive(Serialize)]
pub struct StudentGroupItem {
    pub group: Group,
    pub is_subscribed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

pub async fn list_student_groups(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StudentGroupItem>>, AppError> {
    let students = StudentService::new(state.db.clone());
    let exists = students
        .get_student(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, student_id = id, "failed to fetch student");
            AppError::internal("failed to fetch student")
        })?
        .is_some();
    if !exists {
        return Err(AppError::not_found("student not found"));
    }

    let service = MembershipService::new(state.db.clone());
    let groups = service.list_groups_for_student(id).await.map_err(|err| {
        tracing::error!(error = ?err, student_id = id, "failed to list student groups");
        AppError::internal("failed to list student groups")
    })?;

    let items: Vec<StudentGroupItem> = groups
        .into_iter()
        .map(|edge| StudentGroupItem {
            group: edge.group,
            is_subscribed: edge.is_subscribed,
            joined_at: edge.joined_at,
        })
        .collect();

    Ok(Json(items))
}

// Groups

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
}

fn validate_group_name(name: &str) -> Result<(), AppError> {
    let len = name.chars().count();
    if len < 2 || len > MAX_NAME_LEN {
        return Err(AppError::bad_request("name must be between 2 and 100 characters"));
    }
    Ok(())
}

fn validate_group_description(description: &str) -> Result<(), AppError> {
    let len = description.chars().count();
    if len < 2 || len > MAX_GROUP_DESCRIPTION_LEN {
        return Err(AppError::bad_request(
            "description must be between 2 and 1000 characters",
        ));
    }
    Ok(())
}

pub async fn create_group(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), AppError> {
    let name = payload.name.trim().to_string();
    validate_group_name(&name)?;
    let description = payload.description.trim().to_string();
    validate_group_description(&description)?;

    let service = GroupService::new(state.db.clone());
    let group = service
        .create_group(name, description, payload.is_default)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "groups_name_key") {
                return AppError::conflict("a group with this name already exists");
            }
            tracing::error!(error = ?err, "failed to create group");
            AppError::internal("failed to create group")
        })?;

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Group>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = GroupService::new(state.db.clone());
    let groups = service.list_groups(cursor, limit + 1).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list groups");
        AppError::internal("failed to list groups")
    })?;

    Ok(Json(into_page(groups, limit, |group| (group.created_at, group.id))))
}

pub async fn get_group(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Group>, AppError> {
    let service = GroupService::new(state.db.clone());
    let group = service.get_group(id).await.map_err(|err| {
        tracing::error!(error = ?err, group_id = id, "failed to fetch group");
        AppError::internal("failed to fetch group")
    })?;

    match group {
        Some(group) => Ok(Json(group)),
        None => Err(AppError::not_found("group not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
}

pub async fn update_group(
    Path(id): Path<i64>,
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<UpdateGroupRequest>,
) -> Result<Json<Group>, AppError> {
    let name = payload.name.map(|name| name.trim().to_string());
    if let Some(name) = &name {
        validate_group_name(name)?;
    }
    let description = payload
        .description
        .map(|description| description.trim().to_string());
    if let Some(description) = &description {
        validate_group_description(description)?;
    }

    let service = GroupService::new(state.db.clone());
    let group = service
        .update_group(id, name, description, payload.is_default)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "groups_name_key") {
                return AppError::conflict("a group with this name already exists");
            }
            tracing::error!(error = ?err, group_id = id, "failed to update group");
            AppError::internal("failed to update group")
        })?;

    match group {
        Some(group) => Ok(Json(group)),
        None => Err(AppError::not_found("group not found")),
    }
}

pub async fn delete_group(
    Path(id): Path<i64>,
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = GroupService::new(state.db.clone());
    let deleted = service.delete_group(id).await.map_err(|err| {
        tracing::error!(error = ?err, group_id = id, "failed to delete group");
        AppError::internal("failed to delete group")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("group not found"))
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub limit: Option<i64>,
}

fn search_term(query: &SearchQuery) -> Result<(&str, i64), AppError> {
    let term = query.query.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(AppError::bad_request("search query is required"));
    }
    let limit = page_limit(query.limit, 20, 100)?;
    Ok((term, limit))
}

pub async fn search_groups(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Group>>, AppError> {
    let (term, limit) = search_term(&query)?;

    let service = SearchService::new(state.db.clone());
    let groups = service.search_groups(term, limit).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to search groups");
        AppError::internal("failed to search groups")
    })?;

    Ok(Json(groups))
}

pub async fn join_group(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Membership>), AppError> {
    let service = MembershipService::new(state.db.clone());
    let membership = service
        .join(auth.student_id, id)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "student_groups_member_key") {
                return AppError::conflict("student is already in the group");
            }
            tracing::error!(error = ?err, student_id = auth.student_id, group_id = id, "failed to join group");
            AppError::internal("failed to join group")
        })?;

    match membership {
        Some(membership) => Ok((StatusCode::CREATED, Json(membership))),
        None => Err(AppError::not_found("group not found")),
    }
}

pub async fn leave_group(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = MembershipService::new(state.db.clone());
    let left = service.leave(auth.student_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, student_id = auth.student_id, group_id = id, "failed to leave group");
        AppError::internal("failed to leave group")
    })?;

    if left {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("student is not in the group"))
    }
}

#[derive(Deserialize)]
pub struct SubscriptionRequest {
    pub is_subscribed: bool,
}

pub async fn update_subscription(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<SubscriptionRequest>,
) -> Result<Json<Membership>, AppError> {
    let service = MembershipService::new(state.db.clone());
    let membership = service
        .set_subscription(auth.student_id, id, payload.is_subscribed)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, student_id = auth.student_id, group_id = id, "failed to update subscription");
            AppError::internal("failed to update subscription")
        })?;

    match membership {
        Some(membership) => Ok(Json(membership)),
        None => Err(AppError::not_found("student is not in the group")),
    }
}

#[derive(Serialize)]
pub struct MemberItem {
    pub student: Student,
    pub is_subscribed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(skip)]
    membership_id: i64,
}

pub async fn list_group_members(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<MemberItem>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let cursor = parse_cursor(query.cursor)?;

    let groups = GroupService::new(state.db.clone());
    let exists = groups
        .get_group(id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, group_id = id, "failed to fetch group");
            AppError::internal("failed to fetch group")
        })?
        .is_some();
    if !exists {
        return Err(AppError::not_found("group not found"));
    }

    let service = MembershipService::new(state.db.clone());
    let members = service
        .list_members(id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, group_id = id, "failed to list members");
            AppError::internal("failed to list members")
        })?;

    let items: Vec<MemberItem> = members
        .into_iter()
        .map(|edge| MemberItem {
            student: edge.student,
            is_subscribed: edge.is_subscribed,
            joined_at: edge.joined_at,
            membership_id: edge.membership_id,
        })
        .collect();

    Ok(Json(into_page(items, limit, |member| {
        (member.joined_at, member.membership_id)
    })))
}

// Posts

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub group_id: Option<i64>,
    pub student_id: Option<i64>,
    #[serde(default)]
    pub sort_by_votes: bool,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// Top-voted lists are a single page; only newest-first lists hand out a
/// cursor.
fn ordered_cursor(
    order: PostOrder,
    cursor: Option<String>,
) -> Result<Option<(OffsetDateTime, i64)>, AppError> {
    match order {
        PostOrder::Newest => parse_cursor(cursor),
        PostOrder::TopVoted if cursor.is_some() => Err(AppError::bad_request(
            "cursor is not supported when sorting by votes",
        )),
        PostOrder::TopVoted => Ok(None),
    }
}

fn into_ordered_page<T>(
    items: Vec<T>,
    limit: i64,
    order: PostOrder,
    key: impl Fn(&T) -> (OffsetDateTime, i64),
) -> ListResponse<T> {
    let mut page = into_page(items, limit, key);
    if order == PostOrder::TopVoted {
        page.next_cursor = None;
    }
    page
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListResponse<Post>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let order = PostOrder::from_sort_by_votes(query.sort_by_votes);
    let cursor = ordered_cursor(order, query.cursor)?;
    let filter = PostFilter {
        group_id: query.group_id,
        student_id: query.student_id,
    };

    let service = PostService::new(state.db.clone());
    let posts = service
        .list_posts(filter, order, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    Ok(Json(into_ordered_page(posts, limit, order, |post| {
        (post.created_at, post.id)
    })))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub group_id: i64,
    pub description: String,
    pub details: Option<String>,
    pub image: Option<String>,
}

fn validate_image(image: &Option<String>) -> Result<(), AppError> {
    if let Some(image) = image {
        if image.chars().count() > MAX_IMAGE_LEN {
            return Err(AppError::bad_request("image must be at most 255 characters"));
        }
    }
    Ok(())
}

pub async fn create_post(
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_text("description", &payload.description, MAX_POST_DESCRIPTION_LEN)?;
    validate_image(&payload.image)?;

    let groups = GroupService::new(state.db.clone());
    let group = groups.get_group(payload.group_id).await.map_err(|err| {
        tracing::error!(error = ?err, group_id = payload.group_id, "failed to fetch group");
        AppError::internal("failed to fetch group")
    })?;
    if group.is_none() {
        return Err(AppError::not_found("group not found"));
    }

    let service = PostService::new(state.db.clone());
    let post = service
        .create_post(
            auth.student_id,
            payload.group_id,
            payload.description,
            payload.details,
            payload.image,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, student_id = auth.student_id, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    match post {
        Some(post) => Ok((StatusCode::CREATED, Json(post))),
        None => Err(AppError::forbidden("student is not a member of the group")),
    }
}

pub async fn get_post(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Post>, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service.get_post(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(AppError::not_found("post not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub description: Option<String>,
    pub details: Option<String>,
    pub image: Option<String>,
}

pub async fn update_post(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    if let Some(description) = &payload.description {
        validate_text("description", description, MAX_POST_DESCRIPTION_LEN)?;
    }
    validate_image(&payload.image)?;

    let service = PostService::new(state.db.clone());
    let post = service
        .update_post(
            id,
            auth.student_id,
            payload.description,
            payload.details,
            payload.image,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = id, "failed to update post");
            AppError::internal("failed to update post")
        })?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn delete_post(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone());
    let deleted = service.delete_post(id, auth.student_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = id, "failed to delete post");
        AppError::internal("failed to delete post")
    })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("post not found"))
    }
}

pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let (term, limit) = search_term(&query)?;

    let service = SearchService::new(state.db.clone());
    let posts = service.search_posts(term, limit).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to search posts");
        AppError::internal("failed to search posts")
    })?;

    Ok(Json(posts))
}

// Comments

#[derive(Deserialize)]
pub struct ListCommentsQuery {
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub sort_by_votes: bool,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_post_comments(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<ListCommentsQuery>,
) -> Result<Json<ListResponse<Comment>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let order = PostOrder::from_sort_by_votes(query.sort_by_votes);
    let cursor = ordered_cursor(order, query.cursor)?;

    let posts = PostService::new(state.db.clone());
    let post = posts.get_post(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    if post.is_none() {
        return Err(AppError::not_found("post not found"));
    }

    let service = CommentService::new(state.db.clone());
    let comments = service
        .list_comments(id, query.parent_id, order, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id = id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?;

    Ok(Json(into_ordered_page(comments, limit, order, |comment| {
        (comment.created_at, comment.id)
    })))
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub post_id: i64,
    pub parent_comment_id: Option<i64>,
    pub content: String,
}

pub async fn create_comment(
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    validate_text("content", &payload.content, MAX_COMMENT_LEN)?;

    let service = CommentService::new(state.db.clone());
    let created = service
        .create_comment(
            auth.student_id,
            payload.post_id,
            payload.parent_comment_id,
            payload.content,
        )
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                return AppError::not_found("post not found");
            }
            tracing::error!(error = ?err, student_id = auth.student_id, post_id = payload.post_id, "failed to create comment");
            AppError::internal("failed to create comment")
        })?;

    match created {
        NewComment::Created(comment) => Ok((StatusCode::CREATED, Json(comment))),
        NewComment::PostNotFound => Err(AppError::not_found("post not found")),
        NewComment::InvalidParent => Err(AppError::bad_request(
            "parent comment must belong to the same post",
        )),
    }
}

pub async fn get_comment(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Comment>, AppError> {
    let service = CommentService::new(state.db.clone());
    let comment = service.get_comment(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = id, "failed to fetch comment");
        AppError::internal("failed to fetch comment")
    })?;

    match comment {
        Some(comment) => Ok(Json(comment)),
        None => Err(AppError::not_found("comment not found")),
    }
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

pub async fn update_comment(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    validate_text("content", &payload.content, MAX_COMMENT_LEN)?;

    let service = CommentService::new(state.db.clone());
    let comment = service
        .update_comment(id, auth.student_id, payload.content)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = id, "failed to update comment");
            AppError::internal("failed to update comment")
        })?;

    match comment {
        Some(comment) => Ok(Json(comment)),
        None => Err(AppError::not_found("comment not found")),
    }
}

pub async fn delete_comment(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = CommentService::new(state.db.clone());
    let deleted = service
        .delete_comment(id, auth.student_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = id, "failed to delete comment");
            AppError::internal("failed to delete comment")
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("comment not found"))
    }
}

// Votes

/// `value` is read as raw JSON so that floats, strings and out-of-range
/// integers get the same 400 as any other value that is not 1 or -1.
#[derive(Deserialize)]
pub struct CastVoteRequest {
    #[serde(default)]
    pub value: serde_json::Value,
}

impl CastVoteRequest {
    fn value(&self) -> Result<i64, AppError> {
        self.value
            .as_i64()
            .ok_or_else(|| AppError::bad_request(INVALID_VOTE_VALUE))
    }
}

#[derive(Serialize)]
pub struct CastVoteResponse {
    pub vote: Vote,
    pub vote_count: i32,
    pub delta: i32,
}

impl From<CastVote> for CastVoteResponse {
    fn from(cast: CastVote) -> Self {
        Self {
            vote: cast.vote,
            vote_count: cast.vote_count,
            delta: cast.delta,
        }
    }
}

async fn cast_vote(
    state: &AppState,
    auth: AuthStudent,
    target: VoteTarget,
    value: i64,
) -> Result<Json<CastVoteResponse>, AppError> {
    let service = VoteService::new(state.db.clone());
    let cast = service.cast_vote(auth.student_id, target, value).await?;
    Ok(Json(cast.into()))
}

async fn my_vote(
    state: &AppState,
    auth: AuthStudent,
    target: VoteTarget,
) -> Result<Json<Vote>, AppError> {
    let service = VoteService::new(state.db.clone());
    let vote = service
        .get_vote(auth.student_id, target)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, student_id = auth.student_id, vote_target = %target, "failed to fetch vote");
            AppError::internal("failed to fetch vote")
        })?;

    match vote {
        Some(vote) => Ok(Json(vote)),
        None => Err(AppError::not_found("vote not found")),
    }
}

async fn target_votes(
    state: &AppState,
    target: VoteTarget,
    query: PaginationQuery,
) -> Result<Json<ListResponse<Vote>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = VoteService::new(state.db.clone());
    let exists = service.target_exists(target).await.map_err(|err| {
        tracing::error!(error = ?err, vote_target = %target, "failed to look up vote target");
        AppError::internal("failed to list votes")
    })?;
    if !exists {
        return Err(VoteError::TargetNotFound(target).into());
    }
    let votes = service
        .list_votes(target, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, vote_target = %target, "failed to list votes");
            AppError::internal("failed to list votes")
        })?;

    Ok(Json(into_page(votes, limit, |vote| (vote.updated_at, vote.id))))
}

pub async fn cast_post_vote(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<Json<CastVoteResponse>, AppError> {
    cast_vote(&state, auth, VoteTarget::post(id), payload.value()?).await
}

pub async fn cast_comment_vote(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<Json<CastVoteResponse>, AppError> {
    cast_vote(&state, auth, VoteTarget::comment(id), payload.value()?).await
}

pub async fn my_post_vote(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<Json<Vote>, AppError> {
    my_vote(&state, auth, VoteTarget::post(id)).await
}

pub async fn my_comment_vote(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
) -> Result<Json<Vote>, AppError> {
    my_vote(&state, auth, VoteTarget::comment(id)).await
}

pub async fn list_post_votes(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Vote>>, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service.get_post(id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;
    if post.is_none() {
        return Err(AppError::not_found("post not found"));
    }

    target_votes(&state, VoteTarget::post(id), query).await
}

pub async fn list_comment_votes(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Vote>>, AppError> {
    let service = CommentService::new(state.db.clone());
    let comment = service.get_comment(id).await.map_err(|err| {
        tracing::error!(error = ?err, comment_id = id, "failed to fetch comment");
        AppError::internal("failed to fetch comment")
    })?;
    if comment.is_none() {
        return Err(AppError::not_found("comment not found"));
    }

    target_votes(&state, VoteTarget::comment(id), query).await
}

// Reports

#[derive(Deserialize)]
pub struct ReportRequest {
    pub reason: String,
}

async fn file_report(
    state: &AppState,
    auth: AuthStudent,
    target: VoteTarget,
    reason: String,
) -> Result<(StatusCode, Json<Report>), AppError> {
    validate_text("reason", &reason, MAX_REASON_LEN)?;

    let service = ReportService::new(state.db.clone());
    let report = service
        .report(auth.student_id, target, reason.trim().to_string())
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, student_id = auth.student_id, vote_target = %target, "failed to file report");
            AppError::internal("failed to file report")
        })?;

    match report {
        Some(report) => Ok((StatusCode::CREATED, Json(report))),
        None => Err(AppError::not_found(format!("{} not found", target.kind))),
    }
}

pub async fn report_post(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    file_report(&state, auth, VoteTarget::post(id), payload.reason).await
}

pub async fn report_comment(
    Path(id): Path<i64>,
    auth: AuthStudent,
    State(state): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    file_report(&state, auth, VoteTarget::comment(id), payload.reason).await
}

pub async fn list_reports(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Report>>, AppError> {
    let limit = page_limit(query.limit, 30, 200)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = ReportService::new(state.db.clone());
    let reports = service
        .list_reports(cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list reports");
            AppError::internal("failed to list reports")
        })?;

    Ok(Json(into_page(reports, limit, |report| {
        (report.created_at, report.id)
    })))
}
