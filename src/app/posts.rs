use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;

use crate::app::reports::ReportService;
use crate::app::votes::VoteService;
use crate::domain::post::{Post, PostOrder};
use crate::domain::vote::TargetKind;
use crate::infra::db::Db;

const POST_COLUMNS: &str =
    "id, student_id, group_id, description, details, image, vote_count, created_at, updated_at";

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostFilter {
    pub group_id: Option<i64>,
    pub student_id: Option<i64>,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Returns `None` when the author is not a member of the group.
    pub async fn create_post(
        &self,
        student_id: i64,
        group_id: i64,
        description: String,
        details: Option<String>,
        image: Option<String>,
    ) -> Result<Option<Post>> {
        let query = format!(
            "INSERT INTO posts (student_id, group_id, description, details, image) \
             SELECT $1, $2, $3, $4, $5 \
             WHERE EXISTS ( \
                 SELECT 1 FROM student_groups WHERE student_id = $1 AND group_id = $2 \
             ) \
             RETURNING {}",
            POST_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .bind(group_id)
            .bind(description)
            .bind(details)
            .bind(image)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Newest-first lists page on `(created_at, id)`; top-voted lists are a
    /// single page.
    pub async fn list_posts(
        &self,
        filter: PostFilter,
        order: PostOrder,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let rows = match (order, cursor) {
            (PostOrder::Newest, Some((created_at, post_id))) => {
                let query = format!(
                    "SELECT {} FROM posts \
                     WHERE ($1::bigint IS NULL OR group_id = $1) \
                       AND ($2::bigint IS NULL OR student_id = $2) \
                       AND (created_at < $3 OR (created_at = $3 AND id < $4)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $5",
                    POST_COLUMNS
                );
                sqlx::query(&query)
                    .bind(filter.group_id)
                    .bind(filter.student_id)
                    .bind(created_at)
                    .bind(post_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
            (PostOrder::Newest, None) => {
                let query = format!(
                    "SELECT {} FROM posts \
                     WHERE ($1::bigint IS NULL OR group_id = $1) \
                       AND ($2::bigint IS NULL OR student_id = $2) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                    POST_COLUMNS
                );
                sqlx::query(&query)
                    .bind(filter.group_id)
                    .bind(filter.student_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
            (PostOrder::TopVoted, _) => {
                let query = format!(
                    "SELECT {} FROM posts \
                     WHERE ($1::bigint IS NULL OR group_id = $1) \
                       AND ($2::bigint IS NULL OR student_id = $2) \
                     ORDER BY vote_count DESC, id DESC \
                     LIMIT $3",
                    POST_COLUMNS
                );
                sqlx::query(&query)
                    .bind(filter.group_id)
                    .bind(filter.student_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        Ok(rows.iter().map(post_from_row).collect())
    }

    /// Only the author may edit. `vote_count` is never written here.
    pub async fn update_post(
        &self,
        post_id: i64,
        student_id: i64,
        description: Option<String>,
        details: Option<String>,
        image: Option<String>,
    ) -> Result<Option<Post>> {
        let query = format!(
            "UPDATE posts \
             SET description = COALESCE($3, description), \
                 details = COALESCE($4, details), \
                 image = COALESCE($5, image), \
                 updated_at = now() \
             WHERE id = $1 AND student_id = $2 \
             RETURNING {}",
            POST_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(post_id)
            .bind(student_id)
            .bind(description)
            .bind(details)
            .bind(image)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Deletes the post with its comments, and clears the vote ledger and
    /// reports of all of them.
    pub async fn delete_post(&self, post_id: i64, student_id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let owned: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM posts WHERE id = $1 AND student_id = $2 FOR UPDATE",
        )
        .bind(post_id)
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;

        if owned.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        // Casts lock their target row first, so holding these locks keeps any
        // new ledger row from landing on the thread before it is gone.
        let comment_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM comments WHERE post_id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        let votes = VoteService::new(self.db.clone());
        let purged = votes
            .purge_targets_with_tx(&mut tx, TargetKind::Post, &[post_id])
            .await?
            + votes
                .purge_targets_with_tx(&mut tx, TargetKind::Comment, &comment_ids)
                .await?;

        let reports = ReportService::new(self.db.clone());
        reports
            .purge_targets_with_tx(&mut tx, TargetKind::Post, &[post_id])
            .await?;
        reports
            .purge_targets_with_tx(&mut tx, TargetKind::Comment, &comment_ids)
            .await?;

        tx.commit().await?;
        tracing::debug!(post_id, comments = comment_ids.len(), purged_votes = purged, "post deleted");
        Ok(true)
    }
}

pub(crate) fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        student_id: row.get("student_id"),
        group_id: row.get("group_id"),
        description: row.get("description"),
        details: row.get("details"),
        image: row.get("image"),
        vote_count: row.get("vote_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
