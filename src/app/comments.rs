use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;

use crate::app::reports::ReportService;
use crate::app::votes::VoteService;
use crate::domain::comment::Comment;
use crate::domain::post::PostOrder;
use crate::domain::vote::TargetKind;
use crate::infra::db::Db;

const COMMENT_COLUMNS: &str =
    "id, student_id, post_id, parent_comment_id, content, vote_count, created_at, updated_at";

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

#[derive(Debug)]
pub enum NewComment {
    Created(Comment),
    PostNotFound,
    /// The parent is missing or belongs to another post.
    InvalidParent,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_comment(
        &self,
        student_id: i64,
        post_id: i64,
        parent_comment_id: Option<i64>,
        content: String,
    ) -> Result<NewComment> {
        let post_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(post_id)
                .fetch_one(self.db.pool())
                .await?;
        if !post_exists {
            return Ok(NewComment::PostNotFound);
        }

        if let Some(parent_id) = parent_comment_id {
            let parent_post: Option<i64> =
                sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(self.db.pool())
                    .await?;
            if parent_post != Some(post_id) {
                return Ok(NewComment::InvalidParent);
            }
        }

        let query = format!(
            "INSERT INTO comments (student_id, post_id, parent_comment_id, content) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            COMMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .bind(post_id)
            .bind(parent_comment_id)
            .bind(content)
            .fetch_one(self.db.pool())
            .await?;

        Ok(NewComment::Created(comment_from_row(&row)))
    }

    pub async fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        let query = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Comments on a post. With `parent_id` only the direct replies to that
    /// comment are listed.
    pub async fn list_comments(
        &self,
        post_id: i64,
        parent_id: Option<i64>,
        order: PostOrder,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Comment>> {
        let rows = match (order, cursor) {
            (PostOrder::Newest, Some((created_at, comment_id))) => {
                let query = format!(
                    "SELECT {} FROM comments \
                     WHERE post_id = $1 \
                       AND ($2::bigint IS NULL OR parent_comment_id = $2) \
                       AND (created_at < $3 OR (created_at = $3 AND id < $4)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $5",
                    COMMENT_COLUMNS
                );
                sqlx::query(&query)
                    .bind(post_id)
                    .bind(parent_id)
                    .bind(created_at)
                    .bind(comment_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
            (PostOrder::Newest, None) => {
                let query = format!(
                    "SELECT {} FROM comments \
                     WHERE post_id = $1 \
                       AND ($2::bigint IS NULL OR parent_comment_id = $2) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                    COMMENT_COLUMNS
                );
                sqlx::query(&query)
                    .bind(post_id)
                    .bind(parent_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
            (PostOrder::TopVoted, _) => {
                let query = format!(
                    "SELECT {} FROM comments \
                     WHERE post_id = $1 \
                       AND ($2::bigint IS NULL OR parent_comment_id = $2) \
                     ORDER BY vote_count DESC, id DESC \
                     LIMIT $3",
                    COMMENT_COLUMNS
                );
                sqlx::query(&query)
                    .bind(post_id)
                    .bind(parent_id)
                    .bind(limit)
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn update_comment(
        &self,
        comment_id: i64,
        student_id: i64,
        content: String,
    ) -> Result<Option<Comment>> {
        let query = format!(
            "UPDATE comments SET content = $3, updated_at = now() \
             WHERE id = $1 AND student_id = $2 \
             RETURNING {}",
            COMMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(comment_id)
            .bind(student_id)
            .bind(content)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Deletes the comment and every reply beneath it, with their ledger rows
    /// and reports.
    pub async fn delete_comment(&self, comment_id: i64, student_id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let owned: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM comments WHERE id = $1 AND student_id = $2 FOR UPDATE",
        )
        .bind(comment_id)
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;

        if owned.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        let subtree: Vec<i64> = sqlx::query_scalar(
            "WITH RECURSIVE thread AS ( \
                 SELECT id FROM comments WHERE id = $1 \
                 UNION ALL \
                 SELECT c.id FROM comments c JOIN thread t ON c.parent_comment_id = t.id \
             ) \
             SELECT c.id FROM comments c JOIN thread t ON t.id = c.id \
             FOR UPDATE OF c",
        )
        .bind(comment_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;

        let votes = VoteService::new(self.db.clone());
        votes
            .purge_targets_with_tx(&mut tx, TargetKind::Comment, &subtree)
            .await?;
        let reports = ReportService::new(self.db.clone());
        reports
            .purge_targets_with_tx(&mut tx, TargetKind::Comment, &subtree)
            .await?;

        tx.commit().await?;
        tracing::debug!(comment_id, removed = subtree.len(), "comment thread deleted");
        Ok(true)
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        student_id: row.get("student_id"),
        post_id: row.get("post_id"),
        parent_comment_id: row.get("parent_comment_id"),
        content: row.get("content"),
        vote_count: row.get("vote_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
