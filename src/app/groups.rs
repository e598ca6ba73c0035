use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;

use crate::app::reports::ReportService;
use crate::app::votes::VoteService;
use crate::domain::group::Group;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct GroupService {
    db: Db,
}

impl GroupService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_group(
        &self,
        name: String,
        description: String,
        is_default: bool,
    ) -> Result<Group> {
        let row = sqlx::query(
            "INSERT INTO groups (name, description, is_default) \
             VALUES ($1, $2, $3) \
             RETURNING id, name, description, is_default, created_at, updated_at",
        )
        .bind(name)
        .bind(description)
        .bind(is_default)
        .fetch_one(self.db.pool())
        .await?;

        Ok(group_from_row(&row))
    }

    pub async fn get_group(&self, group_id: i64) -> Result<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, description, is_default, created_at, updated_at \
             FROM groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }

    pub async fn list_groups(
        &self,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Group>> {
        let rows = match cursor {
            Some((created_at, group_id)) => {
                sqlx::query(
                    "SELECT id, name, description, is_default, created_at, updated_at \
                     FROM groups \
                     WHERE (created_at < $1 OR (created_at = $1 AND id < $2)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                )
                .bind(created_at)
                .bind(group_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, name, description, is_default, created_at, updated_at \
                     FROM groups \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(group_from_row).collect())
    }

    pub async fn update_group(
        &self,
        group_id: i64,
        name: Option<String>,
        description: Option<String>,
        is_default: Option<bool>,
    ) -> Result<Option<Group>> {
        let row = sqlx::query(
            "UPDATE groups \
             SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 is_default = COALESCE($4, is_default), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, description, is_default, created_at, updated_at",
        )
        .bind(group_id)
        .bind(name)
        .bind(description)
        .bind(is_default)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }

    /// Deleting a group cascades to its posts and their comments; the vote
    /// ledger and reports pointing at those are cleared in the same
    /// transaction.
    pub async fn delete_group(&self, group_id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let votes = VoteService::new(self.db.clone());
        let purged_votes = votes.purge_orphans_with_tx(&mut tx).await?;
        let reports = ReportService::new(self.db.clone());
        reports.purge_orphans_with_tx(&mut tx).await?;

        tx.commit().await?;
        tracing::info!(group_id, purged_votes, "group deleted");
        Ok(true)
    }
}

pub(crate) fn group_from_row(row: &PgRow) -> Group {
    Group {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
