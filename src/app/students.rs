use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;

use crate::app::auth::hash_password;
use crate::app::reports::ReportService;
use crate::app::votes::VoteService;
use crate::domain::student::Student;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct StudentService {
    db: Db,
}

impl StudentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_student(&self, student_id: i64) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT id, name, email, created_at, updated_at \
             FROM students WHERE id = $1",
        )
        .bind(student_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(student_from_row))
    }

    pub async fn list_students(
        &self,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Student>> {
        let rows = match cursor {
            Some((created_at, student_id)) => {
                sqlx::query(
                    "SELECT id, name, email, created_at, updated_at \
                     FROM students \
                     WHERE (created_at < $1 OR (created_at = $1 AND id < $2)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                )
                .bind(created_at)
                .bind(student_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, name, email, created_at, updated_at \
                     FROM students \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(student_from_row).collect())
    }

    pub async fn update_student(
        &self,
        student_id: i64,
        name: Option<String>,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<Option<Student>> {
        let password_hash = match password {
            Some(password) => Some(hash_password(&password)?),
            None => None,
        };

        let row = sqlx::query(
            "UPDATE students \
             SET name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 password_hash = COALESCE($4, password_hash), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, email, created_at, updated_at",
        )
        .bind(student_id)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(student_from_row))
    }

    /// Withdraws the student's votes from every counter they touched, then
    /// deletes the student. Posts, comments and memberships cascade; ledger
    /// rows and reports left pointing at cascaded content are cleared.
    ///
    /// The student row is locked first. A cast still in flight holds a key
    /// share on it, so the lock waits for that cast to commit and the
    /// withdrawal sees its vote; casts that start later fail their foreign
    /// key check once the row is gone.
    pub async fn delete_student(&self, student_id: i64) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM students WHERE id = $1 FOR UPDATE")
                .bind(student_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        let votes = VoteService::new(self.db.clone());
        let withdrawn = votes.withdraw_voter_with_tx(&mut tx, student_id).await?;

        sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(student_id)
            .execute(&mut *tx)
            .await?;

        votes.purge_orphans_with_tx(&mut tx).await?;
        let reports = ReportService::new(self.db.clone());
        reports.purge_orphans_with_tx(&mut tx).await?;

        tx.commit().await?;
        tracing::info!(student_id, withdrawn_votes = withdrawn, "student deleted");
        Ok(true)
    }
}

pub(crate) fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
