use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use time::OffsetDateTime;

use crate::domain::report::Report;
use crate::domain::vote::{TargetKind, VoteTarget};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct ReportService {
    db: Db,
}

impl ReportService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Files a pending report. Returns `None` when the target does not exist.
    pub async fn report(
        &self,
        student_id: i64,
        target: VoteTarget,
        reason: String,
    ) -> Result<Option<Report>> {
        let query = format!(
            "INSERT INTO reports (student_id, target_kind, target_id, reason) \
             SELECT $1, $2::target_kind, t.id, $4 FROM {} t WHERE t.id = $3 \
             RETURNING id, student_id, target_kind::text AS target_kind, target_id, reason, status, created_at, updated_at",
            target.kind.table()
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .bind(target.kind.as_db())
            .bind(target.id)
            .bind(reason)
            .fetch_optional(self.db.pool())
            .await?;

        let report = row.as_ref().map(report_from_row).transpose()?;
        if let Some(report) = &report {
            tracing::info!(
                report_id = report.id,
                student_id,
                target_kind = %target.kind,
                target_id = target.id,
                "report filed"
            );
        }
        Ok(report)
    }

    pub async fn list_reports(
        &self,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Report>> {
        let rows = match cursor {
            Some((created_at, report_id)) => {
                sqlx::query(
                    "SELECT id, student_id, target_kind::text AS target_kind, target_id, reason, status, created_at, updated_at \
                     FROM reports \
                     WHERE (created_at < $1 OR (created_at = $1 AND id < $2)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                )
                .bind(created_at)
                .bind(report_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, student_id, target_kind::text AS target_kind, target_id, reason, status, created_at, updated_at \
                     FROM reports \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            reports.push(report_from_row(&row)?);
        }

        Ok(reports)
    }

    pub async fn purge_targets_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: TargetKind,
        target_ids: &[i64],
    ) -> Result<u64> {
        if target_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "DELETE FROM reports WHERE target_kind = $1::target_kind AND target_id = ANY($2)",
        )
        .bind(kind.as_db())
        .bind(target_ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn purge_orphans_with_tx(&self, tx: &mut Transaction<'_, Postgres>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM reports r \
             WHERE (r.target_kind = 'post' AND NOT EXISTS (SELECT 1 FROM posts p WHERE p.id = r.target_id)) \
                OR (r.target_kind = 'comment' AND NOT EXISTS (SELECT 1 FROM comments c WHERE c.id = r.target_id))",
        )
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    let target_kind: String = row.get("target_kind");
    let target_kind = TargetKind::from_db(&target_kind)
        .ok_or_else(|| anyhow!("unknown target kind: {}", target_kind))?;

    Ok(Report {
        id: row.get("id"),
        student_id: row.get("student_id"),
        target_kind,
        target_id: row.get("target_id"),
        reason: row.get("reason"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
