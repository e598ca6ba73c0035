use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::vote::{vote_delta, TargetKind, Votable, Vote, VoteTarget, VoteValue};
use crate::infra::db::Db;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("invalid vote value {0}: must be 1 or -1")]
    InvalidVoteValue(i64),
    #[error("{0} not found")]
    TargetNotFound(VoteTarget),
    #[error("vote persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// Result of a committed cast: the ledger row as stored, the target's counter
/// after the cast, and how far the counter moved.
#[derive(Debug, Clone)]
pub struct CastVote {
    pub vote: Vote,
    pub vote_count: i32,
    pub delta: i32,
}

#[derive(Clone)]
pub struct VoteService {
    db: Db,
}

impl VoteService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Records `voter_id`'s vote on `target` and reconciles the target's
    /// counter in one transaction.
    pub async fn cast_vote(
        &self,
        voter_id: i64,
        target: VoteTarget,
        value: i64,
    ) -> Result<CastVote, VoteError> {
        let value = VoteValue::try_from(value).map_err(VoteError::InvalidVoteValue)?;

        let mut tx = self.db.begin().await?;
        match self.cast_vote_with_tx(&mut tx, voter_id, target, value).await {
            Ok(cast) => {
                tx.commit().await?;
                tracing::debug!(
                    voter_id,
                    target_kind = %target.kind,
                    target_id = target.id,
                    value = value.as_i16(),
                    delta = cast.delta,
                    vote_count = cast.vote_count,
                    "vote cast"
                );
                Ok(cast)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = ?rollback_err, "failed to roll back vote transaction");
                }
                Err(err)
            }
        }
    }

    /// The cast-vote protocol against a caller-owned transaction. The target
    /// row is locked first so every cast on one target is serialized; the
    /// ledger row is read only after that lock is held.
    pub async fn cast_vote_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voter_id: i64,
        target: VoteTarget,
        value: VoteValue,
    ) -> Result<CastVote, VoteError> {
        let current = lock_target(tx, target)
            .await?
            .ok_or(VoteError::TargetNotFound(target))?;

        let existing = sqlx::query(
            "SELECT id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at \
             FROM votes \
             WHERE voter_id = $1 AND target_kind = $2::target_kind AND target_id = $3 \
             FOR UPDATE",
        )
        .bind(voter_id)
        .bind(target.kind.as_db())
        .bind(target.id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|row| vote_from_row(&row))
        .transpose()?;

        let delta = vote_delta(existing.as_ref().map(|vote| vote.value), value);

        let row = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO votes (voter_id, target_kind, target_id, value) \
                     VALUES ($1, $2::target_kind, $3, $4) \
                     RETURNING id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at",
                )
                .bind(voter_id)
                .bind(target.kind.as_db())
                .bind(target.id)
                .bind(value.as_i16())
                .fetch_one(&mut **tx)
                .await?
            }
            Some(vote) => {
                sqlx::query(
                    "UPDATE votes SET value = $2, updated_at = now() \
                     WHERE id = $1 \
                     RETURNING id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at",
                )
                .bind(vote.id)
                .bind(value.as_i16())
                .fetch_one(&mut **tx)
                .await?
            }
        };
        let vote = vote_from_row(&row)?;

        let vote_count = if delta == 0 {
            current
        } else {
            apply_counter_delta(tx, target, delta)
                .await?
                .ok_or(VoteError::TargetNotFound(target))?
        };

        Ok(CastVote {
            vote,
            vote_count,
            delta,
        })
    }

    /// Casts on an already loaded entity and writes the new tally back into it.
    pub async fn cast_vote_on<T: Votable>(
        &self,
        voter_id: i64,
        entity: &mut T,
        value: i64,
    ) -> Result<Vote, VoteError> {
        let cast = self
            .cast_vote(voter_id, entity.vote_target(), value)
            .await?;
        entity.set_vote_count(cast.vote_count);
        Ok(cast.vote)
    }

    pub async fn get_vote(
        &self,
        voter_id: i64,
        target: VoteTarget,
    ) -> Result<Option<Vote>, VoteError> {
        let row = sqlx::query(
            "SELECT id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at \
             FROM votes \
             WHERE voter_id = $1 AND target_kind = $2::target_kind AND target_id = $3",
        )
        .bind(voter_id)
        .bind(target.kind.as_db())
        .bind(target.id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| vote_from_row(&row)).transpose()?)
    }

    pub async fn list_votes(
        &self,
        target: VoteTarget,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<Vote>, VoteError> {
        let rows = match cursor {
            Some((updated_at, vote_id)) => {
                sqlx::query(
                    "SELECT id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at \
                     FROM votes \
                     WHERE target_kind = $1::target_kind AND target_id = $2 \
                       AND (updated_at < $3 OR (updated_at = $3 AND id < $4)) \
                     ORDER BY updated_at DESC, id DESC \
                     LIMIT $5",
                )
                .bind(target.kind.as_db())
                .bind(target.id)
                .bind(updated_at)
                .bind(vote_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, voter_id, target_kind::text AS target_kind, target_id, value, created_at, updated_at \
                     FROM votes \
                     WHERE target_kind = $1::target_kind AND target_id = $2 \
                     ORDER BY updated_at DESC, id DESC \
                     LIMIT $3",
                )
                .bind(target.kind.as_db())
                .bind(target.id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut votes = Vec::with_capacity(rows.len());
        for row in rows {
            votes.push(vote_from_row(&row)?);
        }

        Ok(votes)
    }

    pub async fn target_exists(&self, target: VoteTarget) -> Result<bool, VoteError> {
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            target.kind.table()
        );
        let exists: bool = sqlx::query_scalar(&query)
            .bind(target.id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(exists)
    }

    /// Sum of the ledger for one target; equals the target's `vote_count`
    /// whenever no cast is in flight.
    pub async fn ledger_total(&self, target: VoteTarget) -> Result<i64, VoteError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(value), 0)::bigint FROM votes \
             WHERE target_kind = $1::target_kind AND target_id = $2",
        )
        .bind(target.kind.as_db())
        .bind(target.id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(total)
    }

    /// Removes every vote cast by `voter_id` and takes each value back out of
    /// its target's counter. Targets are locked in a fixed order before any
    /// ledger row is touched, matching the lock order of a cast.
    pub async fn withdraw_voter_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voter_id: i64,
    ) -> Result<u64, VoteError> {
        let rows = sqlx::query(
            "SELECT target_kind::text AS target_kind, target_id \
             FROM votes WHERE voter_id = $1 \
             ORDER BY target_kind, target_id",
        )
        .bind(voter_id)
        .fetch_all(&mut **tx)
        .await?;

        let mut targets = Vec::with_capacity(rows.len());
        for row in rows {
            let target = VoteTarget {
                kind: target_kind_from_row(&row)?,
                id: row.try_get("target_id")?,
            };
            lock_target(tx, target).await?;
            targets.push(target);
        }

        let removed = sqlx::query(
            "DELETE FROM votes WHERE voter_id = $1 \
             RETURNING target_kind::text AS target_kind, target_id, value",
        )
        .bind(voter_id)
        .fetch_all(&mut **tx)
        .await?;

        for row in &removed {
            let target = VoteTarget {
                kind: target_kind_from_row(row)?,
                id: row.try_get("target_id")?,
            };
            let value: i16 = row.try_get("value")?;
            apply_counter_delta(tx, target, -(value as i32)).await?;
        }

        Ok(removed.len() as u64)
    }

    /// Drops the ledger of targets that are being deleted in the same
    /// transaction. Their counters go away with them.
    pub async fn purge_targets_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: TargetKind,
        target_ids: &[i64],
    ) -> Result<u64, VoteError> {
        if target_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "DELETE FROM votes WHERE target_kind = $1::target_kind AND target_id = ANY($2)",
        )
        .bind(kind.as_db())
        .bind(target_ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Drops ledger rows whose target no longer exists, after a cascading
    /// delete removed posts or comments wholesale.
    pub async fn purge_orphans_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<u64, VoteError> {
        let result = sqlx::query(
            "DELETE FROM votes v \
             WHERE (v.target_kind = 'post' AND NOT EXISTS (SELECT 1 FROM posts p WHERE p.id = v.target_id)) \
                OR (v.target_kind = 'comment' AND NOT EXISTS (SELECT 1 FROM comments c WHERE c.id = v.target_id))",
        )
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Locks the target row and returns its current counter, or `None` when the
/// target does not exist.
async fn lock_target(
    tx: &mut Transaction<'_, Postgres>,
    target: VoteTarget,
) -> Result<Option<i32>, sqlx::Error> {
    let query = format!(
        "SELECT vote_count FROM {} WHERE id = $1 FOR UPDATE",
        target.kind.table()
    );
    sqlx::query_scalar(&query)
        .bind(target.id)
        .fetch_optional(&mut **tx)
        .await
}

async fn apply_counter_delta(
    tx: &mut Transaction<'_, Postgres>,
    target: VoteTarget,
    delta: i32,
) -> Result<Option<i32>, sqlx::Error> {
    let query = format!(
        "UPDATE {} SET vote_count = vote_count + $2 WHERE id = $1 RETURNING vote_count",
        target.kind.table()
    );
    sqlx::query_scalar(&query)
        .bind(target.id)
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await
}

fn target_kind_from_row(row: &PgRow) -> Result<TargetKind, sqlx::Error> {
    let kind: String = row.try_get("target_kind")?;
    TargetKind::from_db(&kind)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown target kind: {}", kind).into()))
}

fn vote_from_row(row: &PgRow) -> Result<Vote, sqlx::Error> {
    let value: i16 = row.try_get("value")?;
    let value = VoteValue::from_db(value)
        .ok_or_else(|| sqlx::Error::Decode(format!("invalid stored vote value: {}", value).into()))?;

    Ok(Vote {
        id: row.try_get("id")?,
        voter_id: row.try_get("voter_id")?,
        target_kind: target_kind_from_row(row)?,
        target_id: row.try_get("target_id")?,
        value,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
