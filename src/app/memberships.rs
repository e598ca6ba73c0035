use anyhow::Result;
use sqlx::Row;
use time::OffsetDateTime;

use crate::domain::group::{Group, Membership};
use crate::domain::student::Student;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct MembershipService {
    db: Db,
}

#[derive(Debug, Clone)]
pub struct GroupEdge {
    pub group: Group,
    pub is_subscribed: bool,
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct MemberEdge {
    pub student: Student,
    pub membership_id: i64,
    pub is_subscribed: bool,
    pub joined_at: OffsetDateTime,
}

impl MembershipService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Returns `None` when the group does not exist. A second join fails on
    /// `student_groups_member_key`.
    pub async fn join(&self, student_id: i64, group_id: i64) -> Result<Option<Membership>> {
        let row = sqlx::query(
            "INSERT INTO student_groups (student_id, group_id, is_subscribed) \
             SELECT $1, g.id, true FROM groups g WHERE g.id = $2 \
             RETURNING id, student_id, group_id, is_subscribed, created_at, updated_at",
        )
        .bind(student_id)
        .bind(group_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| Membership {
            id: row.get("id"),
            student_id: row.get("student_id"),
            group_id: row.get("group_id"),
            is_subscribed: row.get("is_subscribed"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn leave(&self, student_id: i64, group_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM student_groups WHERE student_id = $1 AND group_id = $2",
        )
        .bind(student_id)
        .bind(group_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_subscription(
        &self,
        student_id: i64,
        group_id: i64,
        is_subscribed: bool,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query(
            "UPDATE student_groups \
             SET is_subscribed = $3, updated_at = now() \
             WHERE student_id = $1 AND group_id = $2 \
             RETURNING id, student_id, group_id, is_subscribed, created_at, updated_at",
        )
        .bind(student_id)
        .bind(group_id)
        .bind(is_subscribed)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| Membership {
            id: row.get("id"),
            student_id: row.get("student_id"),
            group_id: row.get("group_id"),
            is_subscribed: row.get("is_subscribed"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    pub async fn list_groups_for_student(&self, student_id: i64) -> Result<Vec<GroupEdge>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name, g.description, g.is_default, g.created_at, g.updated_at, \
                    sg.is_subscribed, sg.created_at AS joined_at \
             FROM student_groups sg \
             JOIN groups g ON g.id = sg.group_id \
             WHERE sg.student_id = $1 \
             ORDER BY g.name ASC",
        )
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            groups.push(GroupEdge {
                group: Group {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    is_default: row.get("is_default"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                },
                is_subscribed: row.get("is_subscribed"),
                joined_at: row.get("joined_at"),
            });
        }

        Ok(groups)
    }

    pub async fn list_members(
        &self,
        group_id: i64,
        cursor: Option<(OffsetDateTime, i64)>,
        limit: i64,
    ) -> Result<Vec<MemberEdge>> {
        let rows = match cursor {
            Some((joined_at, membership_id)) => {
                sqlx::query(
                    "SELECT s.id, s.name, s.email, s.created_at, s.updated_at, \
                            sg.id AS membership_id, sg.is_subscribed, sg.created_at AS joined_at \
                     FROM student_groups sg \
                     JOIN students s ON s.id = sg.student_id \
                     WHERE sg.group_id = $1 \
                       AND (sg.created_at < $2 OR (sg.created_at = $2 AND sg.id < $3)) \
                     ORDER BY sg.created_at DESC, sg.id DESC \
                     LIMIT $4",
                )
                .bind(group_id)
                .bind(joined_at)
                .bind(membership_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT s.id, s.name, s.email, s.created_at, s.updated_at, \
                            sg.id AS membership_id, sg.is_subscribed, sg.created_at AS joined_at \
                     FROM student_groups sg \
                     JOIN students s ON s.id = sg.student_id \
                     WHERE sg.group_id = $1 \
                     ORDER BY sg.created_at DESC, sg.id DESC \
                     LIMIT $2",
                )
                .bind(group_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            members.push(MemberEdge {
                student: Student {
                    id: row.get("id"),
                    name: row.get("name"),
                    email: row.get("email"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                },
                membership_id: row.get("membership_id"),
                is_subscribed: row.get("is_subscribed"),
                joined_at: row.get("joined_at"),
            });
        }

        Ok(members)
    }

    pub async fn enroll_in_defaults_with_tx(
        &self,
        student_id: i64,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO student_groups (student_id, group_id, is_subscribed) \
             SELECT $1, id, true FROM groups WHERE is_default \
             ON CONFLICT (student_id, group_id) DO NOTHING",
        )
        .bind(student_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}
