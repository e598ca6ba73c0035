use anyhow::Result;

use crate::app::groups::group_from_row;
use crate::app::posts::post_from_row;
use crate::domain::group::Group;
use crate::domain::post::Post;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct SearchService {
    db: Db,
}

impl SearchService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn search_groups(&self, query: &str, limit: i64) -> Result<Vec<Group>> {
        let pattern = format!("%{}%", escape_like_pattern(query));
        let rows = sqlx::query(
            "SELECT id, name, description, is_default, created_at, updated_at \
             FROM groups \
             WHERE name ILIKE $1 ESCAPE '\\' OR description ILIKE $1 ESCAPE '\\' \
             ORDER BY name ASC, id ASC \
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    pub async fn search_posts(&self, query: &str, limit: i64) -> Result<Vec<Post>> {
        let pattern = format!("%{}%", escape_like_pattern(query));
        let rows = sqlx::query(
            "SELECT id, student_id, group_id, description, details, image, vote_count, created_at, updated_at \
             FROM posts \
             WHERE description ILIKE $1 ESCAPE '\\' OR details ILIKE $1 ESCAPE '\\' \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }
}

/// Escapes LIKE metacharacters so user input only ever matches literally.
pub fn escape_like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}
