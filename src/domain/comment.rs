use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::vote::{TargetKind, Votable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub student_id: i64,
    pub post_id: i64,
    /// Set for replies; always a comment on the same post.
    pub parent_comment_id: Option<i64>,
    pub content: String,
    pub vote_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Votable for Comment {
    const KIND: TargetKind = TargetKind::Comment;

    fn id(&self) -> i64 {
        self.id
    }

    fn vote_count(&self) -> i32 {
        self.vote_count
    }

    fn set_vote_count(&mut self, vote_count: i32) {
        self.vote_count = vote_count;
    }
}
