use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::vote::{TargetKind, Votable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub student_id: i64,
    pub group_id: i64,
    pub description: String,
    pub details: Option<String>,
    pub image: Option<String>,
    pub vote_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Votable for Post {
    const KIND: TargetKind = TargetKind::Post;

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOrder {
    Newest,
    TopVoted,
}

impl PostOrder {
    pub fn from_sort_by_votes(sort_by_votes: bool) -> Self {
        if sort_by_votes {
            Self::TopVoted
        } else {
            Self::Newest
        }
    }
}
