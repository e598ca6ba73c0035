use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::vote::TargetKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub student_id: i64,
    pub target_kind: TargetKind,
    pub target_id: i64,
    pub reason: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
