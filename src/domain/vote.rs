use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of entity a vote or report points at. Stored as the `target_kind`
/// Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    /// Table holding the `vote_count` column for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteTarget {
    pub kind: TargetKind,
    pub id: i64,
}

impl VoteTarget {
    pub fn post(id: i64) -> Self {
        Self {
            kind: TargetKind::Post,
            id,
        }
    }

    pub fn comment(id: i64) -> Self {
        Self {
            kind: TargetKind::Comment,
            id,
        }
    }
}

impl std::fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// An upvote or a downvote. Anything other than +1/-1 is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn as_i32(&self) -> i32 {
        self.as_i16() as i32
    }

    pub fn from_db(value: i16) -> Option<Self> {
        Self::try_from(value as i64).ok()
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(other),
        }
    }
}

impl Serialize for VoteValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.as_i16())
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw)
            .map_err(|value| serde::de::Error::custom(format!("invalid vote value: {}", value)))
    }
}

/// Counter movement for a cast: the full value on a first vote, nothing on a
/// repeat, and the signed difference (+2/-2) on a flip.
pub fn vote_delta(previous: Option<VoteValue>, next: VoteValue) -> i32 {
    match previous {
        None => next.as_i32(),
        Some(previous) if previous == next => 0,
        Some(previous) => next.as_i32() - previous.as_i32(),
    }
}

/// Ledger entry: one student's current vote on one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub voter_id: i64,
    pub target_kind: TargetKind,
    pub target_id: i64,
    pub value: VoteValue,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Vote {
    pub fn target(&self) -> VoteTarget {
        VoteTarget {
            kind: self.target_kind,
            id: self.target_id,
        }
    }
}

/// Entities carrying a cached vote tally.
pub trait Votable {
    const KIND: TargetKind;

    fn id(&self) -> i64;
    fn vote_count(&self) -> i32;
    fn set_vote_count(&mut self, vote_count: i32);

    fn vote_target(&self) -> VoteTarget {
        VoteTarget {
            kind: Self::KIND,
            id: self.id(),
        }
    }
}
