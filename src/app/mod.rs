pub mod auth;
pub mod comments;
pub mod groups;
pub mod memberships;
pub mod posts;
pub mod rate_limiter;
pub mod reports;
pub mod search;
pub mod students;
pub mod votes;
