use anyhow::Result;

use crate::config::env_or_parse;

/// Fixed window a counter is bucketed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Hour,
    Day,
}

impl RateWindow {
    pub fn seconds(&self) -> u64 {
        match self {
            RateWindow::Hour => 3600,
            RateWindow::Day => 86400,
        }
    }
}

/// Rate-limited actions. Student actions are keyed by student id, the rest by
/// client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateAction {
    Vote,
    Post,
    Comment,
    Report,
    Signup,
    Verify,
}

impl RateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateAction::Vote => "vote",
            RateAction::Post => "post",
            RateAction::Comment => "comment",
            RateAction::Report => "report",
            RateAction::Signup => "signup",
            RateAction::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub votes_per_hour: u32,
    pub posts_per_hour: u32,
    pub comments_per_hour: u32,
    pub reports_per_hour: u32,
    pub verify_per_hour: u32,
    pub signups_per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            votes_per_hour: 300,
            posts_per_hour: 20,
            comments_per_hour: 60,
            reports_per_hour: 10,
            verify_per_hour: 10,
            signups_per_day: 5,
        }
    }
}

impl RateLimits {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            votes_per_hour: env_or_parse("RATE_LIMIT_VOTES_PER_HOUR", "300")?,
            posts_per_hour: env_or_parse("RATE_LIMIT_POSTS_PER_HOUR", "20")?,
            comments_per_hour: env_or_parse("RATE_LIMIT_COMMENTS_PER_HOUR", "60")?,
            reports_per_hour: env_or_parse("RATE_LIMIT_REPORTS_PER_HOUR", "10")?,
            verify_per_hour: env_or_parse("RATE_LIMIT_VERIFY_PER_HOUR", "10")?,
            signups_per_day: env_or_parse("RATE_LIMIT_SIGNUP_PER_DAY", "5")?,
        })
    }

    pub fn limit_for(&self, action: RateAction) -> (u32, RateWindow) {
        match action {
            RateAction::Vote => (self.votes_per_hour, RateWindow::Hour),
            RateAction::Post => (self.posts_per_hour, RateWindow::Hour),
            RateAction::Comment => (self.comments_per_hour, RateWindow::Hour),
            RateAction::Report => (self.reports_per_hour, RateWindow::Hour),
            RateAction::Verify => (self.verify_per_hour, RateWindow::Hour),
            RateAction::Signup => (self.signups_per_day, RateWindow::Day),
        }
    }
}

/// Start of the current fixed window, in unix seconds.
pub fn current_window(window_seconds: u64) -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    now - (now % window_seconds)
}
