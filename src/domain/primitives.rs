//! Domain primitives: TimeMs, UserId, JobId, Role, Rating.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Elapsed hours between `self` and a later instant.
    pub fn hours_until(&self, later: TimeMs) -> f64 {
        (later.0 - self.0) as f64 / 3_600_000.0
    }

    /// Start and end (exclusive) of the UTC calendar day containing this instant.
    pub fn utc_day_bounds(&self) -> (TimeMs, TimeMs) {
        const DAY_MS: i64 = 86_400_000;
        let start = self.0.div_euclid(DAY_MS) * DAY_MS;
        (TimeMs(start), TimeMs(start + DAY_MS))
    }
}

/// Opaque user identifier assigned by the external profile service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque job identifier assigned by the external job workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a job an account belongs to.
///
/// Balances are tracked per (user, role): a user who both posts and runs
/// jobs has two independent accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Posts and funds jobs.
    Requester,
    /// Accepts and performs jobs.
    Fulfiller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "requester",
            Role::Fulfiller => "fulfiller",
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid role: {0}")]
pub struct RoleParseError(String);

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requester" => Ok(Role::Requester),
            "fulfiller" => Ok(Role::Fulfiller),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user rating on the 0..=5 scale, as reported by the rating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rating(#[serde(with = "rust_decimal::serde::float")] pub Decimal);

impl Rating {
    pub fn new(value: Decimal) -> Self {
        Rating(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(Role::from_str("requester").unwrap(), Role::Requester);
        assert_eq!(Role::from_str("fulfiller").unwrap(), Role::Fulfiller);
        assert!(Role::from_str("admin").is_err());
        assert_eq!(Role::Requester.as_str(), "requester");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Fulfiller).unwrap();
        assert_eq!(json, "\"fulfiller\"");
    }

    #[test]
    fn test_hours_until() {
        let accepted = TimeMs::new(0);
        let now = TimeMs::new(25 * 3_600_000);
        assert_eq!(accepted.hours_until(now), 25.0);
    }

    #[test]
    fn test_utc_day_bounds() {
        // 2024-01-02T13:45:00Z
        let t = TimeMs::new(1_704_203_100_000);
        let (start, end) = t.utc_day_bounds();
        assert_eq!(end.as_ms() - start.as_ms(), 86_400_000);
        assert!(start <= t && t < end);
        assert_eq!(start.as_ms() % 86_400_000, 0);
    }

    #[test]
    fn test_rating_json_is_number() {
        let r = Rating::new(Decimal::from_str("4.6").unwrap());
        let json = serde_json::to_value(r).unwrap();
        assert!(json.is_number());
    }
}
