//! Rating source abstraction over the external rating service.
//!
//! Ratings drive commission and suspension resolution and are read at
//! transaction time, never cached across operations: the value used is
//! recorded alongside the transaction so the fee stays reproducible.

use crate::domain::{Rating, Role, UserId};
use async_trait::async_trait;
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpRatingSource;
pub use mock::{MockRatingSource, StaticRatingSource};

/// Rating source trait.
///
/// Implementations must handle retry/backoff and rate limiting.
#[async_trait]
pub trait RatingSource: Send + Sync + fmt::Debug {
    /// Current rating for a user acting in a role.
    async fn rating_for(&self, user: &UserId, role: Role) -> Result<Rating, RatingSourceError>;
}

/// Error type for rating source operations.
#[derive(Debug, Clone)]
pub enum RatingSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded after backoff was exhausted
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for RatingSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            RatingSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            RatingSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            RatingSourceError::RateLimited => write!(f, "Rate limited"),
            RatingSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for RatingSourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_source_error_display() {
        let err = RatingSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = RatingSourceError::HttpError {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: unavailable");

        let err = RatingSourceError::RateLimited;
        assert_eq!(err.to_string(), "Rate limited");
    }
}
