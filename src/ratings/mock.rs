//! Rating sources for tests and for running without a rating service.

use super::{RatingSource, RatingSourceError};
use crate::domain::{Rating, Role, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Serves one fixed rating for everyone. Used when no rating service is
/// configured.
#[derive(Debug, Clone)]
pub struct StaticRatingSource {
    rating: Rating,
}

impl StaticRatingSource {
    pub fn new(rating: Rating) -> Self {
        Self { rating }
    }
}

#[async_trait]
impl RatingSource for StaticRatingSource {
    async fn rating_for(&self, _user: &UserId, _role: Role) -> Result<Rating, RatingSourceError> {
        Ok(self.rating)
    }
}

/// Mock rating source that returns predefined per-user ratings.
#[derive(Debug, Clone)]
pub struct MockRatingSource {
    ratings: HashMap<(UserId, Role), Rating>,
    default: Rating,
}

impl MockRatingSource {
    /// Create a new mock with a default rating of 5.0.
    pub fn new() -> Self {
        Self {
            ratings: HashMap::new(),
            default: Rating::new(Decimal::from(5)),
        }
    }

    /// Set the rating returned for a specific user and role.
    pub fn with_rating(mut self, user: &str, role: Role, rating: &str) -> Self {
        let value = rating.parse::<Decimal>().unwrap_or_default();
        self.ratings
            .insert((UserId::new(user), role), Rating::new(value));
        self
    }

    /// Set the rating returned when no per-user rating is configured.
    pub fn with_default(mut self, rating: &str) -> Self {
        self.default = Rating::new(rating.parse::<Decimal>().unwrap_or_default());
        self
    }
}

impl Default for MockRatingSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RatingSource for MockRatingSource {
    async fn rating_for(&self, user: &UserId, role: Role) -> Result<Rating, RatingSourceError> {
        Ok(self
            .ratings
            .get(&(user.clone(), role))
            .copied()
            .unwrap_or(self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_mock_returns_configured_rating() {
        let source = MockRatingSource::new()
            .with_rating("u1", Role::Requester, "4.6")
            .with_rating("u1", Role::Fulfiller, "3.0");

        let as_requester = source
            .rating_for(&UserId::new("u1"), Role::Requester)
            .await
            .unwrap();
        assert_eq!(as_requester.as_decimal(), Decimal::from_str("4.6").unwrap());

        let as_fulfiller = source
            .rating_for(&UserId::new("u1"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(as_fulfiller.as_decimal(), Decimal::from_str("3.0").unwrap());
    }

    #[tokio::test]
    async fn test_mock_falls_back_to_default() {
        let source = MockRatingSource::new().with_default("4.2");
        let rating = source
            .rating_for(&UserId::new("unknown"), Role::Requester)
            .await
            .unwrap();
        assert_eq!(rating.as_decimal(), Decimal::from_str("4.2").unwrap());
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticRatingSource::new(Rating::new(Decimal::from(5)));
        let rating = source
            .rating_for(&UserId::new("anyone"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(rating.as_decimal(), Decimal::from(5));
    }
}
