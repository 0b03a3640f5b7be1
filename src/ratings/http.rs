//! HTTP client for the external rating service.

use super::{RatingSource, RatingSourceError};
use crate::domain::{Rating, Role, UserId};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Rating source backed by the rating service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRatingSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RatingResponse {
    #[serde(with = "rust_decimal::serde::float")]
    rating: Decimal,
}

impl HttpRatingSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get_rating(&self, user: &UserId, role: Role) -> Result<Rating, RatingSourceError> {
        let url = format!("{}/ratings/{}", self.base_url, user.as_str());
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[("role", role.as_str())])
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(RatingSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(RatingSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(RatingSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(RatingSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            let body = response.json::<RatingResponse>().await.map_err(|e| {
                backoff::Error::permanent(RatingSourceError::ParseError(e.to_string()))
            })?;
            Ok(Rating::new(body.rating))
        })
        .await
    }
}

#[async_trait]
impl RatingSource for HttpRatingSource {
    async fn rating_for(&self, user: &UserId, role: Role) -> Result<Rating, RatingSourceError> {
        debug!("Fetching rating for user={}, role={}", user, role);
        self.get_rating(user, role).await
    }
}
