use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::Rating;
use crate::error::AppError;
use crate::policy::{resolve_commission_rate, resolve_suspension_days};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvePolicyQuery {
    pub rating: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvePolicyResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub rating: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub commission_rate: Decimal,
    /// -1 means permanent.
    pub suspension_days: i32,
    pub policy_version: i64,
}

/// Resolved commission and suspension for a rating; UI support.
pub async fn resolve_policy(
    Query(params): Query<ResolvePolicyQuery>,
    State(state): State<AppState>,
) -> Result<Json<ResolvePolicyResponse>, AppError> {
    let value: Decimal = params
        .rating
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid rating".to_string()))?;
    if value < Decimal::ZERO || value > Decimal::from(5) {
        return Err(AppError::BadRequest(
            "rating must be within [0, 5]".to_string(),
        ));
    }

    let snapshot = state.policy.current();
    let rating = Rating::new(value);

    Ok(Json(ResolvePolicyResponse {
        rating: value,
        commission_rate: resolve_commission_rate(&snapshot, rating),
        suspension_days: resolve_suspension_days(&snapshot, rating),
        policy_version: snapshot.version,
    }))
}
