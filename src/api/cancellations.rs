use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationsQuery {
    pub fulfiller_id: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationsResponse {
    pub cancellations: Vec<CancellationDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationDto {
    pub job_id: String,
    pub cancelled_at: i64,
    pub hours_since_acceptance: f64,
    pub fee_amount: i64,
    pub daily_index: i64,
}

pub async fn get_cancellations(
    Query(params): Query<CancellationsQuery>,
    State(state): State<AppState>,
) -> Result<Json<CancellationsResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let records = state
        .repo
        .cancellation_history(&UserId::new(params.fulfiller_id), limit)
        .await?;

    Ok(Json(CancellationsResponse {
        cancellations: records
            .into_iter()
            .map(|r| CancellationDto {
                job_id: r.job_id.as_str().to_string(),
                cancelled_at: r.cancelled_at.as_ms(),
                hours_since_acceptance: r.hours_since_acceptance,
                fee_amount: r.fee_amount,
                daily_index: r.daily_index,
            })
            .collect(),
    }))
}
