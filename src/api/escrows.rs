use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::domain::{EscrowStatus, JobId};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowStatusResponse {
    pub job_id: String,
    pub requester_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfiller_id: Option<String>,
    pub amount: i64,
    pub fee_amount: i64,
    pub compensated_total: i64,
    pub status: EscrowStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<i64>,
    pub dispute_deadline: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
}

pub async fn get_escrow_status(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EscrowStatusResponse>, AppError> {
    let record = state.escrow.status(&JobId::new(job_id)).await?;

    Ok(Json(EscrowStatusResponse {
        job_id: record.job_id.as_str().to_string(),
        requester_id: record.requester_id.as_str().to_string(),
        fulfiller_id: record.fulfiller_id.map(|u| u.as_str().to_string()),
        amount: record.amount,
        fee_amount: record.fee_amount,
        compensated_total: record.compensated_total,
        status: record.status,
        created_at: record.created_at.as_ms(),
        accepted_at: record.accepted_at.map(|t| t.as_ms()),
        dispute_deadline: record.dispute_deadline.as_ms(),
        resolved_at: record.resolved_at.map(|t| t.as_ms()),
    }))
}
