//! Job lifecycle event endpoints: funding, assignment, release, refund,
//! compensation, and fulfiller-side cancellation.

use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{CompensationKind, JobId, TimeMs, UserId};
use crate::engine::{RefundResult, ReleaseResult};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundJobRequest {
    pub job_id: String,
    pub requester_id: String,
    pub amount: i64,
    pub reference_amount: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundJobResponse {
    pub job_id: String,
    pub amount: i64,
    pub fee_amount: i64,
    pub dispute_deadline: i64,
    pub policy_version: i64,
}

pub async fn fund_job(
    State(state): State<AppState>,
    Json(request): Json<FundJobRequest>,
) -> Result<Json<FundJobResponse>, AppError> {
    let job_id = JobId::new(request.job_id);
    let requester = UserId::new(request.requester_id);
    let record = state
        .escrow
        .fund(&job_id, &requester, request.amount, request.reference_amount)
        .await?;

    Ok(Json(FundJobResponse {
        job_id: record.job_id.as_str().to_string(),
        amount: record.amount,
        fee_amount: record.fee_amount,
        dispute_deadline: record.dispute_deadline.as_ms(),
        policy_version: record.policy_version,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignJobRequest {
    pub fulfiller_id: String,
}

pub async fn assign_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<AssignJobRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job_id = JobId::new(job_id);
    let fulfiller = UserId::new(request.fulfiller_id);
    state.escrow.assign(&job_id, &fulfiller).await?;
    Ok(Json(serde_json::json!({"status": "assigned"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseJobRequest {
    pub fulfiller_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseJobResponse {
    pub status: &'static str,
    pub payout: Option<i64>,
    pub fee: Option<i64>,
}

pub async fn release_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ReleaseJobRequest>,
) -> Result<Json<ReleaseJobResponse>, AppError> {
    let job_id = JobId::new(job_id);
    let fulfiller = UserId::new(request.fulfiller_id);
    let result = state.escrow.release(&job_id, &fulfiller).await?;

    let response = match result {
        ReleaseResult::Released { payout, fee } => ReleaseJobResponse {
            status: "released",
            payout: Some(payout),
            fee: Some(fee),
        },
        ReleaseResult::AlreadyReleased => ReleaseJobResponse {
            status: "already_released",
            payout: None,
            fee: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundJobRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundJobResponse {
    pub status: &'static str,
    pub credited: Option<i64>,
}

pub async fn refund_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RefundJobRequest>,
) -> Result<Json<RefundJobResponse>, AppError> {
    let job_id = JobId::new(job_id);
    let result = state.escrow.refund(&job_id, &request.reason).await?;

    let response = match result {
        RefundResult::Refunded { credited } => RefundJobResponse {
            status: "refunded",
            credited: Some(credited),
        },
        RefundResult::AlreadyRefunded => RefundJobResponse {
            status: "already_refunded",
            credited: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateJobRequest {
    pub fulfiller_id: String,
    pub kind: CompensationKind,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub rate_override: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateJobResponse {
    pub gross: i64,
    pub commission: i64,
    pub payout: i64,
    pub policy_version: i64,
}

pub async fn compensate_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<CompensateJobRequest>,
) -> Result<Json<CompensateJobResponse>, AppError> {
    let job_id = JobId::new(job_id);
    let fulfiller = UserId::new(request.fulfiller_id);
    let outcome = state
        .escrow
        .compensate(&job_id, &fulfiller, request.kind, request.rate_override)
        .await?;

    Ok(Json(CompensateJobResponse {
        gross: outcome.gross,
        commission: outcome.commission,
        payout: outcome.payout,
        policy_version: outcome.policy_version,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobRequest {
    pub fulfiller_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub fee_charged: i64,
    pub daily_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_days: Option<i32>,
}

pub async fn cancel_job(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<CancelJobRequest>,
) -> Result<Json<CancelJobResponse>, AppError> {
    let job_id = JobId::new(job_id);
    let fulfiller = UserId::new(request.fulfiller_id);
    let outcome = state
        .cancellation
        .cancel(&job_id, &fulfiller, TimeMs::now())
        .await?;

    Ok(Json(CancelJobResponse {
        fee_charged: outcome.fee_charged,
        daily_index: outcome.daily_index,
        suspension_days: outcome.suspension_days,
    }))
}
