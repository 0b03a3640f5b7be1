//! Withdrawal request endpoints. The external bank transfer happens out
//! of band; approve/reject carry its success or failure signal back into
//! the ledger.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::db::repo::{WithdrawalRequest, WithdrawalStatus};
use crate::domain::{Role, TimeMs, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    pub user_id: String,
    pub role: Role,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDto {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub amount: i64,
    pub status: WithdrawalStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<i64>,
}

impl From<WithdrawalRequest> for WithdrawalDto {
    fn from(w: WithdrawalRequest) -> Self {
        WithdrawalDto {
            id: w.id,
            user_id: w.user_id.as_str().to_string(),
            role: w.role,
            amount: w.amount,
            status: w.status,
            created_at: w.created_at.as_ms(),
            decided_at: w.decided_at.map(|t| t.as_ms()),
        }
    }
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let user = UserId::new(request.user_id);
    let created = state
        .repo
        .create_withdrawal(&user, request.role, request.amount)
        .await?;
    Ok(Json(created.into()))
}

pub async fn approve_withdrawal(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let updated = state.repo.approve_withdrawal(&id, TimeMs::now()).await?;
    Ok(Json(updated.into()))
}

pub async fn reject_withdrawal(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let (updated, _credit) = state.repo.reject_withdrawal(&id, TimeMs::now()).await?;
    Ok(Json(updated.into()))
}
