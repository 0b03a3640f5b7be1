use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::db::repo::LedgerEntry;
use crate::domain::{Role, TxKind, UserId};
use crate::error::AppError;

/// Top-up event delivered after an external payment confirmation. The
/// engine trusts this input once received.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRequest {
    pub user_id: String,
    pub role: Role,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingResponse {
    pub transaction_id: String,
    pub balance: i64,
}

pub async fn post_funding(
    State(state): State<AppState>,
    Json(request): Json<FundingRequest>,
) -> Result<Json<FundingResponse>, AppError> {
    let entry = LedgerEntry {
        user_id: UserId::new(request.user_id),
        role: request.role,
        amount: request.amount,
        kind: TxKind::Topup,
        description: "point top-up".to_string(),
        rating_used: None,
        policy_version: None,
    };
    let record = state.repo.credit(&entry).await?;

    Ok(Json(FundingResponse {
        transaction_id: record.id,
        balance: record.balance_after,
    }))
}
