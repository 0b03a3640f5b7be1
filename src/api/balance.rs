use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Role, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub role: Role,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDetailResponse {
    pub user_id: String,
    pub role: Role,
    pub balance: i64,
    pub total_in: i64,
    pub total_out: i64,
}

pub async fn get_balance(
    Query(params): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    let user = UserId::new(params.user_id.clone());
    let balance = state.repo.get_balance(&user, params.role).await?;

    Ok(Json(BalanceResponse {
        user_id: params.user_id,
        role: params.role,
        balance,
    }))
}

pub async fn get_balance_detail(
    Query(params): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceDetailResponse>, AppError> {
    let user = UserId::new(params.user_id.clone());
    let detail = state.repo.get_balance_detail(&user, params.role).await?;

    Ok(Json(BalanceDetailResponse {
        user_id: params.user_id,
        role: params.role,
        balance: detail.balance,
        total_in: detail.total_in,
        total_out: detail.total_out,
    }))
}
