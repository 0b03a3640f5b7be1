use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{PointTransaction, Role, TimeMs, UserId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub user_id: String,
    pub role: Role,
    pub since_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transaction_count: i64,
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: &'static str,
    pub amount: i64,
    pub balance: i64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub description: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl From<PointTransaction> for TransactionDto {
    fn from(t: PointTransaction) -> Self {
        TransactionDto {
            tx_type: t.kind.type_str(),
            job_id: t.kind.job_id().map(|j| j.as_str().to_string()),
            id: t.id,
            amount: t.amount,
            balance: t.balance_after,
            status: t.status.as_str(),
            description: t.description,
            created_at: t.created_at.as_ms(),
            completed_at: t.completed_at.map(|c| c.as_ms()),
        }
    }
}

pub async fn get_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let user = UserId::new(params.user_id);
    let since = params.since_ms.map(TimeMs::new);
    let history = state
        .repo
        .transaction_history(&user, params.role, since)
        .await?;

    Ok(Json(TransactionsResponse {
        transaction_count: history.len() as i64,
        transactions: history.into_iter().map(TransactionDto::from).collect(),
    }))
}
