use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::repo::{LedgerError, WithdrawalStoreError};
use crate::engine::{CancellationError, EscrowError};
use crate::ratings::RatingSourceError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                AppError::Unavailable(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds => AppError::InsufficientFunds(err.to_string()),
            LedgerError::Validation(msg) => AppError::BadRequest(msg),
            LedgerError::Db(e) => e.into(),
        }
    }
}

impl From<RatingSourceError> for AppError {
    fn from(err: RatingSourceError) -> Self {
        match err {
            RatingSourceError::ParseError(_) => AppError::Internal(err.to_string()),
            _ => AppError::Unavailable(err.to_string()),
        }
    }
}

impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::InsufficientFunds => AppError::InsufficientFunds(err.to_string()),
            EscrowError::NotFound(job) => AppError::NotFound(format!("escrow for job {}", job)),
            EscrowError::Conflict(msg) => AppError::Conflict(msg),
            EscrowError::Validation(msg) => AppError::BadRequest(msg),
            EscrowError::Rating(e) => e.into(),
            EscrowError::Store(e) => e.into(),
        }
    }
}

impl From<CancellationError> for AppError {
    fn from(err: CancellationError) -> Self {
        match err {
            CancellationError::Forbidden(msg) => AppError::Forbidden(msg),
            CancellationError::InsufficientFunds => AppError::InsufficientFunds(err.to_string()),
            CancellationError::NotFound(job) => {
                AppError::NotFound(format!("escrow for job {}", job))
            }
            CancellationError::Store(e) => e.into(),
        }
    }
}

impl From<WithdrawalStoreError> for AppError {
    fn from(err: WithdrawalStoreError) -> Self {
        match err {
            WithdrawalStoreError::NotFound => AppError::NotFound("withdrawal request".to_string()),
            WithdrawalStoreError::AlreadyDecided { .. } => AppError::Conflict(err.to_string()),
            WithdrawalStoreError::Ledger(e) => e.into(),
            WithdrawalStoreError::Db(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InsufficientFunds(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
