//! Withdrawal request lifecycle.
//!
//! Requesting a withdrawal takes the hold immediately (a completed
//! `withdrawal_debit`); the external bank transfer happens out of band.
//! Approval finalizes with no further ledger effect; rejection appends a
//! compensating credit. The log rows themselves are never edited.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::ledger::{apply_credit_conn, apply_debit_conn, LedgerEntry, LedgerError};
use super::{IsTransient, Repository};
use crate::domain::{PointTransaction, Role, TimeMs, TxKind, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Requested,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Requested => "requested",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid withdrawal status: {0}")]
pub struct WithdrawalStatusParseError(String);

impl FromStr for WithdrawalStatus {
    type Err = WithdrawalStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(WithdrawalStatus::Requested),
            "approved" => Ok(WithdrawalStatus::Approved),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(WithdrawalStatusParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: UserId,
    pub role: Role,
    pub amount: i64,
    pub status: WithdrawalStatus,
    pub debit_tx_id: String,
    pub created_at: TimeMs,
    pub decided_at: Option<TimeMs>,
}

#[derive(Debug, Error)]
pub enum WithdrawalStoreError {
    #[error("withdrawal request not found")]
    NotFound,
    #[error("withdrawal already decided: {current}")]
    AlreadyDecided { current: &'static str },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IsTransient for WithdrawalStoreError {
    fn is_transient(&self) -> bool {
        match self {
            WithdrawalStoreError::Ledger(e) => e.is_transient(),
            WithdrawalStoreError::Db(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl Repository {
    /// Take the withdrawal hold and create the request row atomically.
    pub async fn create_withdrawal(
        &self,
        user_id: &UserId,
        role: Role,
        amount: i64,
    ) -> Result<WithdrawalRequest, WithdrawalStoreError> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "amount must be positive, got {}",
                amount
            ))
            .into());
        }

        let now = TimeMs::now();
        let id = Uuid::new_v4().to_string();
        let entry = LedgerEntry {
            user_id: user_id.clone(),
            role,
            amount,
            kind: TxKind::WithdrawalDebit,
            description: format!("withdrawal request {}", id),
            rating_used: None,
            policy_version: None,
        };

        let result =
            super::with_store_retry(|| self.create_withdrawal_once(&id, &entry, now)).await;
        if matches!(
            result,
            Err(WithdrawalStoreError::Ledger(LedgerError::InsufficientFunds))
        ) {
            self.record_failed_debit(&entry, now).await;
        }
        result
    }

    async fn create_withdrawal_once(
        &self,
        id: &str,
        entry: &LedgerEntry,
        now: TimeMs,
    ) -> Result<WithdrawalRequest, WithdrawalStoreError> {
        let mut tx = self.pool().begin().await?;
        let debit = apply_debit_conn(&mut *tx, entry, now).await?;

        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests
                (id, user_id, role, amount, status, debit_tx_id, created_at, decided_at)
            VALUES (?, ?, ?, ?, 'requested', ?, ?, NULL)
            "#,
        )
        .bind(id)
        .bind(entry.user_id.as_str())
        .bind(entry.role.as_str())
        .bind(entry.amount)
        .bind(&debit.id)
        .bind(now.as_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(WithdrawalRequest {
            id: id.to_string(),
            user_id: entry.user_id.clone(),
            role: entry.role,
            amount: entry.amount,
            status: WithdrawalStatus::Requested,
            debit_tx_id: debit.id,
            created_at: now,
            decided_at: None,
        })
    }

    pub async fn get_withdrawal(
        &self,
        id: &str,
    ) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM withdrawal_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| withdrawal_from_row(&r)).transpose()
    }

    /// The bank transfer went through: finalize. The hold was already
    /// taken at request time, so there is no ledger effect. Idempotent.
    pub async fn approve_withdrawal(
        &self,
        id: &str,
        now: TimeMs,
    ) -> Result<WithdrawalRequest, WithdrawalStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawal_requests SET status = 'approved', decided_at = ?
            WHERE id = ? AND status = 'requested'
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(self.pool())
        .await?;

        let current = self
            .get_withdrawal(id)
            .await?
            .ok_or(WithdrawalStoreError::NotFound)?;
        if result.rows_affected() > 0 || current.status == WithdrawalStatus::Approved {
            Ok(current)
        } else {
            Err(WithdrawalStoreError::AlreadyDecided {
                current: current.status.as_str(),
            })
        }
    }

    /// The bank transfer failed or was declined: roll the hold back with
    /// a compensating credit. Idempotent.
    pub async fn reject_withdrawal(
        &self,
        id: &str,
        now: TimeMs,
    ) -> Result<(WithdrawalRequest, Option<PointTransaction>), WithdrawalStoreError> {
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query("SELECT * FROM withdrawal_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let request = match row {
            Some(r) => withdrawal_from_row(&r)?,
            None => return Err(WithdrawalStoreError::NotFound),
        };

        match request.status {
            WithdrawalStatus::Rejected => return Ok((request, None)),
            WithdrawalStatus::Approved => {
                return Err(WithdrawalStoreError::AlreadyDecided {
                    current: WithdrawalStatus::Approved.as_str(),
                })
            }
            WithdrawalStatus::Requested => {}
        }

        let result = sqlx::query(
            r#"
            UPDATE withdrawal_requests SET status = 'rejected', decided_at = ?
            WHERE id = ? AND status = 'requested'
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Lost a race with another decision; report the winner.
            drop(tx);
            let current = self
                .get_withdrawal(id)
                .await?
                .ok_or(WithdrawalStoreError::NotFound)?;
            return match current.status {
                WithdrawalStatus::Rejected => Ok((current, None)),
                _ => Err(WithdrawalStoreError::AlreadyDecided {
                    current: current.status.as_str(),
                }),
            };
        }

        let credit = LedgerEntry {
            user_id: request.user_id.clone(),
            role: request.role,
            amount: request.amount,
            kind: TxKind::RefundCredit { job_id: None },
            description: format!("withdrawal request {} rejected", id),
            rating_used: None,
            policy_version: None,
        };
        let credit_record = apply_credit_conn(&mut *tx, &credit, now).await?;

        tx.commit().await?;
        let mut updated = request;
        updated.status = WithdrawalStatus::Rejected;
        updated.decided_at = Some(now);
        Ok((updated, Some(credit_record)))
    }
}

fn withdrawal_from_row(row: &SqliteRow) -> Result<WithdrawalRequest, sqlx::Error> {
    let status_str: String = row.get("status");
    let status = status_str
        .parse::<WithdrawalStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let role_str: String = row.get("role");
    let role = role_str
        .parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(WithdrawalRequest {
        id: row.get("id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        role,
        amount: row.get("amount"),
        status,
        debit_tx_id: row.get("debit_tx_id"),
        created_at: TimeMs::new(row.get("created_at")),
        decided_at: row.get::<Option<i64>, _>("decided_at").map(TimeMs::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    async fn seed(repo: &Repository, user: &str, role: Role, amount: i64) {
        repo.credit(&LedgerEntry {
            user_id: UserId::new(user),
            role,
            amount,
            kind: TxKind::Topup,
            description: "seed".to_string(),
            rating_used: None,
            policy_version: None,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_request_takes_hold_immediately() {
        let (repo, _temp) = setup_test_db().await;
        seed(&repo, "u1", Role::Fulfiller, 10_000).await;

        let request = repo
            .create_withdrawal(&UserId::new("u1"), Role::Fulfiller, 4_000)
            .await
            .expect("request failed");
        assert_eq!(request.status, WithdrawalStatus::Requested);

        let balance = repo
            .get_balance(&UserId::new("u1"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(balance, 6_000);
    }

    #[tokio::test]
    async fn test_request_insufficient_funds() {
        let (repo, _temp) = setup_test_db().await;
        seed(&repo, "u1", Role::Fulfiller, 1_000).await;

        let err = repo
            .create_withdrawal(&UserId::new("u1"), Role::Fulfiller, 4_000)
            .await;
        assert!(matches!(
            err,
            Err(WithdrawalStoreError::Ledger(LedgerError::InsufficientFunds))
        ));
        assert!(repo
            .get_withdrawal("nonexistent")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_approve_finalizes_without_ledger_effect() {
        let (repo, _temp) = setup_test_db().await;
        seed(&repo, "u1", Role::Fulfiller, 10_000).await;
        let request = repo
            .create_withdrawal(&UserId::new("u1"), Role::Fulfiller, 4_000)
            .await
            .unwrap();

        let approved = repo
            .approve_withdrawal(&request.id, TimeMs::now())
            .await
            .unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Approved);
        // Idempotent retry.
        let again = repo
            .approve_withdrawal(&request.id, TimeMs::now())
            .await
            .unwrap();
        assert_eq!(again.status, WithdrawalStatus::Approved);

        let balance = repo
            .get_balance(&UserId::new("u1"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(balance, 6_000);
    }

    #[tokio::test]
    async fn test_reject_credits_back() {
        let (repo, _temp) = setup_test_db().await;
        seed(&repo, "u1", Role::Fulfiller, 10_000).await;
        let request = repo
            .create_withdrawal(&UserId::new("u1"), Role::Fulfiller, 4_000)
            .await
            .unwrap();

        let (rejected, credit) = repo
            .reject_withdrawal(&request.id, TimeMs::now())
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert!(credit.is_some());

        let balance = repo
            .get_balance(&UserId::new("u1"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(balance, 10_000);

        // Idempotent retry produces no second credit.
        let (_, credit2) = repo
            .reject_withdrawal(&request.id, TimeMs::now())
            .await
            .unwrap();
        assert!(credit2.is_none());
        let balance = repo
            .get_balance(&UserId::new("u1"), Role::Fulfiller)
            .await
            .unwrap();
        assert_eq!(balance, 10_000);
    }

    #[tokio::test]
    async fn test_reject_after_approve_conflicts() {
        let (repo, _temp) = setup_test_db().await;
        seed(&repo, "u1", Role::Fulfiller, 10_000).await;
        let request = repo
            .create_withdrawal(&UserId::new("u1"), Role::Fulfiller, 4_000)
            .await
            .unwrap();

        repo.approve_withdrawal(&request.id, TimeMs::now())
            .await
            .unwrap();
        let err = repo.reject_withdrawal(&request.id, TimeMs::now()).await;
        assert!(matches!(
            err,
            Err(WithdrawalStoreError::AlreadyDecided { current: "approved" })
        ));
    }
}
