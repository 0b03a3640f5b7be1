//! Ledger store: the only code that mutates balances.
//!
//! Every credit/debit applies the balance change and appends the matching
//! `point_transactions` row in one SQLite transaction, so the log and the
//! balance can never disagree. Debits are guarded by a conditional update
//! (`... AND balance >= amount`): of two racing debits that would jointly
//! overdraw an account, exactly one matches zero rows and fails with
//! `InsufficientFunds`.

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::{with_store_retry, IsTransient, Repository};
use crate::domain::{
    JobId, PointTransaction, Rating, Role, TimeMs, TxKind, TxStatus, UserId,
};

/// Input for one ledger mutation. `amount` is the positive magnitude;
/// the sign is implied by whether it is passed to `credit` or `debit`.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: UserId,
    pub role: Role,
    pub amount: i64,
    pub kind: TxKind,
    pub description: String,
    pub rating_used: Option<Rating>,
    pub policy_version: Option<i64>,
}

/// Balance plus lifetime totals, derived from the log on every call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BalanceDetail {
    pub balance: i64,
    pub total_in: i64,
    pub total_out: i64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IsTransient for LedgerError {
    fn is_transient(&self) -> bool {
        match self {
            LedgerError::Db(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl Repository {
    /// Credit an account. Credits are never rejected for business
    /// reasons; only a store failure can make this fail.
    ///
    /// # Errors
    /// `Validation` for a non-positive amount, `Db` on store failure.
    pub async fn credit(&self, entry: &LedgerEntry) -> Result<PointTransaction, LedgerError> {
        require_positive(entry)?;
        let now = TimeMs::now();
        with_store_retry(|| self.credit_once(entry, now)).await
    }

    /// Debit an account, failing with `InsufficientFunds` if the balance
    /// cannot cover the amount. The rejected attempt is still recorded as
    /// a `failed` transaction; the balance is untouched.
    pub async fn debit(&self, entry: &LedgerEntry) -> Result<PointTransaction, LedgerError> {
        require_positive(entry)?;
        let now = TimeMs::now();
        let result = with_store_retry(|| self.debit_once(entry, now)).await;
        if matches!(result, Err(LedgerError::InsufficientFunds)) {
            self.record_failed_debit(entry, now).await;
        }
        result
    }

    /// Current balance for an account; 0 for accounts with no history.
    pub async fn get_balance(&self, user_id: &UserId, role: Role) -> Result<i64, sqlx::Error> {
        with_store_retry(|| async {
            let row = sqlx::query(
                "SELECT balance FROM point_accounts WHERE user_id = ? AND role = ?",
            )
            .bind(user_id.as_str())
            .bind(role.as_str())
            .fetch_optional(self.pool())
            .await?;
            Ok(row.map(|r| r.get::<i64, _>("balance")).unwrap_or(0))
        })
        .await
    }

    /// Balance plus lifetime totals-in/out, summed over `completed`
    /// log rows. Derived, never stored.
    pub async fn get_balance_detail(
        &self,
        user_id: &UserId,
        role: Role,
    ) -> Result<BalanceDetail, sqlx::Error> {
        let balance = self.get_balance(user_id, role).await?;
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN amount > 0 THEN amount ELSE 0 END), 0) AS total_in,
                COALESCE(SUM(CASE WHEN amount < 0 THEN -amount ELSE 0 END), 0) AS total_out
            FROM point_transactions
            WHERE user_id = ? AND role = ? AND status = 'completed'
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .fetch_one(self.pool())
        .await?;

        Ok(BalanceDetail {
            balance,
            total_in: row.get("total_in"),
            total_out: row.get("total_out"),
        })
    }

    /// Transaction history for an account, newest first.
    pub async fn transaction_history(
        &self,
        user_id: &UserId,
        role: Role,
        since: Option<TimeMs>,
    ) -> Result<Vec<PointTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, tx_type, amount, balance_after, status,
                   job_id, comp_kind, rating_used, policy_version, description,
                   created_at, completed_at
            FROM point_transactions
            WHERE user_id = ? AND role = ? AND created_at >= ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .bind(since.map(|t| t.as_ms()).unwrap_or(0))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().filter_map(tx_from_row).collect())
    }

    async fn credit_once(
        &self,
        entry: &LedgerEntry,
        now: TimeMs,
    ) -> Result<PointTransaction, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let record = apply_credit_conn(&mut *tx, entry, now).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn debit_once(
        &self,
        entry: &LedgerEntry,
        now: TimeMs,
    ) -> Result<PointTransaction, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let record = apply_debit_conn(&mut *tx, entry, now).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Append a `failed` log row for a rejected debit. Best effort: the
    /// audit row must not mask the original error.
    pub(super) async fn record_failed_debit(&self, entry: &LedgerEntry, now: TimeMs) {
        let balance = match self.get_balance(&entry.user_id, entry.role).await {
            Ok(b) => b,
            Err(e) => {
                warn!(user = %entry.user_id, error = %e, "failed to read balance for failed-debit audit row");
                return;
            }
        };
        let record = PointTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: entry.user_id.clone(),
            role: entry.role,
            kind: entry.kind.clone(),
            amount: -entry.amount,
            balance_after: balance,
            status: TxStatus::Failed,
            rating_used: entry.rating_used,
            policy_version: entry.policy_version,
            description: entry.description.clone(),
            created_at: now,
            completed_at: Some(now),
        };
        let mut conn = match self.pool().acquire().await {
            Ok(c) => c,
            Err(e) => {
                warn!(user = %entry.user_id, error = %e, "failed to acquire connection for failed-debit audit row");
                return;
            }
        };
        if let Err(e) = insert_tx_row(&mut *conn, &record).await {
            warn!(user = %entry.user_id, error = %e, "failed to append failed-debit audit row");
        }
    }
}

fn require_positive(entry: &LedgerEntry) -> Result<(), LedgerError> {
    if entry.amount <= 0 {
        return Err(LedgerError::Validation(format!(
            "amount must be positive, got {}",
            entry.amount
        )));
    }
    Ok(())
}

/// Apply a credit inside an open transaction: upsert the account row,
/// bump the balance, and append the `completed` log row.
pub(super) async fn apply_credit_conn(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
    now: TimeMs,
) -> Result<PointTransaction, LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO point_accounts (user_id, role, balance, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id, role) DO UPDATE SET
            balance = balance + excluded.balance,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(entry.user_id.as_str())
    .bind(entry.role.as_str())
    .bind(entry.amount)
    .bind(now.as_ms())
    .execute(&mut *conn)
    .await?;

    let balance_after = read_balance(conn, &entry.user_id, entry.role).await?;
    let record = build_record(entry, entry.amount, balance_after, now);
    insert_tx_row(conn, &record).await?;
    Ok(record)
}

/// Apply a debit inside an open transaction. The balance check and the
/// write are one conditional statement; zero rows affected means the
/// account cannot cover the amount and nothing has been mutated.
pub(super) async fn apply_debit_conn(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
    now: TimeMs,
) -> Result<PointTransaction, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE point_accounts
        SET balance = balance - ?, updated_at = ?
        WHERE user_id = ? AND role = ? AND balance >= ?
        "#,
    )
    .bind(entry.amount)
    .bind(now.as_ms())
    .bind(entry.user_id.as_str())
    .bind(entry.role.as_str())
    .bind(entry.amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::InsufficientFunds);
    }

    let balance_after = read_balance(conn, &entry.user_id, entry.role).await?;
    let record = build_record(entry, -entry.amount, balance_after, now);
    insert_tx_row(conn, &record).await?;
    Ok(record)
}

async fn read_balance(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    role: Role,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT balance FROM point_accounts WHERE user_id = ? AND role = ?")
        .bind(user_id.as_str())
        .bind(role.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("balance"))
}

fn build_record(
    entry: &LedgerEntry,
    signed_amount: i64,
    balance_after: i64,
    now: TimeMs,
) -> PointTransaction {
    PointTransaction {
        id: Uuid::new_v4().to_string(),
        user_id: entry.user_id.clone(),
        role: entry.role,
        kind: entry.kind.clone(),
        amount: signed_amount,
        balance_after,
        status: TxStatus::Completed,
        rating_used: entry.rating_used,
        policy_version: entry.policy_version,
        description: entry.description.clone(),
        created_at: now,
        completed_at: Some(now),
    }
}

pub(super) async fn insert_tx_row(
    conn: &mut SqliteConnection,
    record: &PointTransaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO point_transactions
            (id, user_id, role, tx_type, amount, balance_after, status,
             job_id, comp_kind, rating_used, policy_version, description,
             created_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(record.user_id.as_str())
    .bind(record.role.as_str())
    .bind(record.kind.type_str())
    .bind(record.amount)
    .bind(record.balance_after)
    .bind(record.status.as_str())
    .bind(record.kind.job_id().map(|j| j.as_str().to_string()))
    .bind(record.kind.compensation_kind().map(|k| k.as_str()))
    .bind(record.rating_used.map(|r| r.as_decimal().to_string()))
    .bind(record.policy_version)
    .bind(&record.description)
    .bind(record.created_at.as_ms())
    .bind(record.completed_at.map(|t| t.as_ms()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Map a log row back to a `PointTransaction`, skipping corrupt rows
/// with a warning rather than failing the whole query.
fn tx_from_row(row: &SqliteRow) -> Option<PointTransaction> {
    let id: String = row.get("id");
    let type_str: String = row.get("tx_type");
    let job_id: Option<String> = row.get("job_id");
    let comp_kind: Option<String> = row.get("comp_kind");

    let comp_kind = match comp_kind {
        Some(s) => match s.parse() {
            Ok(k) => Some(k),
            Err(e) => {
                warn!(tx_id = %id, error = %e, "skipping transaction row with bad comp_kind");
                return None;
            }
        },
        None => None,
    };
    let kind = match TxKind::from_parts(&type_str, job_id.map(JobId::new), comp_kind) {
        Ok(k) => k,
        Err(e) => {
            warn!(tx_id = %id, error = %e, "skipping transaction row with bad type");
            return None;
        }
    };

    let role_str: String = row.get("role");
    let role = match role_str.parse::<Role>() {
        Ok(r) => r,
        Err(e) => {
            warn!(tx_id = %id, error = %e, "skipping transaction row with bad role");
            return None;
        }
    };

    let status_str: String = row.get("status");
    let status = match status_str.parse::<TxStatus>() {
        Ok(s) => s,
        Err(e) => {
            warn!(tx_id = %id, error = %e, "skipping transaction row with bad status");
            return None;
        }
    };

    let rating_used = row
        .get::<Option<String>, _>("rating_used")
        .and_then(|s| match Decimal::from_str(&s) {
            Ok(d) => Some(Rating::new(d)),
            Err(e) => {
                warn!(tx_id = %id, rating = %s, error = %e, "ignoring unparseable rating on transaction row");
                None
            }
        });

    Some(PointTransaction {
        id,
        user_id: UserId::new(row.get::<String, _>("user_id")),
        role,
        kind,
        amount: row.get("amount"),
        balance_after: row.get("balance_after"),
        status,
        rating_used,
        policy_version: row.get("policy_version"),
        description: row.get("description"),
        created_at: TimeMs::new(row.get("created_at")),
        completed_at: row.get::<Option<i64>, _>("completed_at").map(TimeMs::new),
    })
}
