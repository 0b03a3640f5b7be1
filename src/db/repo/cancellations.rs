//! Cancellation audit records and the daily-count query.

use sqlx::Row;
use thiserror::Error;

use super::ledger::{apply_debit_conn, LedgerEntry, LedgerError};
use super::{IsTransient, Repository};
use crate::domain::{CancellationRecord, TimeMs, UserId};

#[derive(Debug, Error)]
pub enum CancellationStoreError {
    /// The escrow stopped being pending-and-assigned-to-this-fulfiller
    /// between the engine's check and the write.
    #[error("job state changed during cancellation")]
    StateChanged,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IsTransient for CancellationStoreError {
    fn is_transient(&self) -> bool {
        match self {
            CancellationStoreError::Ledger(e) => e.is_transient(),
            CancellationStoreError::Db(e) => e.is_transient(),
            CancellationStoreError::StateChanged => false,
        }
    }
}

impl Repository {
    /// Count a fulfiller's cancellations with `cancelled_at` in
    /// `[from, to)`.
    pub async fn count_cancellations_in(
        &self,
        fulfiller_id: &UserId,
        from: TimeMs,
        to: TimeMs,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM cancellation_records
            WHERE fulfiller_id = ? AND cancelled_at >= ? AND cancelled_at < ?
            "#,
        )
        .bind(fulfiller_id.as_str())
        .bind(from.as_ms())
        .bind(to.as_ms())
        .fetch_one(self.pool())
        .await?;
        Ok(row.get("n"))
    }

    /// Apply a cancellation atomically: the fee debit (when one applies),
    /// the audit record, and the escrow unassignment commit together or
    /// not at all. An unaffordable fee fails the whole cancellation and
    /// the job keeps its assignment.
    pub async fn apply_cancellation(
        &self,
        record: &CancellationRecord,
        fee: Option<&LedgerEntry>,
    ) -> Result<(), CancellationStoreError> {
        let result = super::with_store_retry(|| self.apply_cancellation_once(record, fee)).await;
        if let (Err(CancellationStoreError::Ledger(LedgerError::InsufficientFunds)), Some(entry)) =
            (&result, fee)
        {
            self.record_failed_debit(entry, record.cancelled_at).await;
        }
        result
    }

    async fn apply_cancellation_once(
        &self,
        record: &CancellationRecord,
        fee: Option<&LedgerEntry>,
    ) -> Result<(), CancellationStoreError> {
        let mut tx = self.pool().begin().await?;

        if let Some(entry) = fee {
            apply_debit_conn(&mut *tx, entry, record.cancelled_at).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO cancellation_records
                (id, job_id, fulfiller_id, cancelled_at,
                 hours_since_acceptance, fee_amount, daily_index)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.job_id.as_str())
        .bind(record.fulfiller_id.as_str())
        .bind(record.cancelled_at.as_ms())
        .bind(record.hours_since_acceptance)
        .bind(record.fee_amount)
        .bind(record.daily_index)
        .execute(&mut *tx)
        .await?;

        let unassigned =
            Repository::unassign_fulfiller_conn(&mut *tx, &record.job_id, &record.fulfiller_id)
                .await?;
        if !unassigned {
            return Err(CancellationStoreError::StateChanged);
        }

        tx.commit().await?;
        Ok(())
    }

    /// Recent cancellations for a fulfiller, newest first.
    pub async fn cancellation_history(
        &self,
        fulfiller_id: &UserId,
        limit: i64,
    ) -> Result<Vec<CancellationRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, fulfiller_id, cancelled_at,
                   hours_since_acceptance, fee_amount, daily_index
            FROM cancellation_records
            WHERE fulfiller_id = ?
            ORDER BY cancelled_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(fulfiller_id.as_str())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| CancellationRecord {
                id: row.get("id"),
                job_id: crate::domain::JobId::new(row.get::<String, _>("job_id")),
                fulfiller_id: UserId::new(row.get::<String, _>("fulfiller_id")),
                cancelled_at: TimeMs::new(row.get("cancelled_at")),
                hours_since_acceptance: row.get("hours_since_acceptance"),
                fee_amount: row.get("fee_amount"),
                daily_index: row.get("daily_index"),
            })
            .collect())
    }
}
