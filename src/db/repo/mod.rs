//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database
//! operations. Methods are organized across submodules by domain:
//! - `ledger.rs` - account balances and the point transaction log
//! - `escrows.rs` - escrow rows and their atomic funding/resolution
//! - `cancellations.rs` - cancellation audit records and daily counts
//! - `withdrawals.rs` - withdrawal request lifecycle
//!
//! Every balance mutation is a conditional single-statement update or a
//! multi-statement SQLite transaction, so concurrent callers serialize at
//! the store and partial financial state is never visible.

mod cancellations;
mod escrows;
mod ledger;
mod withdrawals;

pub use cancellations::CancellationStoreError;
pub use escrows::EscrowStoreError;
pub use ledger::{BalanceDetail, LedgerEntry, LedgerError};
pub use withdrawals::{WithdrawalRequest, WithdrawalStatus, WithdrawalStoreError};

use backoff::ExponentialBackoff;
use sqlx::sqlite::SqlitePool;
use std::future::Future;
use std::time::Duration;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Errors that are worth one more try before the caller sees them.
pub(crate) trait IsTransient {
    fn is_transient(&self) -> bool;
}

impl IsTransient for sqlx::Error {
    fn is_transient(&self) -> bool {
        // Pool acquisition timeouts happen before any statement runs, so a
        // retry cannot double-apply work.
        matches!(self, sqlx::Error::PoolTimedOut)
    }
}

/// Retry a store operation with bounded exponential backoff.
///
/// Only acquire-time failures are retried; anything that may have reached
/// the database surfaces immediately.
pub(crate) async fn with_store_retry<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsTransient,
{
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_elapsed_time: Some(Duration::from_secs(3)),
        ..ExponentialBackoff::default()
    };

    backoff::future::retry(policy, || {
        let fut = op();
        async move {
            fut.await.map_err(|e| {
                if e.is_transient() {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}
