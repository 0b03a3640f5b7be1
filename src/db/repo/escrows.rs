//! Escrow rows and their atomic funding / resolution operations.
//!
//! The escrow status machine is enforced here with conditional updates on
//! `status = 'pending'`: the first resolver wins and every later attempt
//! sees `LostRace` with the then-current state, which the engine maps to
//! an idempotent no-op or a conflict.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use super::ledger::{apply_credit_conn, apply_debit_conn, LedgerEntry, LedgerError};
use super::{IsTransient, Repository};
use crate::domain::{EscrowRecord, EscrowStatus, JobId, PointTransaction, Rating, TimeMs, UserId};

#[derive(Debug, Error)]
pub enum EscrowStoreError {
    #[error("escrow for job already exists")]
    Duplicate,
    #[error("escrow not found")]
    NotFound,
    #[error("escrow already resolved to {current}")]
    LostRace { current: EscrowStatus },
    #[error("escrow already assigned to a different fulfiller")]
    AssignConflict,
    #[error("compensation cap exceeded")]
    CapExceeded,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IsTransient for EscrowStoreError {
    fn is_transient(&self) -> bool {
        match self {
            EscrowStoreError::Ledger(e) => e.is_transient(),
            EscrowStoreError::Db(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl Repository {
    /// Create a funded escrow: the requester debit and the escrow row
    /// commit in one transaction. If the debit fails the row is never
    /// persisted; if the insert fails the debit is rolled back.
    pub async fn insert_escrow_funded(
        &self,
        record: &EscrowRecord,
        debit: &LedgerEntry,
    ) -> Result<PointTransaction, EscrowStoreError> {
        super::with_store_retry(|| self.insert_escrow_funded_once(record, debit)).await
    }

    async fn insert_escrow_funded_once(
        &self,
        record: &EscrowRecord,
        debit: &LedgerEntry,
    ) -> Result<PointTransaction, EscrowStoreError> {
        let mut tx = self.pool().begin().await?;

        let debit_record = apply_debit_conn(&mut *tx, debit, record.created_at).await?;

        let insert = sqlx::query(
            r#"
            INSERT INTO escrows
                (job_id, requester_id, fulfiller_id, amount, fee_amount,
                 reference_amount, requester_rating, policy_version,
                 compensated_total, status, created_at, accepted_at,
                 dispute_deadline, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.job_id.as_str())
        .bind(record.requester_id.as_str())
        .bind(record.fulfiller_id.as_ref().map(|u| u.as_str().to_string()))
        .bind(record.amount)
        .bind(record.fee_amount)
        .bind(record.reference_amount)
        .bind(record.requester_rating.as_decimal().to_string())
        .bind(record.policy_version)
        .bind(record.compensated_total)
        .bind(record.status.as_str())
        .bind(record.created_at.as_ms())
        .bind(record.accepted_at.map(|t| t.as_ms()))
        .bind(record.dispute_deadline.as_ms())
        .bind(record.resolved_at.map(|t| t.as_ms()))
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(EscrowStoreError::Duplicate),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(debit_record)
    }

    pub async fn get_escrow(&self, job_id: &JobId) -> Result<Option<EscrowRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM escrows WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().and_then(escrow_from_row))
    }

    /// Record the job-accepted transition: set the fulfiller and the
    /// acceptance time on a pending, unassigned escrow. Re-assigning the
    /// same fulfiller is a no-op.
    pub async fn assign_fulfiller(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
        accepted_at: TimeMs,
    ) -> Result<(), EscrowStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE escrows SET fulfiller_id = ?, accepted_at = ?
            WHERE job_id = ? AND status = 'pending' AND fulfiller_id IS NULL
            "#,
        )
        .bind(fulfiller_id.as_str())
        .bind(accepted_at.as_ms())
        .bind(job_id.as_str())
        .execute(self.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.get_escrow(job_id).await? {
            None => Err(EscrowStoreError::NotFound),
            Some(rec) if rec.status != EscrowStatus::Pending => Err(EscrowStoreError::LostRace {
                current: rec.status,
            }),
            Some(rec) if rec.fulfiller_id.as_ref() == Some(fulfiller_id) => Ok(()),
            Some(_) => Err(EscrowStoreError::AssignConflict),
        }
    }

    /// Clear the fulfiller assignment after a fulfiller-side cancellation.
    /// Funds stay escrowed for the next fulfiller.
    pub(super) async fn unassign_fulfiller_conn(
        conn: &mut sqlx::SqliteConnection,
        job_id: &JobId,
        fulfiller_id: &UserId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE escrows SET fulfiller_id = NULL, accepted_at = NULL
            WHERE job_id = ? AND status = 'pending' AND fulfiller_id = ?
            "#,
        )
        .bind(job_id.as_str())
        .bind(fulfiller_id.as_str())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a pending escrow to a terminal state and apply the
    /// paired ledger credit in one transaction. `credit` is `None` when
    /// the payout nets to zero. When `expect_fulfiller` is set, the
    /// transition additionally requires that fulfiller to still be
    /// assigned, so a concurrent cancellation cannot slip between the
    /// caller's read and the payout.
    ///
    /// The first caller wins; later callers get `LostRace` carrying the
    /// state the escrow actually ended in.
    pub async fn resolve_escrow(
        &self,
        job_id: &JobId,
        to: EscrowStatus,
        resolved_at: TimeMs,
        credit: Option<&LedgerEntry>,
        expect_fulfiller: Option<&UserId>,
    ) -> Result<Option<PointTransaction>, EscrowStoreError> {
        super::with_store_retry(|| {
            self.resolve_escrow_once(job_id, to, resolved_at, credit, expect_fulfiller)
        })
        .await
    }

    async fn resolve_escrow_once(
        &self,
        job_id: &JobId,
        to: EscrowStatus,
        resolved_at: TimeMs,
        credit: Option<&LedgerEntry>,
        expect_fulfiller: Option<&UserId>,
    ) -> Result<Option<PointTransaction>, EscrowStoreError> {
        debug_assert!(to.is_terminal());
        let mut tx = self.pool().begin().await?;

        let result = match expect_fulfiller {
            Some(fulfiller) => {
                sqlx::query(
                    r#"
                    UPDATE escrows SET status = ?, resolved_at = ?
                    WHERE job_id = ? AND status = 'pending' AND fulfiller_id = ?
                    "#,
                )
                .bind(to.as_str())
                .bind(resolved_at.as_ms())
                .bind(job_id.as_str())
                .bind(fulfiller.as_str())
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE escrows SET status = ?, resolved_at = ?
                    WHERE job_id = ? AND status = 'pending'
                    "#,
                )
                .bind(to.as_str())
                .bind(resolved_at.as_ms())
                .bind(job_id.as_str())
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            drop(tx);
            return match self.get_escrow(job_id).await? {
                None => Err(EscrowStoreError::NotFound),
                Some(rec) if rec.status != EscrowStatus::Pending => {
                    Err(EscrowStoreError::LostRace {
                        current: rec.status,
                    })
                }
                // Still pending but the expected fulfiller is gone.
                Some(_) => Err(EscrowStoreError::AssignConflict),
            };
        }

        let credit_record = match credit {
            Some(entry) => Some(apply_credit_conn(&mut *tx, entry, resolved_at).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(credit_record)
    }

    /// Accumulate a compensation payout against a pending escrow still
    /// assigned to `fulfiller_id`, enforcing the per-job cap
    /// (`compensated_total <= amount`) in the same conditional update
    /// that applies it.
    pub async fn add_compensation(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
        comp_amount: i64,
        credit: &LedgerEntry,
        now: TimeMs,
    ) -> Result<PointTransaction, EscrowStoreError> {
        super::with_store_retry(|| {
            self.add_compensation_once(job_id, fulfiller_id, comp_amount, credit, now)
        })
        .await
    }

    async fn add_compensation_once(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
        comp_amount: i64,
        credit: &LedgerEntry,
        now: TimeMs,
    ) -> Result<PointTransaction, EscrowStoreError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE escrows SET compensated_total = compensated_total + ?
            WHERE job_id = ? AND status = 'pending' AND fulfiller_id = ?
              AND compensated_total + ? <= amount
            "#,
        )
        .bind(comp_amount)
        .bind(job_id.as_str())
        .bind(fulfiller_id.as_str())
        .bind(comp_amount)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            return match self.get_escrow(job_id).await? {
                None => Err(EscrowStoreError::NotFound),
                Some(rec) if rec.status != EscrowStatus::Pending => {
                    Err(EscrowStoreError::LostRace {
                        current: rec.status,
                    })
                }
                Some(rec) if rec.fulfiller_id.as_ref() != Some(fulfiller_id) => {
                    Err(EscrowStoreError::AssignConflict)
                }
                Some(_) => Err(EscrowStoreError::CapExceeded),
            };
        }

        let credit_record = apply_credit_conn(&mut *tx, credit, now).await?;
        tx.commit().await?;
        Ok(credit_record)
    }

    /// Pending escrows past their dispute deadline with a fulfiller
    /// assigned; candidates for auto-release.
    pub async fn list_expired_pending(
        &self,
        now: TimeMs,
    ) -> Result<Vec<EscrowRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM escrows
            WHERE status = 'pending' AND dispute_deadline < ?
              AND fulfiller_id IS NOT NULL
            ORDER BY dispute_deadline ASC
            "#,
        )
        .bind(now.as_ms())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().filter_map(escrow_from_row).collect())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}

/// Map an escrow row, skipping corrupt rows with a warning.
fn escrow_from_row(row: &SqliteRow) -> Option<EscrowRecord> {
    let job_id: String = row.get("job_id");

    let status_str: String = row.get("status");
    let status = match status_str.parse::<EscrowStatus>() {
        Ok(s) => s,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "skipping escrow row with bad status");
            return None;
        }
    };

    let rating_str: String = row.get("requester_rating");
    let requester_rating = match rust_decimal::Decimal::from_str(&rating_str) {
        Ok(d) => Rating::new(d),
        Err(e) => {
            warn!(job_id = %job_id, rating = %rating_str, error = %e, "failed to parse requester rating, using 0");
            Rating::new(rust_decimal::Decimal::ZERO)
        }
    };

    Some(EscrowRecord {
        job_id: JobId::new(job_id),
        requester_id: UserId::new(row.get::<String, _>("requester_id")),
        fulfiller_id: row.get::<Option<String>, _>("fulfiller_id").map(UserId::new),
        amount: row.get("amount"),
        fee_amount: row.get("fee_amount"),
        reference_amount: row.get("reference_amount"),
        requester_rating,
        policy_version: row.get("policy_version"),
        compensated_total: row.get("compensated_total"),
        status,
        created_at: TimeMs::new(row.get("created_at")),
        accepted_at: row.get::<Option<i64>, _>("accepted_at").map(TimeMs::new),
        dispute_deadline: TimeMs::new(row.get("dispute_deadline")),
        resolved_at: row.get::<Option<i64>, _>("resolved_at").map(TimeMs::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Role, TxKind};
    use rust_decimal::Decimal;
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

    fn escrow(job: &str, requester: &str, amount: i64, fee: i64) -> EscrowRecord {
        EscrowRecord {
            job_id: JobId::new(job),
            requester_id: UserId::new(requester),
            fulfiller_id: None,
            amount,
            fee_amount: fee,
            reference_amount: amount,
            requester_rating: Rating::new(Decimal::new(45, 1)),
            policy_version: 1,
            compensated_total: 0,
            status: EscrowStatus::Pending,
            created_at: TimeMs::new(1_000),
            accepted_at: None,
            dispute_deadline: TimeMs::new(1_000 + 72 * 3_600_000),
            resolved_at: None,
        }
    }

    fn fund_debit(requester: &str, total: i64, job: &str) -> LedgerEntry {
        LedgerEntry {
            user_id: UserId::new(requester),
            role: Role::Requester,
            amount: total,
            kind: TxKind::EscrowDebit {
                job_id: JobId::new(job),
            },
            description: format!("escrow funding for job {}", job),
            rating_used: None,
            policy_version: Some(1),
        }
    }

    fn seed_topup(user: &str, amount: i64) -> LedgerEntry {
        LedgerEntry {
            user_id: UserId::new(user),
            role: Role::Requester,
            amount,
            kind: TxKind::Topup,
            description: "seed".to_string(),
            rating_used: None,
            policy_version: None,
        }
    }

    #[tokio::test]
    async fn test_fund_debits_and_persists_escrow() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 10_000)).await.unwrap();

        repo.insert_escrow_funded(&escrow("j1", "req", 5_000, 150), &fund_debit("req", 5_150, "j1"))
            .await
            .expect("fund failed");

        let user = UserId::new("req");
        assert_eq!(repo.get_balance(&user, Role::Requester).await.unwrap(), 4_850);
        let rec = repo.get_escrow(&JobId::new("j1")).await.unwrap().unwrap();
        assert_eq!(rec.status, EscrowStatus::Pending);
        assert_eq!(rec.amount, 5_000);
        assert_eq!(rec.fee_amount, 150);
    }

    #[tokio::test]
    async fn test_fund_insufficient_leaves_no_escrow() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 1_000)).await.unwrap();

        let err = repo
            .insert_escrow_funded(&escrow("j1", "req", 5_000, 150), &fund_debit("req", 5_150, "j1"))
            .await;
        assert!(matches!(
            err,
            Err(EscrowStoreError::Ledger(LedgerError::InsufficientFunds))
        ));

        assert!(repo.get_escrow(&JobId::new("j1")).await.unwrap().is_none());
        let user = UserId::new("req");
        assert_eq!(repo.get_balance(&user, Role::Requester).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_duplicate_fund_rolls_back_debit() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 20_000)).await.unwrap();

        repo.insert_escrow_funded(&escrow("j1", "req", 5_000, 0), &fund_debit("req", 5_000, "j1"))
            .await
            .unwrap();
        let err = repo
            .insert_escrow_funded(&escrow("j1", "req", 5_000, 0), &fund_debit("req", 5_000, "j1"))
            .await;
        assert!(matches!(err, Err(EscrowStoreError::Duplicate)));

        // The second debit never committed.
        let user = UserId::new("req");
        assert_eq!(repo.get_balance(&user, Role::Requester).await.unwrap(), 15_000);
    }

    #[tokio::test]
    async fn test_assign_and_reassign() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 10_000)).await.unwrap();
        repo.insert_escrow_funded(&escrow("j1", "req", 5_000, 0), &fund_debit("req", 5_000, "j1"))
            .await
            .unwrap();

        let job = JobId::new("j1");
        let worker = UserId::new("ful");
        repo.assign_fulfiller(&job, &worker, TimeMs::new(2_000))
            .await
            .unwrap();

        // Idempotent for the same fulfiller.
        repo.assign_fulfiller(&job, &worker, TimeMs::new(3_000))
            .await
            .unwrap();
        let rec = repo.get_escrow(&job).await.unwrap().unwrap();
        assert_eq!(rec.accepted_at, Some(TimeMs::new(2_000)));

        // Conflict for a different fulfiller.
        let other = UserId::new("other");
        let err = repo.assign_fulfiller(&job, &other, TimeMs::new(4_000)).await;
        assert!(matches!(err, Err(EscrowStoreError::AssignConflict)));
    }

    #[tokio::test]
    async fn test_resolve_first_caller_wins() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 10_000)).await.unwrap();
        repo.insert_escrow_funded(&escrow("j1", "req", 5_000, 100), &fund_debit("req", 5_100, "j1"))
            .await
            .unwrap();

        let job = JobId::new("j1");
        let refund = LedgerEntry {
            user_id: UserId::new("req"),
            role: Role::Requester,
            amount: 5_100,
            kind: TxKind::RefundCredit {
                job_id: Some(job.clone()),
            },
            description: "refund".to_string(),
            rating_used: None,
            policy_version: None,
        };

        repo.resolve_escrow(&job, EscrowStatus::Refunded, TimeMs::new(9_000), Some(&refund), None)
            .await
            .unwrap();

        let err = repo
            .resolve_escrow(&job, EscrowStatus::Released, TimeMs::new(9_500), None, None)
            .await;
        assert!(matches!(
            err,
            Err(EscrowStoreError::LostRace {
                current: EscrowStatus::Refunded
            })
        ));

        let user = UserId::new("req");
        assert_eq!(repo.get_balance(&user, Role::Requester).await.unwrap(), 10_000);
    }

    #[tokio::test]
    async fn test_compensation_cap_enforced() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 10_000)).await.unwrap();
        repo.insert_escrow_funded(&escrow("j1", "req", 1_000, 0), &fund_debit("req", 1_000, "j1"))
            .await
            .unwrap();

        let job = JobId::new("j1");
        let worker = UserId::new("ful");
        repo.assign_fulfiller(&job, &worker, TimeMs::new(2_000))
            .await
            .unwrap();

        let credit = |amount: i64| LedgerEntry {
            user_id: UserId::new("ful"),
            role: Role::Fulfiller,
            amount,
            kind: TxKind::CompensationCredit {
                job_id: job.clone(),
                kind: crate::domain::CompensationKind::CustomerAbsent,
            },
            description: "compensation".to_string(),
            rating_used: None,
            policy_version: None,
        };

        repo.add_compensation(&job, &worker, 700, &credit(700), TimeMs::new(5_000))
            .await
            .unwrap();
        let err = repo
            .add_compensation(&job, &worker, 400, &credit(400), TimeMs::new(6_000))
            .await;
        assert!(matches!(err, Err(EscrowStoreError::CapExceeded)));

        let rec = repo.get_escrow(&job).await.unwrap().unwrap();
        assert_eq!(rec.compensated_total, 700);
    }

    #[tokio::test]
    async fn test_list_expired_pending() {
        let (repo, _temp) = setup_test_db().await;
        repo.credit(&seed_topup("req", 30_000)).await.unwrap();

        let mut expired = escrow("j1", "req", 5_000, 0);
        expired.dispute_deadline = TimeMs::new(100);
        repo.insert_escrow_funded(&expired, &fund_debit("req", 5_000, "j1"))
            .await
            .unwrap();
        repo.assign_fulfiller(&JobId::new("j1"), &UserId::new("ful"), TimeMs::new(50))
            .await
            .unwrap();

        // Not yet expired.
        let mut fresh = escrow("j2", "req", 5_000, 0);
        fresh.dispute_deadline = TimeMs::new(1_000_000);
        repo.insert_escrow_funded(&fresh, &fund_debit("req", 5_000, "j2"))
            .await
            .unwrap();

        // Expired but unassigned: not a candidate.
        let mut unassigned = escrow("j3", "req", 5_000, 0);
        unassigned.dispute_deadline = TimeMs::new(100);
        repo.insert_escrow_funded(&unassigned, &fund_debit("req", 5_000, "j3"))
            .await
            .unwrap();

        let candidates = repo.list_expired_pending(TimeMs::new(10_000)).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].job_id, JobId::new("j1"));
    }
}
