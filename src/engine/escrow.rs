//! Escrow manager: the per-job funding and settlement state machine.
//!
//! ```text
//!         fund()                finalize(outcome)
//! (none) --------> pending --------------------------> {released | refunded | compensated}
//!                     |  auto-resolve (dispute deadline elapsed)
//!                     +--------------------------------> released
//! ```
//!
//! Ratings are fetched at call time and the value actually used is
//! recorded on the ledger row, together with the policy snapshot version,
//! so every fee stays explainable after tables change.

use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::repo::{EscrowStoreError, LedgerEntry, LedgerError, Repository};
use crate::domain::money::percentage_of;
use crate::domain::{
    CompensationKind, EscrowRecord, EscrowStatus, JobId, Role, TimeMs, TxKind, UserId,
};
use crate::policy::{resolve_commission_rate, resolve_compensation_rate, PolicyStore};
use crate::ratings::{RatingSource, RatingSourceError};

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("no escrow for job {0}")]
    NotFound(JobId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("rating service error: {0}")]
    Rating(#[from] RatingSourceError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl EscrowError {
    fn from_store(err: EscrowStoreError, job_id: &JobId) -> Self {
        match err {
            EscrowStoreError::Duplicate => {
                EscrowError::Conflict(format!("escrow for job {} already exists", job_id))
            }
            EscrowStoreError::NotFound => EscrowError::NotFound(job_id.clone()),
            EscrowStoreError::LostRace { current } => {
                EscrowError::Conflict(format!("escrow already resolved to {}", current))
            }
            EscrowStoreError::AssignConflict => {
                EscrowError::Conflict("escrow already assigned to a different fulfiller".into())
            }
            EscrowStoreError::CapExceeded => EscrowError::Conflict(
                "total compensation would exceed the escrowed amount".into(),
            ),
            EscrowStoreError::Ledger(LedgerError::InsufficientFunds) => {
                EscrowError::InsufficientFunds
            }
            EscrowStoreError::Ledger(LedgerError::Validation(msg)) => {
                EscrowError::Validation(msg)
            }
            EscrowStoreError::Ledger(LedgerError::Db(e)) => EscrowError::Store(e),
            EscrowStoreError::Db(e) => EscrowError::Store(e),
        }
    }
}

/// What a release call actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseResult {
    Released { payout: i64, fee: i64 },
    /// Retry of an already-released escrow for the same fulfiller.
    AlreadyReleased,
}

/// What a refund call actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundResult {
    Refunded { credited: i64 },
    AlreadyRefunded,
}

/// Result of a compensation payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationOutcome {
    pub gross: i64,
    pub commission: i64,
    pub payout: i64,
    pub rate_used: Decimal,
    pub policy_version: i64,
}

/// One auto-resolve sweep's tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub released: usize,
    pub conflicts: usize,
    pub failures: usize,
}

pub struct EscrowManager {
    repo: Arc<Repository>,
    policy: Arc<PolicyStore>,
    ratings: Arc<dyn RatingSource>,
    dispute_window_ms: i64,
}

impl EscrowManager {
    pub fn new(
        repo: Arc<Repository>,
        policy: Arc<PolicyStore>,
        ratings: Arc<dyn RatingSource>,
        dispute_window_ms: i64,
    ) -> Self {
        Self {
            repo,
            policy,
            ratings,
            dispute_window_ms,
        }
    }

    /// Fund a job: debit the requester `amount + commission` and create
    /// the pending escrow, transactionally linked. If the debit fails no
    /// escrow exists; if the escrow insert fails the debit is rolled
    /// back.
    pub async fn fund(
        &self,
        job_id: &JobId,
        requester_id: &UserId,
        amount: i64,
        reference_amount: Option<i64>,
    ) -> Result<EscrowRecord, EscrowError> {
        if amount <= 0 {
            return Err(EscrowError::Validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        let reference_amount = reference_amount.unwrap_or(amount);
        if reference_amount <= 0 {
            return Err(EscrowError::Validation(format!(
                "reference amount must be positive, got {}",
                reference_amount
            )));
        }

        let rating = self.ratings.rating_for(requester_id, Role::Requester).await?;
        let snapshot = self.policy.current();
        let rate = resolve_commission_rate(&snapshot, rating);
        let fee = percentage_of(amount, rate);
        let now = TimeMs::now();

        let record = EscrowRecord {
            job_id: job_id.clone(),
            requester_id: requester_id.clone(),
            fulfiller_id: None,
            amount,
            fee_amount: fee,
            reference_amount,
            requester_rating: rating,
            policy_version: snapshot.version,
            compensated_total: 0,
            status: EscrowStatus::Pending,
            created_at: now,
            accepted_at: None,
            dispute_deadline: TimeMs::new(now.as_ms() + self.dispute_window_ms),
            resolved_at: None,
        };
        let debit = LedgerEntry {
            user_id: requester_id.clone(),
            role: Role::Requester,
            amount: amount + fee,
            kind: TxKind::EscrowDebit {
                job_id: job_id.clone(),
            },
            description: format!("escrow funding for job {} (fee {})", job_id, fee),
            rating_used: Some(rating),
            policy_version: Some(snapshot.version),
        };

        self.repo
            .insert_escrow_funded(&record, &debit)
            .await
            .map_err(|e| EscrowError::from_store(e, job_id))?;

        info!(
            job_id = %job_id,
            requester = %requester_id,
            amount,
            fee,
            policy_version = snapshot.version,
            "escrow funded"
        );
        Ok(record)
    }

    /// Record the job-accepted transition. Idempotent for the same
    /// fulfiller.
    pub async fn assign(&self, job_id: &JobId, fulfiller_id: &UserId) -> Result<(), EscrowError> {
        self.repo
            .assign_fulfiller(job_id, fulfiller_id, TimeMs::now())
            .await
            .map_err(|e| EscrowError::from_store(e, job_id))?;
        info!(job_id = %job_id, fulfiller = %fulfiller_id, "fulfiller assigned");
        Ok(())
    }

    /// Pay the escrowed amount (minus the fulfiller's commission) out to
    /// the assigned fulfiller. Retrying after success is a no-op.
    pub async fn release(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
    ) -> Result<ReleaseResult, EscrowError> {
        let escrow = self
            .repo
            .get_escrow(job_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(job_id.clone()))?;

        match escrow.status {
            EscrowStatus::Released => {
                return if escrow.fulfiller_id.as_ref() == Some(fulfiller_id) {
                    Ok(ReleaseResult::AlreadyReleased)
                } else {
                    Err(EscrowError::Conflict(
                        "escrow released to a different fulfiller".into(),
                    ))
                };
            }
            EscrowStatus::Refunded | EscrowStatus::Compensated => {
                return Err(EscrowError::Conflict(format!(
                    "escrow already resolved to {}",
                    escrow.status
                )));
            }
            EscrowStatus::Pending => {}
        }

        match escrow.fulfiller_id.as_ref() {
            None => {
                return Err(EscrowError::Conflict(
                    "no fulfiller assigned to this job".into(),
                ))
            }
            Some(assigned) if assigned != fulfiller_id => {
                return Err(EscrowError::Conflict(
                    "job is assigned to a different fulfiller".into(),
                ))
            }
            Some(_) => {}
        }

        let rating = self.ratings.rating_for(fulfiller_id, Role::Fulfiller).await?;
        let snapshot = self.policy.current();
        let rate = resolve_commission_rate(&snapshot, rating);
        let fee = percentage_of(escrow.amount, rate);
        let payout = escrow.amount - fee;

        let credit = (payout > 0).then(|| LedgerEntry {
            user_id: fulfiller_id.clone(),
            role: Role::Fulfiller,
            amount: payout,
            kind: TxKind::ReleaseCredit {
                job_id: job_id.clone(),
            },
            description: format!("payout for job {} (fee {})", job_id, fee),
            rating_used: Some(rating),
            policy_version: Some(snapshot.version),
        });

        let resolved = self
            .repo
            .resolve_escrow(
                job_id,
                EscrowStatus::Released,
                TimeMs::now(),
                credit.as_ref(),
                Some(fulfiller_id),
            )
            .await;

        match resolved {
            Ok(_) => {
                info!(
                    job_id = %job_id,
                    fulfiller = %fulfiller_id,
                    payout,
                    fee,
                    policy_version = snapshot.version,
                    "escrow released"
                );
                Ok(ReleaseResult::Released { payout, fee })
            }
            Err(EscrowStoreError::LostRace {
                current: EscrowStatus::Released,
            }) => Ok(ReleaseResult::AlreadyReleased),
            Err(e) => Err(EscrowError::from_store(e, job_id)),
        }
    }

    /// Return the escrowed amount plus the recorded funding fee to the
    /// requester, as if the escrow never happened. Retrying after
    /// success is a no-op.
    pub async fn refund(&self, job_id: &JobId, reason: &str) -> Result<RefundResult, EscrowError> {
        let escrow = self
            .repo
            .get_escrow(job_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(job_id.clone()))?;

        match escrow.status {
            EscrowStatus::Refunded => return Ok(RefundResult::AlreadyRefunded),
            EscrowStatus::Released | EscrowStatus::Compensated => {
                return Err(EscrowError::Conflict(format!(
                    "escrow already resolved to {}",
                    escrow.status
                )));
            }
            EscrowStatus::Pending => {}
        }

        // The fee recorded at fund time is returned in full, never
        // recomputed against the current rating.
        let credited = escrow.amount + escrow.fee_amount;
        let credit = LedgerEntry {
            user_id: escrow.requester_id.clone(),
            role: Role::Requester,
            amount: credited,
            kind: TxKind::RefundCredit {
                job_id: Some(job_id.clone()),
            },
            description: format!("refund for job {}: {}", job_id, reason),
            rating_used: Some(escrow.requester_rating),
            policy_version: Some(escrow.policy_version),
        };

        let resolved = self
            .repo
            .resolve_escrow(job_id, EscrowStatus::Refunded, TimeMs::now(), Some(&credit), None)
            .await;

        match resolved {
            Ok(_) => {
                info!(job_id = %job_id, credited, reason, "escrow refunded");
                Ok(RefundResult::Refunded { credited })
            }
            Err(EscrowStoreError::LostRace {
                current: EscrowStatus::Refunded,
            }) => Ok(RefundResult::AlreadyRefunded),
            Err(e) => Err(EscrowError::from_store(e, job_id)),
        }
    }

    /// Pay the assigned fulfiller a partial compensation for a
    /// requester-side failure. Does not resolve the escrow; total
    /// compensation per job is capped at the escrowed amount.
    pub async fn compensate(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
        kind: CompensationKind,
        rate_override: Option<Decimal>,
    ) -> Result<CompensationOutcome, EscrowError> {
        if let Some(rate) = rate_override {
            if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(EscrowError::Validation(format!(
                    "compensation rate must be within [0, 100], got {}",
                    rate
                )));
            }
        }

        let escrow = self
            .repo
            .get_escrow(job_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(job_id.clone()))?;

        if escrow.status != EscrowStatus::Pending {
            return Err(EscrowError::Conflict(format!(
                "escrow already resolved to {}",
                escrow.status
            )));
        }
        if escrow.fulfiller_id.as_ref() != Some(fulfiller_id) {
            return Err(EscrowError::Conflict(
                "job is not assigned to this fulfiller".into(),
            ));
        }

        let rating = self.ratings.rating_for(fulfiller_id, Role::Fulfiller).await?;
        let snapshot = self.policy.current();
        let rate = rate_override.unwrap_or_else(|| resolve_compensation_rate(&snapshot, kind));
        let gross = percentage_of(escrow.reference_amount, rate);
        if gross == 0 {
            return Ok(CompensationOutcome {
                gross: 0,
                commission: 0,
                payout: 0,
                rate_used: rate,
                policy_version: snapshot.version,
            });
        }
        let commission = percentage_of(gross, resolve_commission_rate(&snapshot, rating));
        let payout = gross - commission;

        let credit = LedgerEntry {
            user_id: fulfiller_id.clone(),
            role: Role::Fulfiller,
            amount: payout,
            kind: TxKind::CompensationCredit {
                job_id: job_id.clone(),
                kind,
            },
            description: format!(
                "{} compensation for job {} (commission {})",
                kind, job_id, commission
            ),
            rating_used: Some(rating),
            policy_version: Some(snapshot.version),
        };

        self.repo
            .add_compensation(job_id, fulfiller_id, gross, &credit, TimeMs::now())
            .await
            .map_err(|e| EscrowError::from_store(e, job_id))?;

        info!(
            job_id = %job_id,
            fulfiller = %fulfiller_id,
            kind = %kind,
            gross,
            payout,
            "compensation paid"
        );
        Ok(CompensationOutcome {
            gross,
            commission,
            payout,
            rate_used: rate,
            policy_version: snapshot.version,
        })
    }

    /// Read-only escrow lookup.
    pub async fn status(&self, job_id: &JobId) -> Result<EscrowRecord, EscrowError> {
        self.repo
            .get_escrow(job_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(job_id.clone()))
    }

    /// Release every pending escrow past its dispute deadline to its
    /// assigned fulfiller. Losing a race against a manual resolution is
    /// expected and counted, not an error.
    pub async fn auto_resolve(&self, now: TimeMs) -> Result<SweepStats, EscrowError> {
        let candidates = self.repo.list_expired_pending(now).await?;
        let mut stats = SweepStats {
            examined: candidates.len(),
            ..SweepStats::default()
        };

        for escrow in candidates {
            let Some(fulfiller_id) = escrow.fulfiller_id.clone() else {
                continue;
            };
            match self.release(&escrow.job_id, &fulfiller_id).await {
                Ok(ReleaseResult::Released { .. }) => stats.released += 1,
                Ok(ReleaseResult::AlreadyReleased) => stats.conflicts += 1,
                Err(EscrowError::Conflict(msg)) => {
                    stats.conflicts += 1;
                    warn!(job_id = %escrow.job_id, %msg, "auto-resolve lost race");
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!(job_id = %escrow.job_id, error = %e, "auto-resolve failed for job");
                }
            }
        }
        Ok(stats)
    }
}
