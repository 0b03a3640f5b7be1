//! Fulfiller-side cancellation of an accepted job.
//!
//! Two independent allowances gate the fee: a free window in hours since
//! acceptance, and a daily count of free cancellations. Crossing either
//! one (or both) charges the fee exactly once. An unaffordable fee fails
//! the whole cancellation; the job keeps its assignment.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::repo::{CancellationStoreError, LedgerEntry, LedgerError, Repository};
use crate::domain::money::percentage_of;
use crate::domain::{
    CancellationRecord, EscrowStatus, JobId, Rating, Role, TimeMs, TxKind, UserId,
};
use crate::policy::{resolve_suspension_days, PolicyStore};
use crate::ratings::RatingSource;

#[derive(Debug, Error)]
pub enum CancellationError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("insufficient funds to cover the cancellation fee")]
    InsufficientFunds,
    #[error("no escrow for job {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// What a successful cancellation decided and charged.
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub fee_charged: i64,
    pub hours_since_acceptance: f64,
    /// 1-based index of this cancellation within the fulfiller's UTC day.
    pub daily_index: i64,
    /// Advisory suspension for the fulfiller's current rating; None when
    /// the rating service was unreachable. Enforcement is external.
    pub suspension_days: Option<i32>,
    pub rating_used: Option<Rating>,
}

pub struct CancellationEngine {
    repo: Arc<Repository>,
    policy: Arc<PolicyStore>,
    ratings: Arc<dyn RatingSource>,
    max_free_hours: i64,
    max_daily_free: i64,
    fee_rate: rust_decimal::Decimal,
}

impl CancellationEngine {
    pub fn new(
        repo: Arc<Repository>,
        policy: Arc<PolicyStore>,
        ratings: Arc<dyn RatingSource>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            policy,
            ratings,
            max_free_hours: config.max_free_cancellation_hours,
            max_daily_free: config.max_daily_free_cancellations,
            fee_rate: config.cancellation_fee_rate,
        }
    }

    /// Cancel an accepted job on behalf of its assigned fulfiller.
    ///
    /// On success the fulfiller is unassigned and the funds stay escrowed
    /// for the next fulfiller; the escrow itself is not resolved.
    pub async fn cancel(
        &self,
        job_id: &JobId,
        fulfiller_id: &UserId,
        now: TimeMs,
    ) -> Result<CancellationOutcome, CancellationError> {
        let escrow = self
            .repo
            .get_escrow(job_id)
            .await?
            .ok_or_else(|| CancellationError::NotFound(job_id.clone()))?;

        if escrow.status != EscrowStatus::Pending {
            return Err(CancellationError::Forbidden(
                "job is not in an accepted state".into(),
            ));
        }
        match escrow.fulfiller_id.as_ref() {
            Some(assigned) if assigned == fulfiller_id => {}
            Some(_) | None => {
                return Err(CancellationError::Forbidden(
                    "caller is not the assigned fulfiller".into(),
                ))
            }
        }

        let accepted_at = escrow.accepted_at.unwrap_or(escrow.created_at);
        let hours = accepted_at.hours_until(now);

        let (day_start, day_end) = now.utc_day_bounds();
        let today_count = self
            .repo
            .count_cancellations_in(fulfiller_id, day_start, day_end)
            .await?;
        let daily_index = today_count + 1;

        let over_time_window = hours > self.max_free_hours as f64;
        let over_daily_limit = daily_index > self.max_daily_free;
        let fee = if over_time_window || over_daily_limit {
            percentage_of(escrow.reference_amount, self.fee_rate)
        } else {
            0
        };

        let fee_entry = (fee > 0).then(|| LedgerEntry {
            user_id: fulfiller_id.clone(),
            role: Role::Fulfiller,
            amount: fee,
            kind: TxKind::FeeDebit {
                job_id: job_id.clone(),
            },
            description: format!(
                "cancellation fee for job {} ({:.1}h after acceptance, #{} today)",
                job_id, hours, daily_index
            ),
            rating_used: None,
            policy_version: None,
        });

        let record = CancellationRecord {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.clone(),
            fulfiller_id: fulfiller_id.clone(),
            cancelled_at: now,
            hours_since_acceptance: hours,
            fee_amount: fee,
            daily_index,
        };

        self.repo
            .apply_cancellation(&record, fee_entry.as_ref())
            .await
            .map_err(|e| match e {
                CancellationStoreError::Ledger(LedgerError::InsufficientFunds) => {
                    CancellationError::InsufficientFunds
                }
                CancellationStoreError::Ledger(LedgerError::Validation(msg)) => {
                    CancellationError::Forbidden(msg)
                }
                CancellationStoreError::Ledger(LedgerError::Db(e)) => CancellationError::Store(e),
                CancellationStoreError::StateChanged => {
                    CancellationError::Forbidden("job state changed during cancellation".into())
                }
                CancellationStoreError::Db(e) => CancellationError::Store(e),
            })?;

        // Advisory only; a rating-service outage must not undo a
        // cancellation that already committed.
        let (rating_used, suspension_days) = match self
            .ratings
            .rating_for(fulfiller_id, Role::Fulfiller)
            .await
        {
            Ok(rating) => {
                let snapshot = self.policy.current();
                (Some(rating), Some(resolve_suspension_days(&snapshot, rating)))
            }
            Err(e) => {
                warn!(fulfiller = %fulfiller_id, error = %e, "rating unavailable for suspension advisory");
                (None, None)
            }
        };

        info!(
            job_id = %job_id,
            fulfiller = %fulfiller_id,
            fee,
            hours_since_acceptance = hours,
            daily_index,
            "job cancellation applied"
        );
        Ok(CancellationOutcome {
            fee_charged: fee,
            hours_since_acceptance: hours,
            daily_index,
            suspension_days,
            rating_used,
        })
    }
}
