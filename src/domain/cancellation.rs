//! Cancellation audit records.

use super::primitives::{JobId, TimeMs, UserId};

/// One row per fulfiller-side cancellation of an accepted job.
///
/// Append-only: used as the counter source for the daily free-cancellation
/// allowance and as the audit trail for charged fees.
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationRecord {
    pub id: String,
    pub job_id: JobId,
    pub fulfiller_id: UserId,
    pub cancelled_at: TimeMs,
    pub hours_since_acceptance: f64,
    /// Fee actually debited; 0 when the cancellation was free.
    pub fee_amount: i64,
    /// 1-based index of this cancellation within the fulfiller's UTC day.
    pub daily_index: i64,
}
