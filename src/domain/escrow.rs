//! Escrow records: one per funded job.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::primitives::{JobId, Rating, TimeMs, UserId};

/// Lifecycle state of an escrow.
///
/// The only legal transitions are `Pending` to one of the terminal
/// states; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    /// Funds held; job outcome not yet known.
    Pending,
    /// Funds paid out to the fulfiller.
    Released,
    /// Funds returned to the requester.
    Refunded,
    /// Closed through the compensation path.
    Compensated,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Compensated => "compensated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscrowStatus::Pending)
    }
}

#[derive(Debug, Error)]
#[error("invalid escrow status: {0}")]
pub struct EscrowStatusParseError(String);

impl std::str::FromStr for EscrowStatus {
    type Err = EscrowStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EscrowStatus::Pending),
            "released" => Ok(EscrowStatus::Released),
            "refunded" => Ok(EscrowStatus::Refunded),
            "compensated" => Ok(EscrowStatus::Compensated),
            other => Err(EscrowStatusParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requester-side failure classes that entitle the fulfiller to a partial
/// compensation payout while the escrow stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationKind {
    /// The goods to pick up were not ready.
    ProductNotReady,
    /// The customer was absent at the agreed time and place.
    CustomerAbsent,
    /// The requester moved the schedule after acceptance.
    ScheduleChanged,
}

impl CompensationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationKind::ProductNotReady => "product_not_ready",
            CompensationKind::CustomerAbsent => "customer_absent",
            CompensationKind::ScheduleChanged => "schedule_changed",
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid compensation kind: {0}")]
pub struct CompensationKindParseError(String);

impl std::str::FromStr for CompensationKind {
    type Err = CompensationKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product_not_ready" => Ok(CompensationKind::ProductNotReady),
            "customer_absent" => Ok(CompensationKind::CustomerAbsent),
            "schedule_changed" => Ok(CompensationKind::ScheduleChanged),
            other => Err(CompensationKindParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for CompensationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Escrow held for a single job; keyed by job id.
///
/// `fee_amount` is the commission actually debited at fund time. Refunds
/// return `amount + fee_amount` as recorded, never a recomputed fee.
/// `reference_amount` is the job-specific base used for compensation and
/// cancellation-fee percentages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowRecord {
    pub job_id: JobId,
    pub requester_id: UserId,
    pub fulfiller_id: Option<UserId>,
    pub amount: i64,
    pub fee_amount: i64,
    pub reference_amount: i64,
    pub requester_rating: Rating,
    pub policy_version: i64,
    pub compensated_total: i64,
    pub status: EscrowStatus,
    pub created_at: TimeMs,
    pub accepted_at: Option<TimeMs>,
    pub dispute_deadline: TimeMs,
    pub resolved_at: Option<TimeMs>,
}

impl EscrowRecord {
    /// Whether this escrow is still pending past its dispute deadline.
    pub fn past_deadline(&self, now: TimeMs) -> bool {
        self.status == EscrowStatus::Pending && self.dispute_deadline < now
    }
}
