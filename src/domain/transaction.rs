//! The append-only point transaction log model.
//!
//! Transaction kinds are a tagged union: each variant carries exactly the
//! correlation fields it needs, so a record missing its job id cannot be
//! constructed in the first place.

use serde::Serialize;
use thiserror::Error;

use super::escrow::CompensationKind;
use super::primitives::{JobId, Rating, Role, TimeMs, UserId};

/// What a ledger entry was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    /// External payment confirmed; balance topped up.
    Topup,
    /// Funds moved from available into a job's escrow.
    EscrowDebit { job_id: JobId },
    /// Escrowed funds paid out to the fulfiller.
    ReleaseCredit { job_id: JobId },
    /// Escrowed funds returned to the requester, or a rejected
    /// withdrawal rolled back (no job in that case).
    RefundCredit { job_id: Option<JobId> },
    /// Partial payout to the fulfiller for a requester-side failure.
    CompensationCredit {
        job_id: JobId,
        kind: CompensationKind,
    },
    /// Hold taken for a pending bank withdrawal.
    WithdrawalDebit,
    /// Penalty fee (e.g. late cancellation of an accepted job).
    FeeDebit { job_id: JobId },
}

impl TxKind {
    pub fn type_str(&self) -> &'static str {
        match self {
            TxKind::Topup => "topup",
            TxKind::EscrowDebit { .. } => "escrow_debit",
            TxKind::ReleaseCredit { .. } => "release_credit",
            TxKind::RefundCredit { .. } => "refund_credit",
            TxKind::CompensationCredit { .. } => "compensation_credit",
            TxKind::WithdrawalDebit => "withdrawal_debit",
            TxKind::FeeDebit { .. } => "fee_debit",
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            TxKind::EscrowDebit { job_id }
            | TxKind::ReleaseCredit { job_id }
            | TxKind::CompensationCredit { job_id, .. }
            | TxKind::FeeDebit { job_id } => Some(job_id),
            TxKind::RefundCredit { job_id } => job_id.as_ref(),
            TxKind::Topup | TxKind::WithdrawalDebit => None,
        }
    }

    pub fn compensation_kind(&self) -> Option<CompensationKind> {
        match self {
            TxKind::CompensationCredit { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True for kinds that add funds to the account.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TxKind::Topup
                | TxKind::ReleaseCredit { .. }
                | TxKind::RefundCredit { .. }
                | TxKind::CompensationCredit { .. }
        )
    }

    /// Reconstruct a kind from its stored representation.
    pub fn from_parts(
        type_str: &str,
        job_id: Option<JobId>,
        comp_kind: Option<CompensationKind>,
    ) -> Result<Self, TxKindParseError> {
        match type_str {
            "topup" => Ok(TxKind::Topup),
            "withdrawal_debit" => Ok(TxKind::WithdrawalDebit),
            "refund_credit" => Ok(TxKind::RefundCredit { job_id }),
            "escrow_debit" => {
                let job_id = job_id.ok_or(TxKindParseError::MissingJobId("escrow_debit"))?;
                Ok(TxKind::EscrowDebit { job_id })
            }
            "release_credit" => {
                let job_id = job_id.ok_or(TxKindParseError::MissingJobId("release_credit"))?;
                Ok(TxKind::ReleaseCredit { job_id })
            }
            "fee_debit" => {
                let job_id = job_id.ok_or(TxKindParseError::MissingJobId("fee_debit"))?;
                Ok(TxKind::FeeDebit { job_id })
            }
            "compensation_credit" => {
                let job_id =
                    job_id.ok_or(TxKindParseError::MissingJobId("compensation_credit"))?;
                let kind =
                    comp_kind.ok_or(TxKindParseError::MissingJobId("compensation_credit"))?;
                Ok(TxKind::CompensationCredit { job_id, kind })
            }
            other => Err(TxKindParseError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TxKindParseError {
    #[error("unknown transaction type: {0}")]
    UnknownType(String),
    #[error("transaction type {0} requires a correlation field it is missing")]
    MissingJobId(&'static str),
}

/// Log-record state.
///
/// A `Failed` debit has not touched the balance; corrections to
/// `Completed` records happen via new compensating records, never by
/// editing the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid transaction status: {0}")]
pub struct TxStatusParseError(String);

impl std::str::FromStr for TxStatus {
    type Err = TxStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "completed" => Ok(TxStatus::Completed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(TxStatusParseError(other.to_string())),
        }
    }
}

/// One immutable row of the point transaction log.
///
/// `amount` is signed: credits positive, debits negative.
/// `balance_after` is the account balance snapshot taken in the same
/// store transaction that applied the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointTransaction {
    pub id: String,
    pub user_id: UserId,
    pub role: Role,
    pub kind: TxKind,
    pub amount: i64,
    pub balance_after: i64,
    pub status: TxStatus,
    /// Rating the fee computation used, when one was involved.
    pub rating_used: Option<Rating>,
    /// Policy snapshot version the fee computation used.
    pub policy_version: Option<i64>,
    pub description: String,
    pub created_at: TimeMs,
    pub completed_at: Option<TimeMs>,
}
