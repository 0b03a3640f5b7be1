//! Domain types for the point ledger and escrow settlement engine.
//!
//! This module provides:
//! - Domain primitives: TimeMs, UserId, JobId, Role, Rating
//! - Integer-money percentage arithmetic with half-up rounding
//! - The tagged-union transaction log model
//! - Escrow records and their status machine
//! - Versioned, immutable policy tables

pub mod cancellation;
pub mod escrow;
pub mod money;
pub mod policy;
pub mod primitives;
pub mod transaction;

pub use cancellation::CancellationRecord;
pub use escrow::{CompensationKind, EscrowRecord, EscrowStatus};
pub use policy::{CommissionBand, CompensationRates, PolicySnapshot, SuspensionBand};
pub use primitives::{JobId, Rating, Role, TimeMs, UserId};
pub use transaction::{PointTransaction, TxKind, TxStatus};
