//! Pure policy lookups over an immutable snapshot.
//!
//! Tie-breaks:
//! - Commission bands are scanned top-down (highest rating band first)
//!   and matched on `rating >= min_rating`, so a boundary rating belongs
//!   to the higher-rating band.
//! - Suspension bands are scanned bottom-up (lowest band first) and
//!   matched on `rating <= max_rating`, so a boundary rating belongs to
//!   the lower-rating band.
//!
//! A lookup that matches nothing means a misconfigured table; it returns
//! the documented default and logs a warning instead of failing the
//! caller's financial flow.

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{CompensationKind, PolicySnapshot, Rating};

/// Commission applied when no band matches (misconfigured table).
pub fn default_commission_rate() -> Decimal {
    Decimal::from(3)
}

/// Suspension days meaning a permanent suspension.
pub const PERMANENT_SUSPENSION: i32 = -1;

/// Suspension applied when no band matches (misconfigured table).
pub const DEFAULT_SUSPENSION_DAYS: i32 = 0;

/// Commission percentage for a rating.
pub fn resolve_commission_rate(snapshot: &PolicySnapshot, rating: Rating) -> Decimal {
    for band in &snapshot.commission {
        if rating.as_decimal() >= band.min_rating {
            return band.rate;
        }
    }
    warn!(
        policy_version = snapshot.version,
        rating = %rating,
        "no commission band matched rating, using default rate"
    );
    default_commission_rate()
}

/// Suspension days for a rating; `PERMANENT_SUSPENSION` means permanent.
pub fn resolve_suspension_days(snapshot: &PolicySnapshot, rating: Rating) -> i32 {
    for band in &snapshot.suspension {
        if rating.as_decimal() <= band.max_rating {
            return band.days;
        }
    }
    warn!(
        policy_version = snapshot.version,
        rating = %rating,
        "no suspension band matched rating, using default"
    );
    DEFAULT_SUSPENSION_DAYS
}

/// Compensation percentage for a compensation kind.
pub fn resolve_compensation_rate(snapshot: &PolicySnapshot, kind: CompensationKind) -> Decimal {
    snapshot.compensation.rate_for(kind)
}
