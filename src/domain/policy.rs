//! Policy tables: rating-tiered commission and suspension bands,
//! per-kind compensation rates.
//!
//! A `PolicySnapshot` is immutable once built and carries a version;
//! every fee computation records the version it used so historical
//! transactions stay explainable after rates change.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use super::escrow::CompensationKind;

/// One commission band: ratings in [min_rating, max_rating) pay `rate`%.
///
/// Bands are ordered highest-rating first; a boundary value belongs to
/// the band whose `min_rating` it equals (the higher-rating band).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionBand {
    pub min_rating: Decimal,
    pub max_rating: Decimal,
    pub rate: Decimal,
}

/// One suspension band: ratings in (min_rating, max_rating] get `days`
/// of suspension. `days == -1` means permanent.
///
/// Bands are ordered lowest-rating first and matched bottom-up; a
/// boundary value belongs to the band whose `max_rating` it equals
/// (the lower-rating band).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspensionBand {
    pub min_rating: Decimal,
    pub max_rating: Decimal,
    pub days: i32,
}

/// Default compensation percentages per compensation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationRates {
    pub product_not_ready: Decimal,
    pub customer_absent: Decimal,
    pub schedule_changed: Decimal,
}

impl CompensationRates {
    pub fn rate_for(&self, kind: CompensationKind) -> Decimal {
        match kind {
            CompensationKind::ProductNotReady => self.product_not_ready,
            CompensationKind::CustomerAbsent => self.customer_absent,
            CompensationKind::ScheduleChanged => self.schedule_changed,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyConfigError {
    #[error("{table} table is empty")]
    Empty { table: &'static str },
    #[error("{table} band {index} has min {min} >= max {max}")]
    InvertedBand {
        table: &'static str,
        index: usize,
        min: Decimal,
        max: Decimal,
    },
    #[error("{table} bands {a} and {b} overlap or leave a gap")]
    NotContiguous {
        table: &'static str,
        a: usize,
        b: usize,
    },
    #[error("{table} bands do not cover the full [0, 5] rating range")]
    IncompleteCover { table: &'static str },
    #[error("rate {rate} outside [0, 100]")]
    RateOutOfRange { rate: Decimal },
}

/// An immutable, versioned set of policy tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub version: i64,
    /// Ordered highest-rating band first.
    pub commission: Vec<CommissionBand>,
    /// Ordered lowest-rating band first.
    pub suspension: Vec<SuspensionBand>,
    pub compensation: CompensationRates,
}

impl PolicySnapshot {
    /// Build a snapshot, validating that each table is ordered,
    /// non-overlapping, and covers [0, 5].
    pub fn new(
        version: i64,
        commission: Vec<CommissionBand>,
        suspension: Vec<SuspensionBand>,
        compensation: CompensationRates,
    ) -> Result<Self, PolicyConfigError> {
        validate_commission(&commission)?;
        validate_suspension(&suspension)?;
        for rate in [
            compensation.product_not_ready,
            compensation.customer_absent,
            compensation.schedule_changed,
        ] {
            validate_rate(rate)?;
        }
        Ok(PolicySnapshot {
            version,
            commission,
            suspension,
            compensation,
        })
    }

    /// The built-in tables used until an operator replaces them.
    pub fn default_tables(version: i64) -> Self {
        let commission = vec![
            band("4.5", "5.0", "0"),
            band("4.0", "4.5", "3"),
            band("3.0", "4.0", "5"),
            band("0", "3.0", "8"),
        ];
        let suspension = vec![
            sband("0", "1.0", -1),
            sband("1.0", "2.0", 30),
            sband("2.0", "2.5", 7),
            sband("2.5", "3.0", 3),
            sband("3.0", "5.0", 0),
        ];
        let compensation = CompensationRates {
            product_not_ready: dec("50"),
            customer_absent: dec("100"),
            schedule_changed: dec("30"),
        };
        // Built-in tables are statically valid.
        PolicySnapshot::new(version, commission, suspension, compensation)
            .expect("built-in policy tables are valid")
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

fn band(min: &str, max: &str, rate: &str) -> CommissionBand {
    CommissionBand {
        min_rating: dec(min),
        max_rating: dec(max),
        rate: dec(rate),
    }
}

fn sband(min: &str, max: &str, days: i32) -> SuspensionBand {
    SuspensionBand {
        min_rating: dec(min),
        max_rating: dec(max),
        days,
    }
}

fn validate_rate(rate: Decimal) -> Result<(), PolicyConfigError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(PolicyConfigError::RateOutOfRange { rate });
    }
    Ok(())
}

fn validate_commission(bands: &[CommissionBand]) -> Result<(), PolicyConfigError> {
    const TABLE: &str = "commission";
    if bands.is_empty() {
        return Err(PolicyConfigError::Empty { table: TABLE });
    }
    for (i, b) in bands.iter().enumerate() {
        if b.min_rating >= b.max_rating {
            return Err(PolicyConfigError::InvertedBand {
                table: TABLE,
                index: i,
                min: b.min_rating,
                max: b.max_rating,
            });
        }
        validate_rate(b.rate)?;
    }
    // Highest band first; each band's min must equal the next band's max.
    for i in 0..bands.len() - 1 {
        if bands[i].min_rating != bands[i + 1].max_rating {
            return Err(PolicyConfigError::NotContiguous {
                table: TABLE,
                a: i,
                b: i + 1,
            });
        }
    }
    let top = &bands[0];
    let bottom = &bands[bands.len() - 1];
    if bottom.min_rating != Decimal::ZERO || top.max_rating < dec("5") {
        return Err(PolicyConfigError::IncompleteCover { table: TABLE });
    }
    Ok(())
}

fn validate_suspension(bands: &[SuspensionBand]) -> Result<(), PolicyConfigError> {
    const TABLE: &str = "suspension";
    if bands.is_empty() {
        return Err(PolicyConfigError::Empty { table: TABLE });
    }
    for (i, b) in bands.iter().enumerate() {
        if b.min_rating >= b.max_rating {
            return Err(PolicyConfigError::InvertedBand {
                table: TABLE,
                index: i,
                min: b.min_rating,
                max: b.max_rating,
            });
        }
    }
    // Lowest band first; each band's max must equal the next band's min.
    for i in 0..bands.len() - 1 {
        if bands[i].max_rating != bands[i + 1].min_rating {
            return Err(PolicyConfigError::NotContiguous {
                table: TABLE,
                a: i,
                b: i + 1,
            });
        }
    }
    let bottom = &bands[0];
    let top = &bands[bands.len() - 1];
    if bottom.min_rating != Decimal::ZERO || top.max_rating < dec("5") {
        return Err(PolicyConfigError::IncompleteCover { table: TABLE });
    }
    Ok(())
}
