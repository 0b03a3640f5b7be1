//! Holder for the current policy snapshot.
//!
//! Snapshots are immutable; updates replace the whole table set and bump
//! the version, so a fee computation that grabbed a snapshot keeps seeing
//! consistent tables even while an operator swaps them out.

use std::sync::{Arc, RwLock};

use crate::domain::policy::PolicyConfigError;
use crate::domain::{CommissionBand, CompensationRates, PolicySnapshot, SuspensionBand};

pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        PolicyStore {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Store seeded with the built-in tables at version 1.
    pub fn with_defaults() -> Self {
        PolicyStore::new(PolicySnapshot::default_tables(1))
    }

    /// The snapshot in effect right now. Callers hold the returned Arc
    /// for the duration of one fee computation.
    pub fn current(&self) -> Arc<PolicySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whole-table replacement; partial patches are not possible by
    /// construction. Returns the new version.
    pub fn replace(
        &self,
        commission: Vec<CommissionBand>,
        suspension: Vec<SuspensionBand>,
        compensation: CompensationRates,
    ) -> Result<i64, PolicyConfigError> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next_version = guard.version + 1;
        let snapshot = PolicySnapshot::new(next_version, commission, suspension, compensation)?;
        *guard = Arc::new(snapshot);
        Ok(next_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_replace_bumps_version() {
        let store = PolicyStore::with_defaults();
        assert_eq!(store.current().version, 1);

        let defaults = PolicySnapshot::default_tables(1);
        let version = store
            .replace(
                defaults.commission.clone(),
                defaults.suspension.clone(),
                defaults.compensation.clone(),
            )
            .expect("replace failed");
        assert_eq!(version, 2);
        assert_eq!(store.current().version, 2);
    }

    #[test]
    fn test_held_snapshot_survives_replace() {
        let store = PolicyStore::with_defaults();
        let held = store.current();

        let defaults = PolicySnapshot::default_tables(1);
        store
            .replace(
                vec![CommissionBand {
                    min_rating: dec("0"),
                    max_rating: dec("5"),
                    rate: dec("10"),
                }],
                defaults.suspension.clone(),
                defaults.compensation.clone(),
            )
            .expect("replace failed");

        // The in-flight computation still sees the old tables.
        assert_eq!(held.version, 1);
        assert_eq!(held.commission.len(), 4);
        assert_eq!(store.current().commission.len(), 1);
    }

    #[test]
    fn test_replace_rejects_invalid_tables() {
        let store = PolicyStore::with_defaults();
        let defaults = PolicySnapshot::default_tables(1);
        let err = store.replace(
            vec![],
            defaults.suspension.clone(),
            defaults.compensation.clone(),
        );
        assert!(err.is_err());
        // Failed replace leaves the old snapshot in place.
        assert_eq!(store.current().version, 1);
    }
}
