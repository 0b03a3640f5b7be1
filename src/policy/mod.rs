//! Policy resolution: rating-tiered commission and suspension, per-kind
//! compensation rates, all over versioned immutable snapshots.

pub mod resolver;
pub mod store;

pub use resolver::{
    resolve_commission_rate, resolve_compensation_rate, resolve_suspension_days,
    DEFAULT_SUSPENSION_DAYS, PERMANENT_SUSPENSION,
};
pub use store::PolicyStore;
