pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod policy;
pub mod ratings;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    CancellationRecord, CompensationKind, EscrowRecord, EscrowStatus, JobId, PointTransaction,
    Rating, Role, TimeMs, TxKind, TxStatus, UserId,
};
pub use engine::{CancellationEngine, EscrowManager};
pub use error::AppError;
pub use policy::PolicyStore;
pub use ratings::{HttpRatingSource, MockRatingSource, RatingSource, StaticRatingSource};
