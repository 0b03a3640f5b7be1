//! Settlement engines: escrow state machine, cancellation policy, and
//! the background auto-resolve sweep.

pub mod cancellation;
pub mod escrow;
pub mod sweeper;

pub use cancellation::{CancellationEngine, CancellationError, CancellationOutcome};
pub use escrow::{
    CompensationOutcome, EscrowError, EscrowManager, RefundResult, ReleaseResult, SweepStats,
};
pub use sweeper::spawn_auto_resolver;
