//! Background auto-resolve sweep.
//!
//! Escrows still pending past their dispute deadline are released to
//! their assigned fulfiller on a timer. The sweep is idempotent and safe
//! to run concurrently with manual resolutions: the status conditional
//! update makes the first resolver win and the sweep counts the rest as
//! lost races.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::escrow::EscrowManager;
use crate::domain::TimeMs;

/// Start the periodic auto-resolve sweep (runs in background).
pub fn spawn_auto_resolver(escrow: Arc<EscrowManager>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match escrow.auto_resolve(TimeMs::now()).await {
                Ok(stats) if stats.examined > 0 => {
                    info!(
                        examined = stats.examined,
                        released = stats.released,
                        conflicts = stats.conflicts,
                        failures = stats.failures,
                        "auto-resolve sweep finished"
                    );
                }
                Ok(_) => debug!("auto-resolve sweep found nothing pending"),
                Err(e) => error!(error = %e, "auto-resolve sweep failed"),
            }
        }
    })
}
