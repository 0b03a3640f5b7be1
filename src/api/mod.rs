pub mod balance;
pub mod cancellations;
pub mod escrows;
pub mod funding;
pub mod health;
pub mod jobs;
pub mod policy;
pub mod transactions;
pub mod withdrawals;

use crate::db::Repository;
use crate::engine::{CancellationEngine, EscrowManager};
use crate::policy::PolicyStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub escrow: Arc<EscrowManager>,
    pub cancellation: Arc<CancellationEngine>,
    pub policy: Arc<PolicyStore>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        escrow: Arc<EscrowManager>,
        cancellation: Arc<CancellationEngine>,
        policy: Arc<PolicyStore>,
    ) -> Self {
        Self {
            repo,
            escrow,
            cancellation,
            policy,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/funding", post(funding::post_funding))
        .route("/v1/balance", get(balance::get_balance))
        .route("/v1/balance/detail", get(balance::get_balance_detail))
        .route("/v1/transactions", get(transactions::get_transactions))
        .route("/v1/jobs/fund", post(jobs::fund_job))
        .route("/v1/jobs/:job_id/assign", post(jobs::assign_job))
        .route("/v1/jobs/:job_id/release", post(jobs::release_job))
        .route("/v1/jobs/:job_id/refund", post(jobs::refund_job))
        .route("/v1/jobs/:job_id/compensate", post(jobs::compensate_job))
        .route("/v1/jobs/:job_id/cancel", post(jobs::cancel_job))
        .route("/v1/escrows/:job_id", get(escrows::get_escrow_status))
        .route("/v1/cancellations", get(cancellations::get_cancellations))
        .route("/v1/withdrawals", post(withdrawals::request_withdrawal))
        .route(
            "/v1/withdrawals/:id/approve",
            post(withdrawals::approve_withdrawal),
        )
        .route(
            "/v1/withdrawals/:id/reject",
            post(withdrawals::reject_withdrawal),
        )
        .route("/v1/policy/resolve", get(policy::resolve_policy))
        .layer(cors)
        .with_state(state)
}
