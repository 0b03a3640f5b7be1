use pointledger::engine::{spawn_auto_resolver, CancellationEngine, EscrowManager};
use pointledger::ratings::{HttpRatingSource, StaticRatingSource};
use pointledger::{api, config::Config, db::init_db, PolicyStore, Rating, RatingSource, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let policy = Arc::new(PolicyStore::with_defaults());
    let ratings: Arc<dyn RatingSource> = match &config.rating_api_url {
        Some(url) => Arc::new(HttpRatingSource::new(url.clone())),
        None => Arc::new(StaticRatingSource::new(Rating::new(config.default_rating))),
    };

    let escrow = Arc::new(EscrowManager::new(
        repo.clone(),
        policy.clone(),
        ratings.clone(),
        config.dispute_window_ms(),
    ));
    let cancellation = Arc::new(CancellationEngine::new(
        repo.clone(),
        policy.clone(),
        ratings,
        &config,
    ));

    // Background sweep releasing escrows past their dispute deadline.
    spawn_auto_resolver(escrow.clone(), config.auto_resolve_interval_secs);

    // Create router
    let app = api::create_router(api::AppState::new(repo, escrow, cancellation, policy));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
