use axum::http::StatusCode;
use pointledger::api::{self, AppState};
use pointledger::config::Config;
use pointledger::db::init_db;
use pointledger::engine::{CancellationEngine, EscrowManager};
use pointledger::ratings::MockRatingSource;
use pointledger::{PolicyStore, Repository};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

fn test_config() -> Config {
    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), ":memory:".to_string());
    Config::from_env_map(env).expect("config failed")
}

async fn setup_test_app() -> (axum::Router, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let policy = Arc::new(PolicyStore::with_defaults());
    let ratings = Arc::new(MockRatingSource::new());
    let config = test_config();

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
    let state = AppState::new(repo, escrow, cancellation, policy);

    (api::create_router(state), temp_dir)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _temp) = setup_test_app().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body_str = String::from_utf8(body.to_vec()).unwrap();
    assert!(body_str.contains("ok"));
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (app, _temp) = setup_test_app().await;

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/ready")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let body_str = String::from_utf8(body.to_vec()).unwrap();
    assert!(body_str.contains("ready"));
}
