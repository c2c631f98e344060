use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use gatewarden::{Config, Governance, govern, types::iso8601};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("gatewarden={}", config.log_level).parse()?),
        )
        .init();

    // Governance services: one governor task, one policy table, shared
    // metrics - constructed here and injected into the pipeline
    let governance = Governance::new(config.policy_table(), config.governor_config());

    let app = router(governance.clone());

    let addr = format!("{}:{}", config.listen.host, config.listen.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("gatewarden listening on {}", addr);
    tracing::info!(
        "sweep every {}s, staleness horizon {}s",
        config.store.sweep_interval,
        config.store.staleness_horizon
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // stop the governor and its sweep timer after the listener drains
    governance.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}

/// `/health` and `/metrics` stay outside governance; everything under
/// `/api` runs through it. The `/api` handlers here are a stand-in backend
/// exercising the pipeline - real deployments mount their own controllers
/// behind the same layer.
fn router(governance: Governance) -> Router {
    let governed = Router::new()
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/investors", get(list_investors).post(create_investor))
        .route("/api/live/feed", get(live_feed))
        .layer(from_fn_with_state(governance.clone(), govern));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(governed)
        .with_state(governance)
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn metrics(State(governance): State<Governance>) -> String {
    // refresh store-size gauges before rendering
    if let Ok(stats) = governance.governor.stats().await {
        governance
            .metrics
            .update_store_sizes(stats.rate_keys, stats.cache_entries);
    }
    governance.metrics.export_prometheus()
}

async fn dashboard_summary() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": { "openTickets": 12, "activeInvestors": 48, "pendingAutomations": 3 },
        "meta": { "timestamp": iso8601(std::time::SystemTime::now()) }
    }))
}

async fn list_investors() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": [
            { "id": "inv-1", "name": "Aldgate Capital" },
            { "id": "inv-2", "name": "Brindle Partners" }
        ],
        "meta": { "timestamp": iso8601(std::time::SystemTime::now()) }
    }))
}

async fn create_investor() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": { "id": "inv-3" },
        "meta": { "timestamp": iso8601(std::time::SystemTime::now()) }
    }))
}

async fn live_feed() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": { "events": [] },
        "meta": { "timestamp": iso8601(std::time::SystemTime::now()) }
    }))
}
