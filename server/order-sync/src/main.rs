//! Binary entrypoint for the order sync pipeline.

use axum::{routing::get, routing::post, Router};
use sla_engine::Classifier;
use sqlx_postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_sync::pg::{PgSourceStore, PgTargetStore};
use order_sync::{
  AppState, IntegrityValidator, PartitionLocks, Settings, SourceStore, SyncEngine, TargetStore,
};

fn init_tracing() {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_env("ORDER_SYNC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  init_tracing();
  let settings = Settings::from_env()?;

  // One connection per parallel job plus headroom for the HTTP handlers.
  let max_connections = settings.sync.max_parallel_jobs as u32 + 4;
  let source_pool = PgPoolOptions::new()
    .max_connections(max_connections)
    .connect(&settings.source_database_url)
    .await?;
  let target_pool = PgPoolOptions::new()
    .max_connections(max_connections)
    .connect(&settings.target_database_url)
    .await?;

  let source: Arc<dyn SourceStore> = Arc::new(PgSourceStore::new(source_pool));
  let target: Arc<dyn TargetStore> = Arc::new(PgTargetStore::new(target_pool));
  target.ensure_metadata_tables().await?;

  let locks = PartitionLocks::new();
  let confirmed_status = settings.sync.confirmed_status.clone();
  let engine = SyncEngine::new(
    source.clone(),
    target.clone(),
    Classifier::new(settings.timezones.clone()),
    settings.brands.clone(),
    settings.sync.clone(),
  )
  .with_locks(locks.clone());
  let validator = IntegrityValidator::new(source, target, settings.brands.clone())
    .with_locks(locks)
    .with_confirmed_status(confirmed_status);

  let shutdown = CancellationToken::new();
  let state = Arc::new(AppState {
    engine,
    validator,
    shutdown: shutdown.clone(),
  });

  let scheduler = settings
    .interval
    .map(|period| tokio::spawn(order_sync::schedule::run_every(state.clone(), period)));

  let app = Router::new()
    .route("/health", get(order_sync::health))
    .route("/sync", post(order_sync::run_sync))
    .route("/validate", get(order_sync::run_validate))
    .route("/cleanup", post(order_sync::run_cleanup))
    .layer(CorsLayer::permissive())
    .with_state(state);

  let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
  info!(%addr, "order-sync listening");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

  if let Some(handle) = scheduler {
    if let Err(e) = handle.await {
      warn!(error = %e, "scheduler task ended abnormally");
    }
  }
  Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutdown requested");
  token.cancel();
}
