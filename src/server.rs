//! Server composition — wire the database, embedder, curator, engine, HTTP
//! router, MCP service, and cleanup scheduler into one running process.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{routes, AppState};
use crate::config::EngramConfig;
use crate::curator;
use crate::db;
use crate::embedding;
use crate::engine::MemoryEngine;
use crate::mcp::EngramTools;
use crate::security::SecurityState;

/// Shared setup: open DB, create the embedder and curator, build the engine.
pub fn setup_engine(config: EngramConfig) -> Result<(Arc<MemoryEngine>, Arc<EngramConfig>)> {
    let config = Arc::new(config);
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.vector.dimensions)?;
    tracing::info!(db = %db_path.display(), "database ready");

    // Warn when the embedding model changed under an existing database.
    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed — stored vectors were produced by a different model"
            );
        }
    } else {
        db::migrations::set_embedding_model(&conn, &config.embedding.model)?;
    }

    let embedder = embedding::create_provider(&config.embedding, config.vector.dimensions)?;
    tracing::info!(provider = %config.embedding.provider, "embedding provider ready");

    let curator = curator::create_curator(&config.curator)?;
    tracing::info!(provider = %config.curator.provider, "curator ready");

    let engine = Arc::new(MemoryEngine::new(
        conn,
        Arc::from(embedder),
        Arc::from(curator),
        Arc::clone(&config),
    ));
    Ok((engine, config))
}

/// Build the full application router.
pub fn build_router(engine: Arc<MemoryEngine>, config: Arc<EngramConfig>) -> Router {
    let state = AppState {
        engine: Arc::clone(&engine),
    };
    let security = SecurityState::new(config);

    let mcp_service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(EngramTools::new(engine.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );
    let mcp_router = Router::<AppState>::new().nest_service("/mcp", mcp_service);

    routes::public_router(state.clone())
        .merge(routes::protected_router(state, security, mcp_router))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server, MCP endpoint, and background cleanup jobs.
pub async fn serve(config: EngramConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let (engine, config) = setup_engine(config)?;

    if config.cleanup.enabled {
        spawn_cleanup_jobs(Arc::clone(&engine), Arc::clone(&config));
    }

    let app = build_router(engine, config);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "engram listening at http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

/// One background loop per job type, so at most one instance of each job is
/// ever in flight. Jobs are idempotent; failures are logged and the loop
/// continues on the next tick.
fn spawn_cleanup_jobs(engine: Arc<MemoryEngine>, config: Arc<EngramConfig>) {
    let expiry = Duration::from_secs(config.cleanup.expiry_interval_secs);
    let consolidation = Duration::from_secs(config.cleanup.consolidation_interval_secs);
    let decay = Duration::from_secs(config.cleanup.decay_interval_secs);

    let expiry_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(expiry).await;
            match expiry_engine.run_expiry().await {
                Ok(summary) => tracing::info!(deleted = summary.deleted, "expiry job done"),
                Err(e) => tracing::error!(error = %e, "expiry job failed"),
            }
        }
    });

    let consolidation_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(consolidation).await;
            match consolidation_engine.run_consolidation().await {
                Ok(summary) => tracing::info!(merged = summary.merged, "consolidation job done"),
                Err(e) => tracing::error!(error = %e, "consolidation job failed"),
            }
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(decay).await;
            match engine.run_decay().await {
                Ok(summary) => tracing::info!(demoted = summary.demoted, "decay job done"),
                Err(e) => tracing::error!(error = %e, "decay job failed"),
            }
        }
    });
}
