use crate::config::ServerConfig;
use crate::routes::build_router;
use dbs_migrate::Engine;
use std::sync::Arc;
use tracing::info;

/// Builds the engine from `config`, binds the listener, and serves the
/// router until a ctrl-c signal is received.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let engine = Engine::new(config.engine.clone())
        .await
        .map_err(|e| anyhow::anyhow!("failed to build migration engine: {}", e))?;
    let engine = Arc::new(engine);

    let router = build_router(engine.clone());
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "dbs-http listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
