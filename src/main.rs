use anyhow::Context;
use context_curator::api::{build_router, AppState};
use context_curator::context::ContextAnalysisEngine;
use context_curator::telemetry::init_tracing;
use context_curator::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CURATOR_CONFIG").ok();
    let config = Config::load(config_path.as_deref().or(Some("config")))
        .context("failed to load configuration")?;

    init_tracing(&config.logging);

    let engine = ContextAnalysisEngine::new(&config).context("failed to build analysis engine")?;
    info!(
        documentation = engine.has_documentation(),
        methods = ?engine.detector().active_methods(),
        "Analysis engine ready"
    );

    let state = AppState::new(engine, config.server.request_timeout());
    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
