use anyhow::Context;

use procura_api::config::ApiConfig;
use procura_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    procura_observability::init();

    let api = ApiConfig::from_env();
    let engine = EngineConfig::from_env();
    tracing::info!(
        currency = %engine.currency,
        gateway_timeout_ms = engine.gateway_timeout.as_millis() as u64,
        "engine configured"
    );

    let app = procura_api::app::build_app(engine);

    let listener = tokio::net::TcpListener::bind(api.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", api.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
