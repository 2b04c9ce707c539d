//! Risk Decision Service binary entrypoint.
//! Boots the Axum HTTP server, wiring the engine, routes, and middleware.

use std::sync::Arc;

use review_risk_engine::{api, engine::RiskEngine, metrics::Metrics};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();

    // Fail closed: a bad rule file stops the boot, never a request.
    let engine = Arc::new(RiskEngine::bootstrap()?);
    tracing::info!(mode = ?engine.mode(), "engine ready");

    let metrics = Metrics::init();
    let app = api::router(engine).merge(metrics.router());

    let addr = std::env::var("RISK_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
