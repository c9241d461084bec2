use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use eco_assess::{config::Config, gemini::GeminiClient, routes, stages::Stages};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let gemini = GeminiClient::new(&config);
    if gemini.is_demo() {
        tracing::warn!("GEMINI_API_KEY not set, serving canned demo responses");
    } else {
        tracing::info!(model = %config.gemini_model, "Using Gemini backend");
    }

    let stages = Stages::new(Arc::new(gemini), config.stage_timeout);
    let app = routes::router(routes::AppState::new(stages));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, timeout_secs = config.stage_timeout.as_secs(), "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
