use std::net::SocketAddr;

use studyhall::{app, db, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,studyhall=debug")),
        )
        .init();

    let config = Config::load()?;

    let db_pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::init(&db_pool).await?;
    tracing::info!(url = %config.database_url, "database ready");

    let state = AppState::new(db_pool, &config)?;
    if !state.assistant.is_configured() {
        tracing::warn!("OPENAI_API_KEY not set, the study assistant will answer with its fallback");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app(state, &config)).await?;
    Ok(())
}
