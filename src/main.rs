use std::sync::Arc;

use clap::Parser;
use tracing::info;

use saferoute::config::{Cli, Config};
use saferoute::{AppState, MemoryStore, build_router, spawn_feed_refresh};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting saferoute v{}", env!("CARGO_PKG_VERSION"));

    // 1. Resolve configuration (CLI > file > defaults)
    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;
    info!(
        "Scoring policy: radius {} km, report penalty {}",
        config.engine.proximity_radius_km, config.engine.report_penalty
    );

    // 2. Initialize safety data
    let store = if config.server.seed_landmarks {
        MemoryStore::seeded()?
    } else {
        MemoryStore::new()
    };
    let store = Arc::new(store);

    // 3. Keep the report feed fresh
    let (feed, _refresh) = spawn_feed_refresh(store.clone(), config.server.refresh_interval());

    // 4. Setup router
    let app = build_router(AppState::new(store, &config, feed));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("API server running on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
