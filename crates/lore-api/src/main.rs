//! lorekeep HTTP API server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use lore_api::{build_app, build_rate_limiter, config::ServerConfig, logging, AppState};
use lore_db::{Database, PoolConfig};
use lore_tagger::HttpTagger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let _log_guard = logging::init_logging(&config.log);

    let pool_config = PoolConfig::new().max_connections(config.db_max_connections);
    let db = Database::connect_with_config(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;
    info!(subsystem = "api", "Database ready");

    let mut state = AppState::new(db);

    match HttpTagger::from_env().context("invalid tagger configuration")? {
        Some(tagger) => {
            info!(subsystem = "api", url = %tagger.config().url, "Tagger enabled");
            state = state.with_tagger(Arc::new(tagger));
        }
        None => warn!(subsystem = "api", "Tagger disabled, notes will not be tagged"),
    }

    match config.rate_limit {
        Some(limit) => {
            if let Some(limiter) = build_rate_limiter(limit) {
                info!(
                    subsystem = "api",
                    requests = limit.requests,
                    period_secs = limit.period_secs,
                    "Rate limiting enabled"
                );
                state = state.with_rate_limiter(limiter);
            }
        }
        None => info!(subsystem = "api", "Rate limiting disabled"),
    }

    let app = build_app(state, &config);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
