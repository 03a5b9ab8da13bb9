use std::sync::Arc;

use anyhow::Result;

use datadeck::config::Config;
use datadeck::logging;
use datadeck::services::db_loader::DbLoader;
use datadeck::services::workspace::Workspace;
use datadeck::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = Config::from_env()?;
    tracing::info!("Starting with store at {}", config.db_path);

    let store = Arc::new(DbLoader::open(&config.db_path)?);
    let workspace = Workspace::load(store)?;

    let addr = config.bind_addr;
    let app = datadeck::app(Arc::new(AppState::new(config, workspace)));

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
