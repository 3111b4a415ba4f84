use std::sync::Arc;

use salvo::conn::TcpListener;
use salvo::{Listener, Router};

use cairn_app::app::api::routes;
use cairn_app::state::ServerState;
use cairn_core::config::load_config;
use cairn_repo::{FsActivityStore, MemoryRepository};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting cairn repository server");

    let config = load_config()?;

    tracing::info!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let repo = Arc::new(MemoryRepository::new());
    let activities = Arc::new(FsActivityStore::open(&config.repository.activities_dir)?);
    let context = config.repository.context_path();

    tracing::info!(context = %context, activities = %config.repository.activities_dir, "Repository opened");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let acceptor = TcpListener::new(bind_addr.clone()).bind().await;

    let state = ServerState::new(repo, activities, context);
    let router = Router::new().push(routes(state));

    tracing::info!("Server listening on {bind_addr}");

    salvo::Server::new(acceptor).serve(router).await;

    Ok(())
}
