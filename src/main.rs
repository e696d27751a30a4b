//! task-pipeline - HTTP Server Entry Point
//!
//! Starts the task gateway and the in-process enrichment consumer.

use task_pipeline::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: store={}, dispatch={:?}, consumer={}",
        config.database_url, config.dispatch_mode, config.consumer_enabled
    );

    // Any startup failure returns here and exits non-zero.
    api::serve(config).await?;

    Ok(())
}
