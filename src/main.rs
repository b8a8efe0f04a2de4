use file_depot::{config::ServerConfig, context::AppContext, error::DepotResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> DepotResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_depot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("File Depot v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Clear leftovers of uploads interrupted by a previous shutdown
    jobs::tasks::recover_interrupted_uploads(&ctx).await?;

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::new(ctx.clone())));
    scheduler.start();

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
