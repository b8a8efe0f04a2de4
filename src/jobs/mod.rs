use crate::context::AppContext;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::staging_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Remove abandoned staged files (runs every 15 minutes)
    async fn staging_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match tasks::cleanup_abandoned_staged_files(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} abandoned staged files", count);
                    }
                }
                Err(e) => error!("Failed to cleanup staged files: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
