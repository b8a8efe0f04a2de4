/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{DepotError, DepotResult},
};
use axum::{extract::DefaultBodyLimit, Router};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let upload_limit = ctx.config.service.upload_limit;
    let public_dir = ctx.config.service.public_dir.clone();

    Router::new()
        .merge(crate::api::routes())
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx)
        // Static assets for anything not matched above
        .fallback_service(ServeDir::new(public_dir))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn serve(ctx: AppContext) -> DepotResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    let app = build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DepotError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("File Depot listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DepotError::Internal(format!("Server error: {}", e)))?;

    ctx.close().await;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
