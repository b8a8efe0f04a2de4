/// Health check endpoints
///
/// - `/health`: the process is up and answering
/// - `/health/ready`: the store and staging directory are usable

use crate::{context::AppContext, db, error::{DepotError, DepotResult}};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    /// Status: "healthy" or "unhealthy"
    pub status: String,

    pub response_time_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe
///
/// Returns 200 when every component is healthy, 503 otherwise.
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> (StatusCode, Json<serde_json::Value>) {
    let checks = vec![
        component("database", check_database(&ctx)).await,
        component("staging", check_staging(&ctx)).await,
    ];

    let ready = checks.iter().all(|c| c.status == "healthy");
    if !ready {
        tracing::warn!("readiness_probe_failed");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "unavailable" },
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks,
        })),
    )
}

async fn component(
    name: &str,
    check: impl std::future::Future<Output = DepotResult<()>>,
) -> ComponentHealth {
    let start = Instant::now();
    let result = check.await;

    if let Err(e) = &result {
        tracing::warn!(component = name, error = %e, "health check failed");
    }

    ComponentHealth {
        name: name.to_string(),
        status: if result.is_ok() { "healthy" } else { "unhealthy" }.to_string(),
        response_time_ms: start.elapsed().as_millis() as u64,
        error: result.err().map(|_| "unhealthy".to_string()),
    }
}

/// Check database connectivity
async fn check_database(ctx: &AppContext) -> DepotResult<()> {
    db::test_connection(&ctx.db).await
}

/// Check the staging directory exists and is a directory
async fn check_staging(ctx: &AppContext) -> DepotResult<()> {
    let metadata = tokio::fs::metadata(ctx.staging.directory()).await?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(DepotError::Staging(format!(
            "{:?} is not a directory",
            ctx.staging.directory()
        )))
    }
}
