/// Background task implementations
use crate::{context::AppContext, db, error::DepotResult};
use std::time::Duration;

/// Recover from an interrupted previous run
///
/// Must run before the server accepts requests: every chunk without a record
/// and every staged file at this point belongs to an upload that died.
pub async fn recover_interrupted_uploads(ctx: &AppContext) -> DepotResult<(u64, usize)> {
    let chunks = ctx.blob_store.cleanup_orphaned_chunks().await?;
    let staged = ctx.staging.sweep(None).await?;

    if chunks > 0 || staged > 0 {
        tracing::warn!(
            orphaned_chunks = chunks,
            staged_files = staged,
            "removed leftovers of interrupted uploads"
        );
    }

    Ok((chunks, staged))
}

/// Remove staged files older than the configured TTL
pub async fn cleanup_abandoned_staged_files(ctx: &AppContext) -> DepotResult<usize> {
    let ttl = Duration::from_secs(ctx.config.staging.ttl_secs);
    ctx.staging.sweep(Some(ttl)).await
}

/// Health check - verify the store is reachable
pub async fn health_check(ctx: &AppContext) -> DepotResult<()> {
    db::test_connection(&ctx.db).await
}
