/// Database layer for File Depot
///
/// Manages the shared connection pool and the embedded migrations that
/// create the file metadata and chunk tables.

use crate::error::{DepotError, DepotResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> DepotResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            DepotError::Connection(format!("Failed to create store directory {:?}: {}", parent, e))
        })?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(|e| DepotError::Connection(format!("Failed to open {:?}: {}", path, e)))?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> DepotResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DepotError::Connection(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> DepotResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Open a pool at `path` and bring its schema up to date
pub async fn open(path: &Path, options: DatabaseOptions) -> DepotResult<SqlitePool> {
    let pool = create_pool(path, options).await?;
    run_migrations(&pool).await?;
    test_connection(&pool).await?;
    Ok(pool)
}
