/// Configuration management for File Depot
use crate::error::{DepotError, DepotResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default chunk size for blob content (255 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub staging: StagingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Maximum accepted request body for uploads, in bytes
    pub upload_limit: usize,
    /// Directory of static assets served for unmatched paths
    pub public_dir: PathBuf,
}

/// Blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the store database
    pub store_address: PathBuf,
    /// Database name; the file is `<store_address>/<database_name>.sqlite`
    pub database_name: String,
    pub chunk_size: usize,
    pub max_connections: u32,
}

/// How upload bodies reach the blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Multipart chunks are written straight into the upload sink
    Direct,
    /// The body is written to the staging directory first, then copied
    Staged,
}

impl FromStr for UploadMode {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(UploadMode::Direct),
            "staged" => Ok(UploadMode::Staged),
            other => Err(DepotError::Validation(format!(
                "Invalid upload mode: {}",
                other
            ))),
        }
    }
}

/// Staging area configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub directory: PathBuf,
    pub mode: UploadMode,
    /// Age after which a staged file is considered abandoned
    pub ttl_secs: u64,
}

impl StorageConfig {
    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.store_address
            .join(format!("{}.sqlite", self.database_name))
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DepotResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("DEPOT_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("DEPOT_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| DepotError::Validation("Invalid port number".to_string()))?;
        let upload_limit = env::var("DEPOT_UPLOAD_LIMIT")
            .unwrap_or_else(|_| "1073741824".to_string())
            .parse()
            .unwrap_or(1024 * 1024 * 1024);
        let public_dir = env::var("DEPOT_PUBLIC_DIR")
            .unwrap_or_else(|_| "./public".to_string())
            .into();

        let store_address = env::var("DEPOT_STORE_ADDRESS")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database_name =
            env::var("DEPOT_DATABASE_NAME").unwrap_or_else(|_| "depot".to_string());
        let chunk_size = env::var("DEPOT_CHUNK_SIZE")
            .ok()
            .map(|v| {
                v.parse()
                    .map_err(|_| DepotError::Validation("Invalid chunk size".to_string()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let max_connections = env::var("DEPOT_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let staging_directory = env::var("DEPOT_STAGING_DIR")
            .unwrap_or_else(|_| "./uploads".to_string())
            .into();
        let mode = env::var("DEPOT_UPLOAD_MODE")
            .unwrap_or_else(|_| "direct".to_string())
            .parse()?;
        let ttl_secs = env::var("DEPOT_STAGING_TTL")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                upload_limit,
                public_dir,
            },
            storage: StorageConfig {
                store_address,
                database_name,
                chunk_size,
                max_connections,
            },
            staging: StagingConfig {
                directory: staging_directory,
                mode,
                ttl_secs,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DepotResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DepotError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.storage.database_name.is_empty()
            || self
                .storage
                .database_name
                .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(DepotError::Validation(
                "Database name must be a plain, non-empty name".to_string(),
            ));
        }

        if self.storage.chunk_size == 0 {
            return Err(DepotError::Validation(
                "Chunk size must be greater than zero".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(DepotError::Validation(
                "At least one store connection is required".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 3000,
                upload_limit: 1024,
                public_dir: "./public".into(),
            },
            storage: StorageConfig {
                store_address: "./data".into(),
                database_name: "pruebas".to_string(),
                chunk_size: DEFAULT_CHUNK_SIZE,
                max_connections: 4,
            },
            staging: StagingConfig {
                directory: "./uploads".into(),
                mode: UploadMode::Direct,
                ttl_secs: 60,
            },
        }
    }

    #[test]
    fn test_upload_mode_parsing() {
        assert_eq!("direct".parse::<UploadMode>().unwrap(), UploadMode::Direct);
        assert_eq!(" Staged ".parse::<UploadMode>().unwrap(), UploadMode::Staged);
        assert!("buffered".parse::<UploadMode>().is_err());
    }

    #[test]
    fn test_database_path() {
        let config = sample_config();
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("./data").join("pruebas.sqlite")
        );
    }

    #[test]
    fn test_validate() {
        let config = sample_config();
        assert!(config.validate().is_ok());

        let mut bad = sample_config();
        bad.storage.chunk_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = sample_config();
        bad.storage.database_name = "../escape".to_string();
        assert!(bad.validate().is_err());

        let mut bad = sample_config();
        bad.service.hostname = String::new();
        assert!(bad.validate().is_err());
    }
}
