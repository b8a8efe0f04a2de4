/// Staging area for uploads
///
/// Holds request bodies on local disk between the HTTP layer and the blob
/// store when the service runs in staged mode. Staged files are named by a
/// fresh UUID, never by the client's filename.

use crate::error::{DepotError, DepotResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Staging directory manager
#[derive(Debug, Clone)]
pub struct StagingArea {
    directory: PathBuf,
}

impl StagingArea {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the staging directory if missing
    pub async fn ensure(&self) -> DepotResult<()> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            DepotError::Staging(format!(
                "Failed to create staging directory {:?}: {}",
                self.directory, e
            ))
        })
    }

    /// Create an empty staged file
    pub async fn create(&self) -> DepotResult<StagedFile> {
        let path = self.directory.join(format!("{}.part", uuid::Uuid::new_v4()));
        let file = fs::File::create(&path).await.map_err(|e| {
            DepotError::Staging(format!("Failed to create staged file {:?}: {}", path, e))
        })?;

        Ok(StagedFile {
            path,
            file: Some(file),
            length: 0,
            removed: false,
        })
    }

    /// Remove staged files, or only those older than `older_than`
    ///
    /// Returns the number of files removed.
    pub async fn sweep(&self, older_than: Option<Duration>) -> DepotResult<usize> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(DepotError::Staging(format!(
                    "Failed to read staging directory: {}",
                    e
                )))
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            if let Some(ttl) = older_than {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < ttl {
                    continue;
                }
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = ?entry.path(), error = %e, "failed to remove staged file")
                }
            }
        }

        Ok(removed)
    }
}

/// One staged upload body
///
/// The file is removed by [`StagedFile::remove`], or on drop if that was
/// never reached.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file: Option<fs::File>,
    length: u64,
    removed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Append bytes to the staged file
    pub async fn write(&mut self, data: &[u8]) -> DepotResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            DepotError::Staging(format!("Staged file {:?} is already sealed", self.path))
        })?;

        file.write_all(data)
            .await
            .map_err(|e| DepotError::Staging(format!("Failed to write staged file: {}", e)))?;
        self.length += data.len() as u64;
        Ok(())
    }

    /// Flush and close the writer, returning a reader positioned at the start
    pub async fn reopen(&mut self) -> DepotResult<fs::File> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| DepotError::Staging(format!("Failed to flush staged file: {}", e)))?;
        }

        fs::File::open(&self.path)
            .await
            .map_err(|e| DepotError::Staging(format!("Failed to reopen staged file: {}", e)))
    }

    /// Delete the staged file
    pub async fn remove(mut self) -> DepotResult<()> {
        self.file.take();
        self.removed = true;

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DepotError::Staging(format!(
                "Failed to delete staged file {:?}: {}",
                self.path, e
            ))),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(path = ?self.path, error = %e, "failed to remove staged file");
            }
        }
    }
}
