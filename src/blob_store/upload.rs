/// Upload sink for the chunked blob store
use crate::{
    blob_store::FileRecord,
    error::{DepotError, DepotResult},
};
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Open,
    Finished,
    Aborted,
}

/// Write sink for one new file
///
/// Bytes are cut into `chunk_size` chunks and written as each chunk fills.
/// The file record is published only by [`UploadStream::finish`], so readers
/// never observe a partially written file. A sink dropped while still open
/// removes its chunks in a background task.
pub struct UploadStream {
    db: SqlitePool,
    id: String,
    filename: String,
    chunk_size: usize,
    buffer: Vec<u8>,
    chunks_written: i64,
    length: i64,
    state: UploadState,
}

impl UploadStream {
    pub(crate) fn new(db: SqlitePool, filename: &str, chunk_size: usize) -> Self {
        Self {
            db,
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            chunks_written: 0,
            length: 0,
            state: UploadState::Open,
        }
    }

    /// Id the record will carry once finished
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> i64 {
        self.length + self.buffer.len() as i64
    }

    /// Append bytes to the file
    pub async fn write(&mut self, mut data: &[u8]) -> DepotResult<()> {
        self.ensure_open()?;

        while !data.is_empty() {
            // Whole chunks straight from the input skip the buffer
            if self.buffer.is_empty() && data.len() >= self.chunk_size {
                let (chunk, rest) = data.split_at(self.chunk_size);
                self.insert_chunk(self.chunks_written, chunk).await?;
                self.chunks_written += 1;
                self.length += chunk.len() as i64;
                data = rest;
                continue;
            }

            let take = (self.chunk_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == self.chunk_size {
                self.flush_buffer().await?;
            }
        }

        Ok(())
    }

    /// Flush the trailing chunk and publish the file record
    pub async fn finish(mut self) -> DepotResult<FileRecord> {
        self.ensure_open()?;

        if !self.buffer.is_empty() {
            self.flush_buffer().await?;
        }

        let record = FileRecord {
            id: self.id.clone(),
            filename: self.filename.clone(),
            length: self.length,
            chunk_size: self.chunk_size as i64,
            upload_date: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO fs_files (id, filename, length, chunk_size, upload_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(record.length)
        .bind(record.chunk_size)
        .bind(record.upload_date)
        .execute(&self.db)
        .await?;

        self.state = UploadState::Finished;

        tracing::debug!(
            id = %record.id,
            filename = %record.filename,
            length = record.length,
            chunks = self.chunks_written,
            "upload finished"
        );

        Ok(record)
    }

    /// Discard the upload and remove any chunks already written
    pub async fn abort(mut self) -> DepotResult<()> {
        self.ensure_open()?;
        self.state = UploadState::Aborted;
        self.buffer.clear();

        if self.chunks_written > 0 {
            delete_chunks(&self.db, &self.id).await?;
        }

        tracing::debug!(id = %self.id, filename = %self.filename, "upload aborted");
        Ok(())
    }

    fn ensure_open(&self) -> DepotResult<()> {
        match self.state {
            UploadState::Open => Ok(()),
            UploadState::Finished => Err(DepotError::Internal(format!(
                "Upload {} is already finished",
                self.id
            ))),
            UploadState::Aborted => Err(DepotError::Internal(format!(
                "Upload {} was aborted",
                self.id
            ))),
        }
    }

    async fn flush_buffer(&mut self) -> DepotResult<()> {
        self.insert_chunk(self.chunks_written, &self.buffer).await?;
        self.chunks_written += 1;
        self.length += self.buffer.len() as i64;
        self.buffer.clear();
        Ok(())
    }

    async fn insert_chunk(&self, n: i64, data: &[u8]) -> DepotResult<()> {
        sqlx::query("INSERT INTO fs_chunks (files_id, n, data) VALUES (?1, ?2, ?3)")
            .bind(&self.id)
            .bind(n)
            .bind(data)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

impl Drop for UploadStream {
    fn drop(&mut self) {
        if self.state != UploadState::Open || self.chunks_written == 0 {
            return;
        }

        tracing::warn!(
            id = %self.id,
            filename = %self.filename,
            chunks = self.chunks_written,
            "upload dropped before finishing, removing chunks"
        );

        // Without a runtime the chunks stay behind for the startup sweep
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let db = self.db.clone();
            let id = std::mem::take(&mut self.id);
            handle.spawn(async move {
                if let Err(e) = delete_chunks(&db, &id).await {
                    tracing::error!(id = %id, error = %e, "failed to remove chunks of dropped upload");
                }
            });
        }
    }
}

async fn delete_chunks(db: &SqlitePool, files_id: &str) -> DepotResult<u64> {
    let result = sqlx::query("DELETE FROM fs_chunks WHERE files_id = ?1")
        .bind(files_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
