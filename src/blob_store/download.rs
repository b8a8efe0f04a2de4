/// Lazy reader over a stored file's chunks
use crate::{
    blob_store::FileRecord,
    error::{DepotError, DepotResult},
};
use bytes::Bytes;
use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt, TryStreamExt,
};
use sqlx::{Row, SqlitePool};
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// Forward-only stream of a file's bytes, one chunk per item
///
/// Chunks are fetched on demand. A missing chunk, or one whose size does not
/// match the record, ends the stream with [`DepotError::BlobStorage`].
pub struct DownloadStream {
    record: FileRecord,
    inner: BoxStream<'static, DepotResult<Bytes>>,
}

impl DownloadStream {
    pub(crate) fn new(db: SqlitePool, record: FileRecord) -> Self {
        let layout = record.clone();
        let inner = stream::try_unfold(0i64, move |n| {
            next_chunk(db.clone(), layout.clone(), n)
        })
        .boxed();

        Self { record, inner }
    }

    /// Metadata of the file being read
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// Drain the stream into memory
    pub async fn read_to_end(self) -> DepotResult<Vec<u8>> {
        let capacity = self.record.length.max(0) as usize;
        self.try_fold(Vec::with_capacity(capacity), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
    }
}

impl Stream for DownloadStream {
    type Item = DepotResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

async fn next_chunk(
    db: SqlitePool,
    record: FileRecord,
    n: i64,
) -> DepotResult<Option<(Bytes, i64)>> {
    if n >= record.chunk_count() {
        return Ok(None);
    }

    let row = sqlx::query("SELECT data FROM fs_chunks WHERE files_id = ?1 AND n = ?2")
        .bind(&record.id)
        .bind(n)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| {
            DepotError::BlobStorage(format!("Chunk {} of file {} is missing", n, record.id))
        })?;

    let data: Vec<u8> = row.try_get("data")?;
    let expected = record.chunk_len(n);
    if data.len() as i64 != expected {
        return Err(DepotError::BlobStorage(format!(
            "Chunk {} of file {} has {} bytes, expected {}",
            n,
            record.id,
            data.len(),
            expected
        )));
    }

    Ok(Some((Bytes::from(data), n + 1)))
}
