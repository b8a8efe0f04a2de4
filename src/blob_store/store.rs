/// Blob Store Manager
///
/// Chunked large-object bucket over the `fs_files` / `fs_chunks` tables
use crate::{
    blob_store::{DownloadStream, FileRecord, Revision, UploadStream},
    config::DEFAULT_CHUNK_SIZE,
    error::{DepotError, DepotResult},
};
use sqlx::SqlitePool;

/// Blob store configuration
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Size of every chunk except a file's last one
    pub chunk_size: usize,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Main blob store manager
#[derive(Clone)]
pub struct BlobStore {
    config: BlobStoreConfig,
    db: SqlitePool,
}

impl BlobStore {
    /// Create a new blob store
    pub fn new(config: BlobStoreConfig, db: SqlitePool) -> DepotResult<Self> {
        if config.chunk_size == 0 {
            return Err(DepotError::Validation(
                "Chunk size must be greater than zero".to_string(),
            ));
        }

        Ok(Self { config, db })
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Begin a new file under `filename`
    pub fn open_upload_stream(&self, filename: &str) -> UploadStream {
        UploadStream::new(self.db.clone(), filename, self.config.chunk_size)
    }

    /// Open a file for reading by id
    pub async fn open_download_stream(&self, id: &str) -> DepotResult<DownloadStream> {
        let record = self
            .find(id)
            .await?
            .ok_or_else(|| DepotError::NotFound(format!("File not found: {}", id)))?;

        Ok(DownloadStream::new(self.db.clone(), record))
    }

    /// Open a file for reading by name
    pub async fn open_download_stream_by_name(
        &self,
        filename: &str,
        revision: Revision,
    ) -> DepotResult<DownloadStream> {
        let record = self
            .find_by_name(filename, revision)
            .await?
            .ok_or_else(|| DepotError::NotFound(format!("File not found: {}", filename)))?;

        Ok(DownloadStream::new(self.db.clone(), record))
    }

    /// Look up a record by id
    pub async fn find(&self, id: &str) -> DepotResult<Option<FileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, length, chunk_size, upload_date
            FROM fs_files
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(FileRecord::from_row).transpose()
    }

    /// Look up a record by filename, picking among duplicates by revision
    pub async fn find_by_name(
        &self,
        filename: &str,
        revision: Revision,
    ) -> DepotResult<Option<FileRecord>> {
        let (order, offset) = revision.order_and_offset();
        let sql = format!(
            r#"
            SELECT id, filename, length, chunk_size, upload_date
            FROM fs_files
            WHERE filename = ?1
            ORDER BY seq {}
            LIMIT 1 OFFSET ?2
            "#,
            order
        );

        let row = sqlx::query(&sql)
            .bind(filename)
            .bind(offset)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(FileRecord::from_row).transpose()
    }

    /// List every record in upload order
    pub async fn list(&self) -> DepotResult<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, length, chunk_size, upload_date
            FROM fs_files
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(FileRecord::from_row).collect()
    }

    /// Delete a file record and its chunks
    pub async fn delete(&self, id: &str) -> DepotResult<()> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM fs_files WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            return Err(DepotError::NotFound(format!("File not found: {}", id)));
        }

        let chunks = sqlx::query("DELETE FROM fs_chunks WHERE files_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(id = %id, chunks = chunks.rows_affected(), "deleted file");
        Ok(())
    }

    /// Remove chunks that belong to no published record
    ///
    /// Uploads still in flight own such chunks too, so this only runs
    /// before the server starts accepting requests.
    pub async fn cleanup_orphaned_chunks(&self) -> DepotResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM fs_chunks
            WHERE files_id NOT IN (SELECT id FROM fs_files)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DatabaseOptions};
    use futures::StreamExt;
    use tempfile::{tempdir, TempDir};

    async fn create_test_store(chunk_size: usize) -> (BlobStore, TempDir) {
        let dir = tempdir().unwrap();
        let pool = db::open(&dir.path().join("depot.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();

        let store = BlobStore::new(BlobStoreConfig { chunk_size }, pool).unwrap();
        (store, dir)
    }

    async fn upload(store: &BlobStore, name: &str, data: &[u8]) -> FileRecord {
        let mut sink = store.open_upload_stream(name);
        sink.write(data).await.unwrap();
        sink.finish().await.unwrap()
    }

    async fn chunk_rows(store: &BlobStore) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fs_chunks")
            .fetch_one(&store.db)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_upload_and_download_round_trip() {
        let (store, _dir) = create_test_store(4).await;

        let record = upload(&store, "a.txt", b"helloworld").await;
        assert_eq!(record.filename, "a.txt");
        assert_eq!(record.length, 10);
        assert_eq!(record.chunk_size, 4);
        assert_eq!(chunk_rows(&store).await, 3);

        let stream = store
            .open_download_stream_by_name("a.txt", Revision::FIRST)
            .await
            .unwrap();
        assert_eq!(stream.record().id, record.id);
        assert_eq!(stream.record().length, 10);
        assert_eq!(stream.read_to_end().await.unwrap(), b"helloworld");
    }

    #[tokio::test]
    async fn test_download_yields_one_item_per_chunk() {
        let (store, _dir) = create_test_store(4).await;
        let record = upload(&store, "a.txt", b"helloworld").await;

        let chunks: Vec<_> = store
            .open_download_stream(&record.id)
            .await
            .unwrap()
            .map(|c| c.unwrap().to_vec())
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![b"hell".to_vec(), b"owor".to_vec(), b"ld".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_many_small_writes() {
        let (store, _dir) = create_test_store(3).await;

        let mut sink = store.open_upload_stream("pieces.bin");
        for piece in [&b"a"[..], b"bc", b"", b"defgh", b"i"] {
            sink.write(piece).await.unwrap();
        }
        assert_eq!(sink.bytes_written(), 9);
        let record = sink.finish().await.unwrap();
        assert_eq!(record.chunk_count(), 3);

        let data = store
            .open_download_stream(&record.id)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(data, b"abcdefghi");
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (store, _dir) = create_test_store(4).await;

        let record = upload(&store, "empty", b"").await;
        assert_eq!(record.length, 0);
        assert_eq!(chunk_rows(&store).await, 0);

        let data = store
            .open_download_stream(&record.id)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_record_invisible_until_finished() {
        let (store, _dir) = create_test_store(2).await;

        let mut sink = store.open_upload_stream("pending.bin");
        sink.write(b"abcdef").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store
            .find_by_name("pending.bin", Revision::FIRST)
            .await
            .unwrap()
            .is_none());

        sink.finish().await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_removes_chunks() {
        let (store, _dir) = create_test_store(2).await;

        let mut sink = store.open_upload_stream("aborted.bin");
        sink.write(b"abcdef").await.unwrap();
        assert_eq!(chunk_rows(&store).await, 3);

        sink.abort().await.unwrap();
        assert_eq!(chunk_rows(&store).await, 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let (store, _dir) = create_test_store(4).await;

        let result = store
            .open_download_stream_by_name("nope.txt", Revision::FIRST)
            .await;
        assert!(matches!(result, Err(DepotError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_in_upload_order() {
        let (store, _dir) = create_test_store(4).await;

        for name in ["c.txt", "a.txt", "b.txt"] {
            upload(&store, name, name.as_bytes()).await;
        }

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["c.txt", "a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_by_revision() {
        let (store, _dir) = create_test_store(4).await;

        let first = upload(&store, "dup.txt", b"first").await;
        let second = upload(&store, "dup.txt", b"second").await;
        assert_ne!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 2);

        let by_default = store
            .find_by_name("dup.txt", Revision::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_default.id, first.id);

        let latest = store
            .find_by_name("dup.txt", Revision::LATEST)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);

        let next = store
            .find_by_name("dup.txt", Revision(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, second.id);

        assert!(store
            .find_by_name("dup.txt", Revision(2))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_name("dup.txt", Revision(-3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_chunks() {
        let (store, _dir) = create_test_store(4).await;

        let keep = upload(&store, "keep.txt", b"keep me").await;
        let gone = upload(&store, "gone.txt", b"delete me").await;

        store.delete(&gone.id).await.unwrap();

        assert!(store.find(&gone.id).await.unwrap().is_none());
        assert_eq!(chunk_rows(&store).await, keep.chunk_count());
        assert!(matches!(
            store.open_download_stream(&gone.id).await,
            Err(DepotError::NotFound(_))
        ));

        let data = store
            .open_download_stream(&keep.id)
            .await
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(data, b"keep me");
    }

    #[tokio::test]
    async fn test_delete_unknown_id() {
        let (store, _dir) = create_test_store(4).await;
        upload(&store, "a.txt", b"data").await;

        let result = store.delete("no-such-id").await;
        assert!(matches!(result, Err(DepotError::NotFound(_))));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_chunk_fails_stream() {
        let (store, _dir) = create_test_store(4).await;
        let record = upload(&store, "broken.bin", b"helloworld").await;

        sqlx::query("DELETE FROM fs_chunks WHERE files_id = ?1 AND n = 1")
            .bind(&record.id)
            .execute(&store.db)
            .await
            .unwrap();

        let mut stream = store.open_download_stream(&record.id).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"hell");
        assert!(matches!(
            stream.next().await,
            Some(Err(DepotError::BlobStorage(_)))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_orphaned_chunks() {
        let (store, _dir) = create_test_store(2).await;

        let kept = upload(&store, "kept.bin", b"abcd").await;

        let mut sink = store.open_upload_stream("interrupted.bin");
        sink.write(b"abcdef").await.unwrap();
        // Simulate a crash: the sink never finishes and never cleans up
        std::mem::forget(sink);

        assert_eq!(chunk_rows(&store).await, 5);
        assert_eq!(store.cleanup_orphaned_chunks().await.unwrap(), 3);
        assert_eq!(chunk_rows(&store).await, kept.chunk_count());
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let (store, _dir) = create_test_store(4).await;
        let result = BlobStore::new(BlobStoreConfig { chunk_size: 0 }, store.db.clone());
        assert!(matches!(result, Err(DepotError::Validation(_))));
    }
}
