/// Multipart upload endpoint
use crate::{
    blob_store::{BlobStore, FileRecord, UploadStream},
    config::UploadMode,
    context::AppContext,
    error::{DepotError, DepotResult},
    staging::StagedFile,
};
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

const UPLOAD_FAILED: &str = "Failed to upload the file to the store";

/// Build upload routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/upload", post(upload_file))
}

/// Upload acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receive the multipart field `file` and store it under its client filename
async fn upload_file(
    State(ctx): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Json<UploadResponse>) {
    let result = match multipart {
        Ok(mut multipart) => receive_upload(&ctx, &mut multipart).await,
        Err(rejection) => Err(DepotError::Upload(rejection.body_text())),
    };

    match result {
        Ok(record) => {
            tracing::info!(
                id = %record.id,
                filename = %record.filename,
                length = record.length,
                "file uploaded to store"
            );
            (
                StatusCode::OK,
                Json(UploadResponse {
                    success: true,
                    error: None,
                }),
            )
        }
        Err(e) => {
            let status = e.status();
            let message = match e {
                DepotError::Upload(ref msg) => {
                    tracing::warn!(error = %e, "rejected upload");
                    msg.clone()
                }
                _ => {
                    tracing::error!(error = %e, "{}", UPLOAD_FAILED);
                    UPLOAD_FAILED.to_string()
                }
            };
            (
                status,
                Json(UploadResponse {
                    success: false,
                    error: Some(message),
                }),
            )
        }
    }
}

async fn receive_upload(ctx: &AppContext, multipart: &mut Multipart) -> DepotResult<FileRecord> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DepotError::Upload("The file field has no filename".to_string()))?;

        return match ctx.config.staging.mode {
            UploadMode::Direct => store_direct(&ctx.blob_store, &mut field, &filename).await,
            UploadMode::Staged => {
                let mut staged = ctx.staging.create().await?;
                let result =
                    store_staged(&ctx.blob_store, &mut field, &mut staged, &filename).await;
                if let Err(e) = staged.remove().await {
                    tracing::error!(error = %e, "failed to clean up staged upload");
                }
                result
            }
        };
    }

    Err(DepotError::Upload("No file provided".to_string()))
}

/// Pipe the multipart field straight into a new upload sink
async fn store_direct(
    store: &BlobStore,
    field: &mut Field<'_>,
    filename: &str,
) -> DepotResult<FileRecord> {
    let mut sink = store.open_upload_stream(filename);

    let copied = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            sink.write(&chunk).await?;
        }
        Ok::<_, DepotError>(())
    }
    .await;

    finish_or_abort(sink, copied).await
}

/// Write the field to the staging area, then copy the staged bytes into the store
async fn store_staged(
    store: &BlobStore,
    field: &mut Field<'_>,
    staged: &mut StagedFile,
    filename: &str,
) -> DepotResult<FileRecord> {
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        staged.write(&chunk).await?;
    }

    tracing::debug!(path = ?staged.path(), length = staged.len(), "upload staged");

    let mut reader = staged.reopen().await?;
    let mut sink = store.open_upload_stream(filename);
    let mut buf = vec![0u8; store.chunk_size()];

    let copied = async {
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| DepotError::Staging(format!("Failed to read staged file: {}", e)))?;
            if n == 0 {
                break;
            }
            sink.write(&buf[..n]).await?;
        }
        Ok::<_, DepotError>(())
    }
    .await;

    finish_or_abort(sink, copied).await
}

async fn finish_or_abort(sink: UploadStream, copied: DepotResult<()>) -> DepotResult<FileRecord> {
    match copied {
        Ok(()) => sink.finish().await,
        Err(e) => {
            let id = sink.id().to_string();
            if let Err(abort_err) = sink.abort().await {
                tracing::error!(id = %id, error = %abort_err, "failed to abort upload");
            }
            Err(e)
        }
    }
}

fn multipart_error(e: MultipartError) -> DepotError {
    DepotError::Upload(e.body_text())
}
