/// File download and delete endpoints
use crate::{
    blob_store::{DownloadStream, Revision},
    context::AppContext,
    error::{DepotError, DepotResult},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use serde::Deserialize;

const FILE_NOT_FOUND: &str = "The file was not found in the database.";
const DOWNLOAD_FAILED: &str = "An error occurred while downloading the file.";
const DELETE_FAILED: &str = "An error occurred while deleting the file.";

/// Build file routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/download/:filename", get(download_file))
        .route("/delete/:filename", post(delete_file))
}

/// Optional `?revision=` selector for duplicate filenames
#[derive(Debug, Default, Deserialize)]
pub struct RevisionQuery {
    #[serde(default)]
    pub revision: i64,
}

impl RevisionQuery {
    pub fn revision(&self) -> Revision {
        Revision(self.revision)
    }
}

/// Stream a file back as an attachment
async fn download_file(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
    Query(query): Query<RevisionQuery>,
) -> Response {
    let stream = match ctx
        .blob_store
        .open_download_stream_by_name(&filename, query.revision())
        .await
    {
        Ok(stream) => stream,
        Err(e @ DepotError::NotFound(_)) => return e.into_plain_response(FILE_NOT_FOUND),
        Err(e) => return e.into_plain_response(DOWNLOAD_FAILED),
    };

    tracing::info!(
        id = %stream.record().id,
        filename = %filename,
        length = stream.record().length,
        "download started"
    );

    attachment_response(&filename, stream)
        .unwrap_or_else(|e| e.into_plain_response(DOWNLOAD_FAILED))
}

/// Delete the file matching a name, then send the client back to the listing
async fn delete_file(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
    Query(query): Query<RevisionQuery>,
) -> Response {
    let record = match ctx
        .blob_store
        .find_by_name(&filename, query.revision())
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => {
            return DepotError::NotFound(filename).into_plain_response(FILE_NOT_FOUND);
        }
        Err(e) => return e.into_plain_response(DELETE_FAILED),
    };

    match ctx.blob_store.delete(&record.id).await {
        Ok(()) => (StatusCode::FOUND, [(header::LOCATION, "/files")]).into_response(),
        Err(e @ DepotError::NotFound(_)) => e.into_plain_response(FILE_NOT_FOUND),
        Err(e) => e.into_plain_response(DELETE_FAILED),
    }
}

fn attachment_response(filename: &str, stream: DownloadStream) -> DepotResult<Response> {
    let disposition = HeaderValue::from_bytes(content_disposition(filename).as_bytes())
        .map_err(|e| DepotError::Internal(format!("Invalid Content-Disposition: {}", e)))?;
    let length = stream.record().length;
    let id = stream.record().id.clone();

    let body = Body::from_stream(stream.inspect_err(move |e| {
        tracing::error!(id = %id, error = %e, "download aborted mid-stream");
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, length.to_string())
        .body(body)
        .map_err(|e| DepotError::Internal(format!("Failed to build response: {}", e)))
}

/// `attachment; filename="..."` with quotes escaped and control characters
/// dropped; non-ASCII names also get an RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> String {
    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars().filter(|c| !c.is_control()) {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }

    if filename.is_ascii() {
        format!("attachment; filename=\"{}\"", quoted)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            quoted,
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_plain() {
        assert_eq!(
            content_disposition("a.txt"),
            "attachment; filename=\"a.txt\""
        );
        assert_eq!(
            content_disposition("report 2024.pdf"),
            "attachment; filename=\"report 2024.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_escapes() {
        assert_eq!(
            content_disposition("say \"hi\".txt"),
            "attachment; filename=\"say \\\"hi\\\".txt\""
        );
        assert_eq!(
            content_disposition("bad\r\nSet-Cookie: x"),
            "attachment; filename=\"badSet-Cookie: x\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        assert_eq!(
            content_disposition("año.txt"),
            "attachment; filename=\"año.txt\"; filename*=UTF-8''a%C3%B1o.txt"
        );
        assert!(HeaderValue::from_bytes(content_disposition("año.txt").as_bytes()).is_ok());
    }

    #[test]
    fn test_revision_query_default() {
        assert_eq!(RevisionQuery::default().revision(), Revision::FIRST);
    }
}
