/// HTML pages: landing page and file listing
use crate::{
    blob_store::FileRecord,
    context::AppContext,
    error::{DepotError, DepotResult},
};
use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;

const LIST_FAILED: &str = "An error occurred while fetching uploaded files.";

/// Build page routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(index))
        .route("/files", get(list_files))
}

/// Landing page with the upload form
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    version: &'a str,
}

/// One listing row; `revision` tells duplicate names apart in links
struct FileEntry<'a> {
    record: &'a FileRecord,
    revision: i64,
}

/// Listing of every stored file
#[derive(Template)]
#[template(path = "files.html")]
struct FilesTemplate<'a> {
    files: Vec<FileEntry<'a>>,
}

impl<'a> FilesTemplate<'a> {
    fn new(records: &'a [FileRecord]) -> Self {
        let mut seen: HashMap<&str, i64> = HashMap::new();
        let files = records
            .iter()
            .map(|record| {
                let count = seen.entry(record.filename.as_str()).or_insert(0);
                let entry = FileEntry {
                    record,
                    revision: *count,
                };
                *count += 1;
                entry
            })
            .collect();

        Self { files }
    }
}

async fn index() -> DepotResult<Response> {
    render(&IndexTemplate {
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_files(State(ctx): State<AppContext>) -> Response {
    let files = match ctx.blob_store.list().await {
        Ok(files) => files,
        Err(e) => return e.into_plain_response(LIST_FAILED),
    };

    render(&FilesTemplate::new(&files)).unwrap_or_else(|e| e.into_plain_response(LIST_FAILED))
}

fn render<T: Template>(template: &T) -> DepotResult<Response> {
    let html = template.render().map_err(DepotError::from)?;
    Ok(Html(html).into_response())
}
