/// File Depot - web file repository
///
/// Accepts uploads over HTTP, stores them as chunked blobs in an embedded
/// database, lists them, streams them back, and deletes them by name.

pub mod api;
pub mod blob_store;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod server;
pub mod staging;
