/// Blob Storage System
///
/// Chunked large-object storage: file content is split into fixed-size
/// chunks (`fs_chunks`) and described by one metadata record (`fs_files`).
/// Records are addressed by their store-assigned id; filenames are labels
/// used only for lookup.

pub mod download;
pub mod models;
pub mod store;
pub mod upload;

pub use download::DownloadStream;
pub use models::*;
pub use store::{BlobStore, BlobStoreConfig};
pub use upload::UploadStream;
