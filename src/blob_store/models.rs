/// Blob storage data models
use crate::error::DepotResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// File metadata record, published when an upload finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub length: i64,
    pub chunk_size: i64,
    pub upload_date: DateTime<Utc>,
}

impl FileRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> DepotResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            length: row.try_get("length")?,
            chunk_size: row.try_get("chunk_size")?,
            upload_date: row.try_get("upload_date")?,
        })
    }

    /// Number of chunks holding this file's content
    pub fn chunk_count(&self) -> i64 {
        if self.length == 0 || self.chunk_size <= 0 {
            0
        } else {
            (self.length + self.chunk_size - 1) / self.chunk_size
        }
    }

    /// Expected byte length of chunk `n`
    pub fn chunk_len(&self, n: i64) -> i64 {
        let last = self.chunk_count() - 1;
        if n < last {
            self.chunk_size
        } else if n == last {
            self.length - last * self.chunk_size
        } else {
            0
        }
    }
}

/// Selects one record among those sharing a filename
///
/// Non-negative values count from the first upload (0 is the oldest);
/// negative values count back from the newest (-1 is the latest).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl Revision {
    pub const FIRST: Revision = Revision(0);
    pub const LATEST: Revision = Revision(-1);

    /// Sort direction and offset used to resolve this revision
    pub(crate) fn order_and_offset(self) -> (&'static str, i64) {
        if self.0 >= 0 {
            ("ASC", self.0)
        } else {
            ("DESC", -(self.0 + 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(length: i64, chunk_size: i64) -> FileRecord {
        FileRecord {
            id: "id".to_string(),
            filename: "a.txt".to_string(),
            length,
            chunk_size,
            upload_date: Utc::now(),
        }
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(record(0, 4).chunk_count(), 0);
        assert_eq!(record(1, 4).chunk_count(), 1);
        assert_eq!(record(4, 4).chunk_count(), 1);
        assert_eq!(record(10, 4).chunk_count(), 3);
    }

    #[test]
    fn test_chunk_len() {
        let r = record(10, 4);
        assert_eq!(r.chunk_len(0), 4);
        assert_eq!(r.chunk_len(1), 4);
        assert_eq!(r.chunk_len(2), 2);
        assert_eq!(r.chunk_len(3), 0);

        let exact = record(8, 4);
        assert_eq!(exact.chunk_len(1), 4);
    }

    #[test]
    fn test_revision_resolution() {
        assert_eq!(Revision::FIRST.order_and_offset(), ("ASC", 0));
        assert_eq!(Revision(2).order_and_offset(), ("ASC", 2));
        assert_eq!(Revision::LATEST.order_and_offset(), ("DESC", 0));
        assert_eq!(Revision(-3).order_and_offset(), ("DESC", 2));
    }

    #[test]
    fn test_revision_extremes_do_not_overflow() {
        assert_eq!(Revision(i64::MIN).order_and_offset(), ("DESC", i64::MAX));
        assert_eq!(Revision(i64::MAX).order_and_offset(), ("ASC", i64::MAX));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record(10, 4)).unwrap();
        assert_eq!(json["filename"], "a.txt");
        assert_eq!(json["chunkSize"], 4);
        assert!(json.get("uploadDate").is_some());
    }
}
