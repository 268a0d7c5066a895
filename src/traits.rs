//! The folder provider seam.
//!
//! Everything the pipeline knows about storage goes through
//! [`FolderProvider`]. Two implementations ship with the crate:
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │            FolderProvider            │
//! │  ┌──────────────┐  ┌──────────────┐  │
//! │  │ Filesystem   │  │ S3-compatible│  │
//! │  │ (local dir)  │  │ (bucket/pfx) │  │
//! │  └──────────────┘  └──────────────┘  │
//! └──────────────────┬───────────────────┘
//!                    ▼
//!       Ingestor::report() → parser → aggregate
//! ```
//!
//! Tests and embedders can supply their own implementation, e.g. an
//! in-memory folder.

use async_trait::async_trait;

use crate::error::IngestResult;
use crate::models::SourceFile;

/// A folder of dated spreadsheet exports.
///
/// # Contract
///
/// - [`list`](FolderProvider::list) returns only files with an accepted
///   extension and a parseable date token (see
///   [`crate::sources::describe_file`]). An empty folder is `Ok(vec![])`.
///   A folder that cannot be reached is
///   [`IngestError::SourceUnavailable`](crate::error::IngestError::SourceUnavailable).
/// - [`open`](FolderProvider::open) returns the raw bytes of one file.
/// - [`upload`](FolderProvider::upload) stores a new file and returns its
///   descriptor. Implementations call
///   [`crate::sources::validate_upload`] first.
#[async_trait]
pub trait FolderProvider: Send + Sync {
    /// Label used in logs and error messages (e.g. `"filesystem:./data"`).
    fn name(&self) -> String;

    async fn list(&self) -> IngestResult<Vec<SourceFile>>;

    async fn open(&self, file: &SourceFile) -> IngestResult<Vec<u8>>;

    async fn upload(&self, name: &str, bytes: &[u8]) -> IngestResult<SourceFile>;
}
