//! Local filesystem folder provider.
//!
//! Lists spreadsheets directly inside the configured folder (no recursion,
//! exports are dropped flat), creating the folder on first use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};
use crate::models::SourceFile;
use crate::sources::{describe_file, validate_upload};
use crate::traits::FolderProvider;

pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> IngestResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            IngestError::unavailable(
                self.name(),
                format!("cannot create {}: {}", self.root.display(), e),
            )
        })
    }
}

#[async_trait]
impl FolderProvider for FilesystemProvider {
    fn name(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }

    async fn list(&self) -> IngestResult<Vec<SourceFile>> {
        self.ensure_root()?;
        scan_folder(&self.root).map_err(|e| IngestError::unavailable(self.name(), e))
    }

    async fn open(&self, file: &SourceFile) -> IngestResult<Vec<u8>> {
        std::fs::read(self.root.join(&file.handle))
            .map_err(|e| IngestError::malformed(&file.name, format!("cannot read: {}", e)))
    }

    async fn upload(&self, name: &str, bytes: &[u8]) -> IngestResult<SourceFile> {
        validate_upload(name, bytes)?;
        self.ensure_root()?;

        let path = self.root.join(name);
        std::fs::write(&path, bytes).map_err(|e| {
            IngestError::unavailable(self.name(), format!("cannot write {}: {}", name, e))
        })?;
        log::info!("stored upload {}", path.display());

        let metadata = std::fs::metadata(&path)
            .map_err(|e| IngestError::unavailable(self.name(), e))?;
        describe_file(name, name, modified_utc(&metadata), metadata.len())
            .ok_or_else(|| IngestError::invalid_upload(name, "not an ingestible file name"))
    }
}

fn scan_folder(root: &Path) -> Result<Vec<SourceFile>, walkdir::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let metadata = entry.metadata()?;
        if let Some(file) = describe_file(&name, &name, modified_utc(&metadata), metadata.len()) {
            files.push(file);
        }
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.handle.cmp(&b.handle));
    Ok(files)
}

fn modified_utc(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified)
}
