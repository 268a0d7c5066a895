//! Error taxonomy for the ingestion pipeline.
//!
//! Only two conditions are fatal to anything: a folder that cannot be reached
//! aborts the whole pass, and a file that cannot be decoded is skipped by the
//! pipeline. Rows with missing required fields are not errors at all; the
//! parser drops them and counts them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The folder, bucket, or credentials behind it could not be reached.
    #[error("source unavailable ({provider}): {reason}")]
    SourceUnavailable { provider: String, reason: String },

    /// One file could not be opened or decoded as a workbook.
    #[error("malformed source {file}: {reason}")]
    MalformedSource { file: String, reason: String },

    /// An upload was rejected before reaching the provider.
    #[error("invalid upload {name}: {reason}")]
    InvalidUpload { name: String, reason: String },
}

impl IngestError {
    pub fn unavailable(provider: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        IngestError::SourceUnavailable {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        IngestError::MalformedSource {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_upload(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        IngestError::InvalidUpload {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the whole ingestion pass has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::SourceUnavailable { .. })
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_source_unavailable_is_fatal() {
        assert!(IngestError::unavailable("s3:exports", "no credentials").is_fatal());
        assert!(!IngestError::malformed("a_20251101.xlsx", "bad zip").is_fatal());
        assert!(!IngestError::invalid_upload("x.txt", "extension").is_fatal());
    }

    #[test]
    fn messages_name_the_file() {
        let err = IngestError::malformed("FCR_20251101.xlsx", "not a workbook");
        assert_eq!(
            err.to_string(),
            "malformed source FCR_20251101.xlsx: not a workbook"
        );
    }
}
