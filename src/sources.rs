//! Source enumeration rules shared by every folder provider.
//!
//! A file is ingestible when its extension is `.xlsx` or `.xls` and its name
//! carries a `YYYYMMDD` date token. Anything else in the folder is ignored
//! without failing the pass.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::connector_fs::FilesystemProvider;
use crate::connector_s3::S3Provider;
use crate::error::{IngestError, IngestResult};
use crate::models::SourceFile;
use crate::traits::FolderProvider;

pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// Uploads above this size are rejected.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const DATE_FORMAT: &str = "%Y%m%d";

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{8,}").expect("static regex"))
}

/// Extract the first 8-digit window in `name` that is a valid calendar date.
pub fn extract_date_token(name: &str) -> Option<NaiveDate> {
    for run in digit_runs().find_iter(name) {
        let digits = run.as_str();
        for start in 0..=digits.len() - 8 {
            if let Ok(date) = NaiveDate::parse_from_str(&digits[start..start + 8], DATE_FORMAT) {
                return Some(date);
            }
        }
    }
    None
}

fn workbook_globs() -> &'static GlobSet {
    static SET: OnceLock<GlobSet> = OnceLock::new();
    SET.get_or_init(|| {
        let mut builder = GlobSetBuilder::new();
        for ext in ACCEPTED_EXTENSIONS {
            let glob = GlobBuilder::new(&format!("?*.{}", ext))
                .case_insensitive(true)
                .build()
                .expect("static glob");
            builder.add(glob);
        }
        builder.build().expect("static globset")
    })
}

pub fn has_accepted_extension(name: &str) -> bool {
    workbook_globs().is_match(name)
}

/// Office writes `~$name.xlsx` lock files next to open workbooks.
fn is_lock_file(name: &str) -> bool {
    name.starts_with("~$")
}

/// Build a [`SourceFile`] if `name` passes the enumeration rules.
pub fn describe_file(
    handle: &str,
    name: &str,
    modified: DateTime<Utc>,
    size: u64,
) -> Option<SourceFile> {
    if is_lock_file(name) || !has_accepted_extension(name) {
        return None;
    }
    let Some(date) = extract_date_token(name) else {
        log::debug!("skipping {}: no YYYYMMDD token in name", name);
        return None;
    };
    Some(SourceFile {
        handle: handle.to_string(),
        name: name.to_string(),
        date,
        modified,
        size,
    })
}

/// Reject uploads that could never be enumerated or parsed.
pub fn validate_upload(name: &str, bytes: &[u8]) -> IngestResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(IngestError::invalid_upload(name, "file name must be a plain name"));
    }
    if is_lock_file(name) {
        return Err(IngestError::invalid_upload(
            name,
            "office lock files (~$...) are never ingested",
        ));
    }
    if !has_accepted_extension(name) {
        return Err(IngestError::invalid_upload(
            name,
            "file must be an Excel file (.xlsx or .xls)",
        ));
    }
    if extract_date_token(name).is_none() {
        return Err(IngestError::invalid_upload(
            name,
            "file name must contain a YYYYMMDD date",
        ));
    }
    if bytes.is_empty() {
        return Err(IngestError::invalid_upload(name, "file is empty"));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(IngestError::invalid_upload(
            name,
            format!("file exceeds {} MiB", MAX_UPLOAD_BYTES / (1024 * 1024)),
        ));
    }
    Ok(())
}

/// Construct the provider selected by `[source].provider`.
pub fn build_provider(config: &Config) -> Result<Arc<dyn FolderProvider>> {
    match config.source.provider.as_str() {
        "filesystem" => Ok(Arc::new(FilesystemProvider::new(
            config.source.folder.clone(),
        ))),
        "s3" => {
            let s3 = config
                .source
                .s3
                .clone()
                .ok_or_else(|| anyhow::anyhow!("[source.s3] is not configured"))?;
            Ok(Arc::new(S3Provider::new(s3)))
        }
        other => anyhow::bail!("Unknown source provider: '{}'", other),
    }
}

/// `fcr sources`: print every ingestible file the provider can see.
pub async fn run_sources(config: &Config) -> Result<()> {
    let provider = build_provider(config)?;
    let files = provider.list().await?;

    println!("provider: {}", provider.name());
    if files.is_empty() {
        println!("no ingestible files (expected *.xlsx / *.xls with a YYYYMMDD date in the name)");
        return Ok(());
    }

    println!("{:<40} {:<12} {:>10}   MODIFIED", "FILE", "DATE", "SIZE");
    for f in &files {
        println!(
            "{:<40} {:<12} {:>10}   {}",
            f.name,
            f.date.format("%Y-%m-%d"),
            f.size,
            f.modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("{} file(s)", files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_token_from_plain_name() {
        assert_eq!(
            extract_date_token("FCR_20251102.xlsx"),
            NaiveDate::from_ymd_opt(2025, 11, 2)
        );
    }

    #[test]
    fn date_token_skips_invalid_windows() {
        // 99999999 is not a date, but the window starting at "2025..." is.
        assert_eq!(
            extract_date_token("report_9920251103.xlsx"),
            NaiveDate::from_ymd_opt(2025, 11, 3)
        );
        assert_eq!(extract_date_token("report_20251341.xlsx"), None);
    }

    #[test]
    fn non_ascii_digits_have_no_token() {
        let name = "FCR_੨੦੨੫੧੧੦੨.xlsx";
        assert_eq!(extract_date_token(name), None);
        assert!(describe_file(name, name, Utc::now(), 1).is_none());
        assert!(validate_upload(name, b"PK").is_err());
    }

    #[test]
    fn short_digit_runs_have_no_token() {
        assert_eq!(extract_date_token("FCR_2025_11_02.xlsx"), None);
        assert_eq!(extract_date_token("no digits.xls"), None);
    }

    #[test]
    fn extensions_are_case_insensitive() {
        assert!(has_accepted_extension("a.XLSX"));
        assert!(has_accepted_extension("a.xls"));
        assert!(!has_accepted_extension("a.csv"));
        assert!(!has_accepted_extension("xlsx"));
    }

    #[test]
    fn describe_file_filters() {
        let now = Utc::now();
        assert!(describe_file("a_20251101.xlsx", "a_20251101.xlsx", now, 1).is_some());
        assert!(describe_file("~$a_20251101.xlsx", "~$a_20251101.xlsx", now, 1).is_none());
        assert!(describe_file("a.xlsx", "a.xlsx", now, 1).is_none());
        assert!(describe_file("a_20251101.csv", "a_20251101.csv", now, 1).is_none());
    }

    #[test]
    fn upload_validation() {
        assert!(validate_upload("FCR_20251101.xlsx", b"PK").is_ok());
        assert!(matches!(
            validate_upload("FCR_20251101.txt", b"PK"),
            Err(IngestError::InvalidUpload { .. })
        ));
        assert!(validate_upload("FCR.xlsx", b"PK").is_err());
        assert!(validate_upload("FCR_20251101.xlsx", b"").is_err());
        assert!(validate_upload("../FCR_20251101.xlsx", b"PK").is_err());
        assert!(matches!(
            validate_upload("~$FCR_20251101.xlsx", b"PK"),
            Err(IngestError::InvalidUpload { .. })
        ));
    }
}
