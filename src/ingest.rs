//! Ingestion pipeline orchestration.
//!
//! Coordinates one pass: provider listing → fingerprint → cache lookup →
//! open and parse each file → aggregate. Per-file failures are recorded in
//! the report and the pass continues; only an unreachable folder aborts.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{aggregate, ParsedSource};
use crate::cache::{fingerprint, ReportCache};
use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::models::{AggregatedReport, Metric, ReportQuery, SkippedFile, SourceFile};
use crate::parser::{parse_workbook, ParsedFile};
use crate::sources::build_provider;
use crate::traits::FolderProvider;

/// A folder provider paired with the report cache that fronts it.
///
/// Cheap to clone; clones share the provider and the cache slot.
#[derive(Clone)]
pub struct Ingestor {
    provider: Arc<dyn FolderProvider>,
    cache: Arc<ReportCache>,
}

impl Ingestor {
    pub fn new(provider: Arc<dyn FolderProvider>, cache: Arc<ReportCache>) -> Self {
        Self { provider, cache }
    }

    /// Build the configured provider with a cache using `[cache].ttl_secs`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = build_provider(config)?;
        let cache = ReportCache::new(Duration::from_secs(config.cache.ttl_secs));
        Ok(Self::new(provider, Arc::new(cache)))
    }

    pub fn provider(&self) -> &dyn FolderProvider {
        self.provider.as_ref()
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub async fn list_files(&self) -> IngestResult<Vec<SourceFile>> {
        self.provider.list().await
    }

    /// Produce the report for `query`, served from the cache while the
    /// folder listing is unchanged and the entry is fresh.
    pub async fn report(&self, query: &ReportQuery) -> IngestResult<Arc<AggregatedReport>> {
        let files = self.provider.list().await?;
        let fp = fingerprint(&files, query);
        let provider = self.provider.as_ref();

        self.cache
            .get_or_compute(&fp, move || async move {
                Ok::<_, IngestError>(ingest_files(provider, files, query).await)
            })
            .await
    }

    /// Force the next [`report`](Self::report) call to re-read the folder.
    pub fn reload(&self) {
        log::info!("report cache invalidated");
        self.cache.invalidate();
    }

    /// Store a new export through the provider, then invalidate the cache.
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> IngestResult<SourceFile> {
        let file = self.provider.upload(name, bytes).await?;
        self.cache.invalidate();
        Ok(file)
    }
}

/// Open, parse and aggregate `files`. Never fails: unreadable files end up
/// in `files_skipped`.
async fn ingest_files(
    provider: &dyn FolderProvider,
    files: Vec<SourceFile>,
    query: &ReportQuery,
) -> AggregatedReport {
    let mut parsed = Vec::new();
    let mut skipped = Vec::new();

    for file in files {
        if !in_range(&file, query) {
            log::debug!("{} outside requested range", file.name);
            continue;
        }
        match read_file(provider, &file).await {
            Ok(result) => parsed.push(ParsedSource { file, parsed: result }),
            Err(e) => {
                log::warn!("skipping {}: {}", file.name, e);
                skipped.push(SkippedFile {
                    name: file.name,
                    reason: skip_reason(&e),
                });
            }
        }
    }

    let mut report = aggregate(parsed, query);
    report.files_skipped = skipped;
    log::info!(
        "ingested {} file(s): {} record(s), {} dropped row(s), {} skipped file(s)",
        report.files_used.len(),
        report.records.len(),
        report.dropped_rows,
        report.files_skipped.len()
    );
    report
}

async fn read_file(
    provider: &dyn FolderProvider,
    file: &SourceFile,
) -> IngestResult<ParsedFile> {
    let bytes = provider.open(file).await?;
    parse_workbook(file, &bytes)
}

fn in_range(file: &SourceFile, query: &ReportQuery) -> bool {
    !query.from.is_some_and(|from| file.date < from) && !query.to.is_some_and(|to| file.date > to)
}

fn skip_reason(err: &IngestError) -> String {
    match err {
        IngestError::MalformedSource { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// `fcr report`: print the report as a human summary or as JSON.
pub async fn run_report(config: &Config, query: &ReportQuery, json: bool) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let report = ingestor.report(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(report.as_ref())?);
        return Ok(());
    }

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &AggregatedReport) {
    let Some(latest) = report.latest_date else {
        println!("no data: no pendency records found");
        println!(
            "  (place *.xlsx / *.xls exports with a YYYYMMDD date in the name in the source folder)"
        );
        print_files(report);
        return;
    };

    match report.previous_date {
        Some(previous) => println!("latest: {}  (previous: {})", latest, previous),
        None => println!("latest: {}  (no earlier date)", latest),
    }

    let overview = &report.overview;
    match overview.change_percent {
        Some(change) => println!(
            "total pendency: {}  ({:+.2}% vs {})",
            overview.total_latest,
            change,
            overview.total_previous.unwrap_or(0)
        ),
        None => println!("total pendency: {}", overview.total_latest),
    }
    println!(
        "sub-divisions: {}  officers: {}  top category: {}",
        overview.sub_divisions,
        overview.officers,
        overview.top_category.map(|c| c.label()).unwrap_or("-")
    );

    println!();
    println!(
        "{:<4} {:<28} {:>8} {:>8} {:>8}",
        "RANK", "SUB DIVISION", "TOTAL", "SHARE", "CHANGE"
    );
    for rollup in &report.sub_divisions {
        let delta = report
            .trends
            .iter()
            .find(|t| t.sub_division == rollup.name && t.metric == Metric::Total)
            .and_then(|t| t.delta)
            .map(|d| format!("{:+}", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<28} {:>8} {:>7.2}% {:>8}",
            rollup.rank, rollup.name, rollup.total, rollup.percent_of_total, delta
        );
    }

    if !report.alerts.is_empty() {
        println!();
        println!("alerts (threshold {}):", report.threshold);
        for alert in &report.alerts {
            println!(
                "  {}: {} = {}",
                alert.sub_division,
                alert.metric.label(),
                alert.value
            );
        }
    }

    println!();
    print_files(report);
}

fn print_files(report: &AggregatedReport) {
    println!("files used: {}", report.files_used.len());
    for name in &report.files_superseded {
        println!("  superseded: {}", name);
    }
    for skipped in &report.files_skipped {
        println!("  skipped: {} ({})", skipped.name, skipped.reason);
    }
    if report.dropped_rows > 0 {
        println!(
            "  {} row(s) dropped for missing sub-division or officer",
            report.dropped_rows
        );
    }
}

/// `fcr upload`: copy a local export into the source folder.
pub async fn run_upload(config: &Config, path: &std::path::Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("not a file: {}", path.display()))?;
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;

    let ingestor = Ingestor::from_config(config)?;
    let file = ingestor.upload(&name, &bytes).await?;
    println!(
        "uploaded {} ({} bytes, date {}) to {}",
        file.name,
        file.size,
        file.date,
        ingestor.provider().name()
    );
    Ok(())
}
