mod common;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{row, set_mtime, workbook_bytes, write_workbook};
use fcr_pendency::cache::ReportCache;
use fcr_pendency::config::S3FolderConfig;
use fcr_pendency::connector_fs::FilesystemProvider;
use fcr_pendency::connector_s3::S3Provider;
use fcr_pendency::error::IngestError;
use fcr_pendency::ingest::Ingestor;
use fcr_pendency::models::{Metric, ReportQuery};

fn fs_ingestor(dir: &std::path::Path) -> Ingestor {
    Ingestor::new(
        Arc::new(FilesystemProvider::new(dir.to_path_buf())),
        Arc::new(ReportCache::new(Duration::from_secs(300))),
    )
}

fn query() -> ReportQuery {
    ReportQuery::with_threshold(50)
}

#[tokio::test]
async fn rows_without_officer_are_dropped() {
    let tmp = TempDir::new().unwrap();
    write_workbook(
        tmp.path(),
        "FCR_20251101.xlsx",
        &[
            row("Alpha", "A. Kaur", 1, 1),
            row("Alpha", "B. Singh", 2, 0),
            row("Beta", "", 5, 5),
            row("Beta", "C. Sharma", 3, 1),
            row("Gamma", "D. Verma", 0, 4),
        ],
    );

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.dropped_rows, 1);
    assert_eq!(report.files_used, vec!["FCR_20251101.xlsx"]);
}

#[tokio::test]
async fn two_days_give_rollup_and_trend() {
    let tmp = TempDir::new().unwrap();
    write_workbook(tmp.path(), "FCR_20251101.xlsx", &[row("Alpha", "A", 6, 4)]);
    write_workbook(tmp.path(), "FCR_20251102.xlsx", &[row("Alpha", "A", 10, 5)]);

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();

    assert_eq!(report.latest_date, NaiveDate::from_ymd_opt(2025, 11, 2));
    assert_eq!(report.previous_date, NaiveDate::from_ymd_opt(2025, 11, 1));
    assert_eq!(report.sub_divisions.len(), 1);
    assert_eq!(report.sub_divisions[0].name, "Alpha");
    assert_eq!(report.sub_divisions[0].total, 15);

    let trend = report
        .trends
        .iter()
        .find(|t| t.sub_division == "Alpha" && t.metric == Metric::Total)
        .unwrap();
    assert_eq!(trend.latest, 15);
    assert_eq!(trend.previous, Some(10));
    assert_eq!(trend.delta, Some(5));
    assert_eq!(report.overview.change_percent, Some(50.0));
}

#[tokio::test]
async fn empty_folder_is_an_empty_success() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("readme.txt"), "not data").unwrap();

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();
    assert!(report.is_empty());
    assert!(report.latest_date.is_none());
    assert!(report.alerts.is_empty());
    assert!(report.files_skipped.is_empty());
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let tmp = TempDir::new().unwrap();
    write_workbook(
        tmp.path(),
        "FCR_20251101.xlsx",
        &[row("Alpha", "A", 30, 20), row("Beta", "B", 30, 19)],
    );

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();
    let alerted: Vec<&str> = report
        .alerts
        .iter()
        .filter(|a| a.metric == Metric::Total)
        .map(|a| a.sub_division.as_str())
        .collect();
    assert_eq!(alerted, vec!["Alpha"]);
    assert_eq!(report.alerts[0].threshold, 50);
}

#[tokio::test]
async fn later_file_for_same_date_wins_entirely() {
    let tmp = TempDir::new().unwrap();
    let early = write_workbook(
        tmp.path(),
        "FCR_20251102_morning.xlsx",
        &[row("Alpha", "A", 1, 1), row("Beta", "B", 9, 9)],
    );
    let late = write_workbook(
        tmp.path(),
        "FCR_20251102.xlsx",
        &[row("Alpha", "A", 7, 0)],
    );
    set_mtime(&early, 1_762_000_000);
    set_mtime(&late, 1_762_050_000);

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();
    assert_eq!(report.files_used, vec!["FCR_20251102.xlsx"]);
    assert_eq!(report.files_superseded, vec!["FCR_20251102_morning.xlsx"]);
    // Beta only exists in the superseded file.
    assert_eq!(report.sub_divisions.len(), 1);
    assert_eq!(report.sub_divisions[0].total, 7);
}

#[tokio::test]
async fn corrupt_file_is_skipped_and_others_used() {
    let tmp = TempDir::new().unwrap();
    write_workbook(tmp.path(), "FCR_20251101.xlsx", &[row("Alpha", "A", 2, 2)]);
    std::fs::write(tmp.path().join("FCR_20251102.xlsx"), b"truncated download").unwrap();

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();
    assert_eq!(report.files_used, vec!["FCR_20251101.xlsx"]);
    assert_eq!(report.files_skipped.len(), 1);
    assert_eq!(report.files_skipped[0].name, "FCR_20251102.xlsx");
    assert!(!report.files_skipped[0].reason.is_empty());
    assert_eq!(report.overview.total_latest, 4);
}

#[tokio::test]
async fn filters_narrow_records_and_rollups() {
    let tmp = TempDir::new().unwrap();
    write_workbook(
        tmp.path(),
        "FCR_20251101.xlsx",
        &[row("Alpha", "A", 1, 0), row("Beta", "B", 2, 0)],
    );
    write_workbook(
        tmp.path(),
        "FCR_20251102.xlsx",
        &[row("Alpha", "A", 3, 0), row("Beta", "B", 4, 0)],
    );

    let q = ReportQuery {
        to: NaiveDate::from_ymd_opt(2025, 11, 1),
        sub_divisions: vec!["Beta".to_string()],
        ..query()
    };
    let report = fs_ingestor(tmp.path()).report(&q).await.unwrap();
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.latest_date, NaiveDate::from_ymd_opt(2025, 11, 1));
    assert_eq!(report.sub_divisions[0].name, "Beta");
    assert_eq!(report.sub_divisions[0].total, 2);
    assert!(report.previous_date.is_none());
}

#[tokio::test]
async fn upload_is_visible_on_next_report() {
    let tmp = TempDir::new().unwrap();
    write_workbook(tmp.path(), "FCR_20251101.xlsx", &[row("Alpha", "A", 1, 0)]);
    let ingestor = fs_ingestor(tmp.path());

    let before = ingestor.report(&query()).await.unwrap();
    assert_eq!(before.latest_date, NaiveDate::from_ymd_opt(2025, 11, 1));

    let bytes = workbook_bytes(&[row("Alpha", "A", 2, 0)]);
    let stored = ingestor.upload("FCR_20251103.xlsx", &bytes).await.unwrap();
    assert_eq!(stored.date, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());

    let after = ingestor.report(&query()).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.latest_date, NaiveDate::from_ymd_opt(2025, 11, 3));
    let trend = after
        .trends
        .iter()
        .find(|t| t.metric == Metric::Total)
        .unwrap();
    assert_eq!(trend.delta, Some(1));
}

#[tokio::test]
async fn unchanged_folder_is_served_from_cache() {
    let tmp = TempDir::new().unwrap();
    write_workbook(tmp.path(), "FCR_20251101.xlsx", &[row("Alpha", "A", 1, 0)]);
    let ingestor = fs_ingestor(tmp.path());

    let first = ingestor.report(&query()).await.unwrap();
    let second = ingestor.report(&query()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ingestor.cache().stats().hits, 1);

    ingestor.reload();
    let third = ingestor.report(&query()).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(first.records, third.records);
}

#[tokio::test]
async fn unreachable_bucket_is_source_unavailable() {
    let provider = S3Provider::new(S3FolderConfig {
        bucket: "fcr-exports".to_string(),
        prefix: "daily/".to_string(),
        region: "us-east-1".to_string(),
        endpoint_url: Some("http://127.0.0.1:1".to_string()),
    });
    let ingestor = Ingestor::new(
        Arc::new(provider),
        Arc::new(ReportCache::new(Duration::from_secs(300))),
    );

    let err = ingestor.report(&query()).await.unwrap_err();
    assert!(matches!(err, IngestError::SourceUnavailable { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn report_carries_series_and_top_officers() {
    let tmp = TempDir::new().unwrap();
    write_workbook(
        tmp.path(),
        "FCR_20251101.xlsx",
        &[row("Alpha", "A. Kaur", 6, 4), row("Beta", "B. Singh", 1, 1)],
    );
    write_workbook(
        tmp.path(),
        "FCR_20251102.xlsx",
        &[row("Alpha", "A. Kaur", 10, 5), row("Beta", "B. Singh", 3, 2)],
    );

    let report = fs_ingestor(tmp.path()).report(&query()).await.unwrap();

    assert_eq!(report.series.len(), 2);
    assert_eq!(report.series[0].date, NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());
    assert_eq!(report.series[0].total, 12);
    assert_eq!(report.series[1].total, 20);
    assert_eq!(report.series[1].sub_divisions["Alpha"], 15);
    assert_eq!(report.series[1].sub_divisions["Beta"], 5);

    assert_eq!(report.top_officers.len(), 2);
    let top = &report.top_officers[0];
    assert_eq!(top.officer, "A. Kaur");
    assert_eq!(top.total, 15);
    assert_eq!(top.percent_of_total, 75.0);
    let history: Vec<u64> = top.history.iter().map(|p| p.total).collect();
    assert_eq!(history, vec![10, 15]);
}
