//! Export merged records as CSV.
//!
//! One line per record after same-date resolution and query filtering, with
//! the canonical column names as the header row. Writes to a file or to
//! stdout for piping.

use anyhow::Result;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::ingest::Ingestor;
use crate::models::{PendencyCategory, Record, ReportQuery};

/// Header row, in output order.
pub fn csv_header() -> Vec<&'static str> {
    let mut header = vec!["Date", "Sub Division", "Tehsil/Sub Tehsil", "Officer", "Rank"];
    header.extend(PendencyCategory::ALL.iter().map(|c| c.label()));
    header.extend(["Total", "Source File"]);
    header
}

/// Write `records` as CSV, header included, to `writer`.
pub fn write_csv<W: Write>(records: &[Record], writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(csv_header())?;

    for record in records {
        let mut row = vec![
            record.date.format("%Y-%m-%d").to_string(),
            record.sub_division.clone(),
            record.tehsil.clone().unwrap_or_default(),
            record.officer.clone(),
            record.rank.map(|r| r.to_string()).unwrap_or_default(),
        ];
        row.extend(
            PendencyCategory::ALL
                .iter()
                .map(|c| record.categories.get(*c).to_string()),
        );
        row.push(record.total.to_string());
        row.push(record.source_file.clone());
        out.write_record(&row)?;
    }

    out.flush()?;
    Ok(())
}

/// `fcr export`: write the filtered records as CSV.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, query: &ReportQuery, output: Option<&Path>) -> Result<()> {
    let ingestor = Ingestor::from_config(config)?;
    let report = ingestor.report(query).await?;

    for skipped in &report.files_skipped {
        eprintln!("skipped {}: {}", skipped.name, skipped.reason);
    }

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            write_csv(&report.records, file)?;
            eprintln!(
                "Exported {} records to {}",
                report.records.len(),
                path.display()
            );
        }
        None => {
            write_csv(&report.records, std::io::stdout().lock())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryCounts;
    use chrono::NaiveDate;

    fn record() -> Record {
        let mut categories = CategoryCounts::default();
        categories.set(PendencyCategory::UncontestedPendency, 3);
        categories.set(PendencyCategory::OverdueFardbadars, 2);
        Record {
            date: NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            sub_division: "Alpha, North".to_string(),
            officer: "R. Singh".to_string(),
            tehsil: None,
            rank: Some(4),
            categories,
            total: 5,
            source_file: "FCR_20251102.xlsx".to_string(),
        }
    }

    #[test]
    fn header_has_fourteen_columns() {
        let header = csv_header();
        assert_eq!(header.len(), 14);
        assert_eq!(header[5], "Uncontested Pendency");
        assert_eq!(header[13], "Source File");
    }

    #[test]
    fn writes_one_line_per_record() {
        let mut buf = Vec::new();
        write_csv(&[record()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Date,Sub Division,Tehsil/Sub Tehsil,Officer,Rank,"));
        assert_eq!(
            lines[1],
            "2025-11-02,\"Alpha, North\",,R. Singh,4,3,0,0,0,0,0,2,5,FCR_20251102.xlsx"
        );
    }

    #[test]
    fn empty_input_still_writes_header() {
        let mut buf = Vec::new();
        write_csv(&[], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
    }
}
