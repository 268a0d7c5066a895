//! Core data models used throughout the pipeline.
//!
//! These types represent the files, rows, and reports that flow from the
//! folder providers through the parser and aggregator to the presentation
//! layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One ingestible spreadsheet discovered by a [`FolderProvider`](crate::traits::FolderProvider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Provider-specific handle: path relative to the folder, or object key.
    pub handle: String,
    /// File name without any directory or prefix.
    pub name: String,
    /// Date token extracted from the file name.
    pub date: NaiveDate,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// The fixed set of pendency categories tracked per officer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendencyCategory {
    UncontestedPendency,
    IncomeCertificate,
    CopyingService,
    InspectionRecords,
    OverdueMortgage,
    OverdueCourtOrders,
    OverdueFardbadars,
}

pub const CATEGORY_COUNT: usize = 7;

impl PendencyCategory {
    pub const ALL: [PendencyCategory; CATEGORY_COUNT] = [
        PendencyCategory::UncontestedPendency,
        PendencyCategory::IncomeCertificate,
        PendencyCategory::CopyingService,
        PendencyCategory::InspectionRecords,
        PendencyCategory::OverdueMortgage,
        PendencyCategory::OverdueCourtOrders,
        PendencyCategory::OverdueFardbadars,
    ];

    /// Canonical column header, also used as the CSV header.
    pub fn label(self) -> &'static str {
        match self {
            PendencyCategory::UncontestedPendency => "Uncontested Pendency",
            PendencyCategory::IncomeCertificate => "Income Certificate",
            PendencyCategory::CopyingService => "Copying Service",
            PendencyCategory::InspectionRecords => "Inspection Records",
            PendencyCategory::OverdueMortgage => "Overdue Mortgage",
            PendencyCategory::OverdueCourtOrders => "Overdue Court Orders",
            PendencyCategory::OverdueFardbadars => "Overdue Fardbadars",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Serialize for PendencyCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Per-category counts, serialized as a `{label: count}` map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts([u64; CATEGORY_COUNT]);

impl CategoryCounts {
    pub fn get(&self, category: PendencyCategory) -> u64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: PendencyCategory, value: u64) {
        self.0[category.index()] = value;
    }

    /// Saturating sum over every category.
    pub fn sum(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn add(&mut self, other: &CategoryCounts) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine = mine.saturating_add(*theirs);
        }
    }
}

impl Serialize for CategoryCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CATEGORY_COUNT))?;
        for category in PendencyCategory::ALL {
            map.serialize_entry(category.label(), &self.get(category))?;
        }
        map.end()
    }
}

/// One normalized row of pendency data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub date: NaiveDate,
    pub sub_division: String,
    pub officer: String,
    pub tehsil: Option<String>,
    pub rank: Option<u32>,
    pub categories: CategoryCounts,
    pub total: u64,
    pub source_file: String,
}

/// A quantity that rollups, trends and alerts are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Category(PendencyCategory),
    Total,
}

impl Metric {
    pub fn all() -> impl Iterator<Item = Metric> {
        PendencyCategory::ALL
            .into_iter()
            .map(Metric::Category)
            .chain(std::iter::once(Metric::Total))
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Category(c) => c.label(),
            Metric::Total => "Total",
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Summed counts for one group (sub-division or tehsil) on the latest date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    pub name: String,
    pub categories: CategoryCounts,
    pub total: u64,
    /// Dense rank by total, 1 = highest pendency.
    pub rank: u32,
    /// Share of the latest date's grand total, in percent.
    pub percent_of_total: f64,
}

impl Rollup {
    pub fn value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Category(c) => self.categories.get(c),
            Metric::Total => self.total,
        }
    }
}

/// Change of one metric for one sub-division between the two latest dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendDelta {
    pub sub_division: String,
    pub metric: Metric,
    pub latest: u64,
    pub previous: Option<u64>,
    /// `None` when no earlier date exists in range.
    pub delta: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub sub_division: String,
    pub metric: Metric,
    pub value: u64,
    pub threshold: u64,
}

/// Headline figures for the latest date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_latest: u64,
    pub total_previous: Option<u64>,
    /// Percent change versus the previous date; `None` without one.
    pub change_percent: Option<f64>,
    pub sub_divisions: usize,
    pub officers: usize,
    pub top_category: Option<PendencyCategory>,
}

/// Totals for one date in range: district-wide and per sub-division.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatePoint {
    pub date: NaiveDate,
    pub total: u64,
    pub sub_divisions: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OfficerPoint {
    pub date: NaiveDate,
    pub total: u64,
}

/// One of the highest-pendency officers on the latest date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficerRollup {
    pub officer: String,
    pub sub_division: String,
    pub tehsil: Option<String>,
    pub total: u64,
    /// Share of the latest date's grand total, in percent.
    pub percent_of_total: f64,
    /// Total per date for the same officer, sub-division and tehsil.
    pub history: Vec<OfficerPoint>,
}

/// A file left out of the report, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// The merged, derived view handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedReport {
    pub records: Vec<Record>,
    pub latest_date: Option<NaiveDate>,
    pub previous_date: Option<NaiveDate>,
    pub sub_divisions: Vec<Rollup>,
    pub tehsils: Vec<Rollup>,
    pub trends: Vec<TrendDelta>,
    pub alerts: Vec<Alert>,
    pub overview: Overview,
    /// One point per date in range, oldest first.
    pub series: Vec<DatePoint>,
    pub top_officers: Vec<OfficerRollup>,
    pub threshold: u64,
    /// Files whose records made it into the merge.
    pub files_used: Vec<String>,
    /// Files replaced by a later file carrying the same date.
    pub files_superseded: Vec<String>,
    pub files_skipped: Vec<SkippedFile>,
    /// Rows dropped for missing sub-division or officer.
    pub dropped_rows: usize,
}

impl AggregatedReport {
    /// True when ingestion succeeded but produced nothing to show.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parameters of one report request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub threshold: u64,
    pub sub_divisions: Vec<String>,
    pub tehsils: Vec<String>,
    pub officers: Vec<String>,
}

impl ReportQuery {
    pub fn with_threshold(threshold: u64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}
