//! Spreadsheet → [`Record`] parsing.
//!
//! Exports arrive with drifting header spellings ("Sub Division",
//! "SubDivision", "Sub-Division Name", ...). Each file's header row is
//! resolved once against [`COLUMN_ALIASES`], an ordered table from canonical
//! field to accepted spellings, before any data row is read.
//!
//! Row policy:
//! - rows without a sub-division or officer are dropped and counted,
//! - blank rows are ignored and not counted,
//! - non-numeric or negative counts read as 0,
//! - an explicit Total column is kept verbatim; otherwise total is the sum
//!   of the category columns.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

use crate::error::{IngestError, IngestResult};
use crate::models::{CategoryCounts, PendencyCategory, Record, SourceFile};

/// Canonical fields a column can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SubDivision,
    Officer,
    Tehsil,
    Rank,
    Category(PendencyCategory),
    Total,
}

/// Ordered alias table. Matching is case-insensitive with whitespace
/// collapsed; within a field the first alias that matches any header wins.
pub const COLUMN_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::SubDivision,
        &["sub division", "subdivision", "sub-division", "sub_division", "sub division name"],
    ),
    (Field::Officer, &["officer", "officer name", "name of officer"]),
    (
        Field::Tehsil,
        &["tehsil/sub tehsil", "tehsil / sub tehsil", "tehsil", "sub tehsil"],
    ),
    (Field::Rank, &["rank"]),
    (
        Field::Category(PendencyCategory::UncontestedPendency),
        &["uncontested pendency", "uncontested"],
    ),
    (
        Field::Category(PendencyCategory::IncomeCertificate),
        &["income certificate", "income certificates"],
    ),
    (
        Field::Category(PendencyCategory::CopyingService),
        &["copying service", "copying services"],
    ),
    (
        Field::Category(PendencyCategory::InspectionRecords),
        &["inspection records", "inspection record"],
    ),
    (
        Field::Category(PendencyCategory::OverdueMortgage),
        &["overdue mortgage", "overdue mortgages"],
    ),
    (
        Field::Category(PendencyCategory::OverdueCourtOrders),
        &["overdue court orders", "overdue court order"],
    ),
    (
        Field::Category(PendencyCategory::OverdueFardbadars),
        &["overdue fardbadars", "overdue fardbadar"],
    ),
    (Field::Total, &["total", "grand total", "total pendency"]),
];

/// Result of parsing one workbook.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<Record>,
    /// Rows dropped for a missing sub-division or officer.
    pub dropped_rows: usize,
}

/// Column index per resolved field.
#[derive(Debug, Default)]
pub struct ColumnMap {
    sub_division: Option<usize>,
    officer: Option<usize>,
    tehsil: Option<usize>,
    rank: Option<usize>,
    categories: Vec<(PendencyCategory, usize)>,
    total: Option<usize>,
}

impl ColumnMap {
    /// Resolve header cells against the alias table.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize(h.as_ref())).collect();
        let mut used = vec![false; normalized.len()];
        let mut map = ColumnMap::default();

        for (field, aliases) in COLUMN_ALIASES {
            let found = aliases.iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .find(|(i, h)| !used[*i] && h.as_str() == *alias)
                    .map(|(i, _)| i)
            });
            if let Some(i) = found {
                used[i] = true;
                map.assign(*field, i);
            }
        }

        // Loose fallbacks for headers like "Total Pendency (All)" or
        // "Name of Sub Division".
        if map.total.is_none() {
            if let Some(i) = find_unused(&normalized, &used, |h| h.contains("total")) {
                used[i] = true;
                map.total = Some(i);
            }
        }
        if map.sub_division.is_none() {
            if let Some(i) = find_unused(&normalized, &used, |h| {
                h.contains("sub") && h.contains("division")
            }) {
                map.sub_division = Some(i);
            }
        }

        map
    }

    fn assign(&mut self, field: Field, index: usize) {
        match field {
            Field::SubDivision => self.sub_division = Some(index),
            Field::Officer => self.officer = Some(index),
            Field::Tehsil => self.tehsil = Some(index),
            Field::Rank => self.rank = Some(index),
            Field::Category(c) => self.categories.push((c, index)),
            Field::Total => self.total = Some(index),
        }
    }

    pub fn column(&self, field: Field) -> Option<usize> {
        match field {
            Field::SubDivision => self.sub_division,
            Field::Officer => self.officer,
            Field::Tehsil => self.tehsil,
            Field::Rank => self.rank,
            Field::Category(c) => self
                .categories
                .iter()
                .find(|(cat, _)| *cat == c)
                .map(|(_, i)| *i),
            Field::Total => self.total,
        }
    }

    /// Build a record from one data row, or `None` when a required field is empty.
    fn record(&self, row: &[Data], file: &SourceFile) -> Option<Record> {
        let sub_division = self.sub_division.map(|i| cell_text(row.get(i)))?;
        let officer = self.officer.map(|i| cell_text(row.get(i)))?;
        if sub_division.is_empty() || officer.is_empty() {
            return None;
        }

        let tehsil = self
            .tehsil
            .map(|i| cell_text(row.get(i)))
            .filter(|t| !t.is_empty());
        let rank = self
            .rank
            .and_then(|i| cell_number(row.get(i)))
            .and_then(|r| u32::try_from(r).ok());

        let mut categories = CategoryCounts::default();
        for (category, i) in &self.categories {
            categories.set(*category, cell_number(row.get(*i)).unwrap_or(0));
        }
        let total = match self.total {
            Some(i) => cell_number(row.get(i)).unwrap_or(0),
            None => categories.sum(),
        };

        Some(Record {
            date: file.date,
            sub_division,
            officer,
            tehsil,
            rank,
            categories,
            total,
            source_file: file.name.clone(),
        })
    }
}

fn find_unused(normalized: &[String], used: &[bool], pred: impl Fn(&str) -> bool) -> Option<usize> {
    normalized
        .iter()
        .enumerate()
        .find(|(i, h)| !used[*i] && pred(h))
        .map(|(i, _)| i)
}

fn normalize(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse the first worksheet of `bytes` into records.
///
/// Fails only when the bytes are not a readable workbook.
pub fn parse_workbook(file: &SourceFile, bytes: &[u8]) -> IngestResult<ParsedFile> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::malformed(&file.name, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::malformed(&file.name, "workbook has no worksheets"))?
        .map_err(|e| IngestError::malformed(&file.name, e))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(ParsedFile::default());
    };
    let headers: Vec<String> = header_row.iter().map(|c| cell_text(Some(c))).collect();
    let columns = ColumnMap::resolve(&headers);

    if columns.sub_division.is_none() || columns.officer.is_none() {
        log::warn!(
            "{}: no Sub Division/Officer columns in header {:?}",
            file.name,
            headers
        );
    }

    Ok(parse_rows(&columns, rows, file))
}

fn parse_rows<'a>(
    columns: &ColumnMap,
    rows: impl Iterator<Item = &'a [Data]>,
    file: &SourceFile,
) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    for row in rows {
        if row.iter().all(|c| cell_text(Some(c)).is_empty()) {
            continue;
        }
        match columns.record(row, file) {
            Some(record) => parsed.records.push(record),
            None => parsed.dropped_rows += 1,
        }
    }

    log::debug!(
        "{}: {} records, {} rows dropped",
        file.name,
        parsed.records.len(),
        parsed.dropped_rows
    );
    parsed
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Int(n)) => n.to_string(),
        Some(Data::Float(f)) if f.fract() == 0.0 => format!("{}", *f as i64),
        Some(Data::Float(f)) => f.to_string(),
        Some(Data::Bool(b)) => b.to_string(),
        Some(Data::DateTimeIso(s)) | Some(Data::DurationIso(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Non-negative integer value of a cell; `None` for empty cells.
fn cell_number(cell: Option<&Data>) -> Option<u64> {
    let value = match cell? {
        Data::Empty => return None,
        Data::Int(n) => *n as f64,
        Data::Float(f) => *f,
        Data::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    };

    // Float to int casts saturate at u64::MAX.
    if value.is_finite() && value > 0.0 {
        Some(value.trunc() as u64)
    } else {
        Some(0)
    }
}
