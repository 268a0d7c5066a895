#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const HEADER: &[&str] = &[
    "Sub Division",
    "Tehsil/Sub Tehsil",
    "Officer",
    "Uncontested Pendency",
    "Income Certificate",
    "Total",
];

/// One data row under [`HEADER`].
pub struct Row<'a> {
    pub sub_division: &'a str,
    pub tehsil: &'a str,
    pub officer: &'a str,
    pub uncontested: u32,
    pub income: u32,
}

pub fn row<'a>(sub_division: &'a str, officer: &'a str, uncontested: u32, income: u32) -> Row<'a> {
    Row {
        sub_division,
        tehsil: "Central",
        officer,
        uncontested,
        income,
    }
}

/// Build an `.xlsx` with [`HEADER`] and `rows`; Total is the sum of the two
/// category columns.
pub fn workbook_bytes(rows: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, title) in HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *title).unwrap();
    }
    for (i, r) in rows.iter().enumerate() {
        let line = i as u32 + 1;
        if !r.sub_division.is_empty() {
            sheet.write_string(line, 0, r.sub_division).unwrap();
        }
        if !r.tehsil.is_empty() {
            sheet.write_string(line, 1, r.tehsil).unwrap();
        }
        if !r.officer.is_empty() {
            sheet.write_string(line, 2, r.officer).unwrap();
        }
        sheet.write_number(line, 3, r.uncontested).unwrap();
        sheet.write_number(line, 4, r.income).unwrap();
        sheet.write_number(line, 5, r.uncontested + r.income).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

pub fn write_workbook(dir: &Path, name: &str, rows: &[Row]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, workbook_bytes(rows)).unwrap();
    path
}

/// Set the file's modification time to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}
