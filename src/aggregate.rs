//! Merge parsed files into one [`AggregatedReport`].
//!
//! Files are grouped by the date in their name. When two files carry the same
//! date, the later-modified one replaces the other entirely for that date:
//! today's re-export replaces today's earlier export. Rows are never merged
//! across files.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{
    AggregatedReport, Alert, CategoryCounts, DatePoint, Metric, OfficerPoint, OfficerRollup,
    Overview, PendencyCategory, Record, ReportQuery, Rollup, SourceFile, TrendDelta,
};

/// Officers listed in [`AggregatedReport::top_officers`].
pub const TOP_OFFICERS: usize = 5;
use crate::parser::ParsedFile;

/// One file with its parse result.
#[derive(Debug)]
pub struct ParsedSource {
    pub file: SourceFile,
    pub parsed: ParsedFile,
}

pub fn aggregate(sources: Vec<ParsedSource>, query: &ReportQuery) -> AggregatedReport {
    let (winners, superseded) = resolve_same_date(sources);

    let mut report = AggregatedReport {
        threshold: query.threshold,
        files_used: winners.iter().map(|s| s.file.name.clone()).collect(),
        files_superseded: superseded,
        dropped_rows: winners.iter().map(|s| s.parsed.dropped_rows).sum(),
        ..AggregatedReport::default()
    };

    let mut records: Vec<Record> = winners
        .into_iter()
        .flat_map(|s| s.parsed.records)
        .filter(|r| matches_query(r, query))
        .collect();
    records.sort_by(|a, b| {
        (a.date, &a.sub_division, &a.officer).cmp(&(b.date, &b.sub_division, &b.officer))
    });

    let dates: BTreeSet<NaiveDate> = records.iter().map(|r| r.date).collect();
    let Some(latest) = dates.iter().next_back().copied() else {
        return report;
    };
    let previous = dates.range(..latest).next_back().copied();

    let on_latest: Vec<&Record> = records.iter().filter(|r| r.date == latest).collect();
    let sub_divisions = rollup(&on_latest, |r| Some(r.sub_division.as_str()));
    let tehsils = rollup(&on_latest, |r| r.tehsil.as_deref());

    let previous_rollup = previous.map(|date| {
        let on_previous: Vec<&Record> = records.iter().filter(|r| r.date == date).collect();
        rollup(&on_previous, |r| Some(r.sub_division.as_str()))
    });

    report.trends = trends(&sub_divisions, previous_rollup.as_deref());
    report.alerts = alerts(&sub_divisions, query.threshold);
    report.overview = overview(&on_latest, &sub_divisions, previous_rollup.as_deref());
    report.series = series(&records);
    report.top_officers = top_officers(&on_latest, &records, report.overview.total_latest);
    report.latest_date = Some(latest);
    report.previous_date = previous;
    report.sub_divisions = sub_divisions;
    report.tehsils = tehsils;
    report.records = records;
    report
}

/// Keep one file per date: latest modification time, then greatest name.
fn resolve_same_date(sources: Vec<ParsedSource>) -> (Vec<ParsedSource>, Vec<String>) {
    let mut by_date: BTreeMap<NaiveDate, ParsedSource> = BTreeMap::new();
    let mut superseded = Vec::new();

    for source in sources {
        match by_date.get(&source.file.date) {
            Some(current)
                if (current.file.modified, &current.file.name)
                    >= (source.file.modified, &source.file.name) =>
            {
                log::info!(
                    "{} superseded by {} for {}",
                    source.file.name,
                    current.file.name,
                    source.file.date
                );
                superseded.push(source.file.name);
            }
            _ => {
                if let Some(replaced) = by_date.insert(source.file.date, source) {
                    log::info!("{} superseded for {}", replaced.file.name, replaced.file.date);
                    superseded.push(replaced.file.name);
                }
            }
        }
    }

    superseded.sort();
    (by_date.into_values().collect(), superseded)
}

fn matches_query(record: &Record, query: &ReportQuery) -> bool {
    if query.from.is_some_and(|from| record.date < from) {
        return false;
    }
    if query.to.is_some_and(|to| record.date > to) {
        return false;
    }
    if !query.sub_divisions.is_empty() && !query.sub_divisions.contains(&record.sub_division) {
        return false;
    }
    if !query.officers.is_empty() && !query.officers.contains(&record.officer) {
        return false;
    }
    if !query.tehsils.is_empty() {
        match record.tehsil {
            Some(ref t) if query.tehsils.contains(t) => {}
            _ => return false,
        }
    }
    true
}

/// Sum records per group key; records whose key is `None` are left out.
fn rollup<'r>(records: &[&'r Record], key: impl Fn(&'r Record) -> Option<&'r str>) -> Vec<Rollup> {
    let mut groups: BTreeMap<&str, (CategoryCounts, u64)> = BTreeMap::new();
    for &record in records {
        let Some(name) = key(record) else { continue };
        let entry = groups.entry(name).or_default();
        entry.0.add(&record.categories);
        entry.1 = entry.1.saturating_add(record.total);
    }

    let grand_total = saturating_sum(groups.values().map(|(_, total)| *total));
    let mut rollups: Vec<Rollup> = groups
        .into_iter()
        .map(|(name, (categories, total))| Rollup {
            name: name.to_string(),
            categories,
            total,
            rank: 0,
            percent_of_total: percent(total, grand_total),
        })
        .collect();

    rollups.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    let mut rank = 0;
    let mut last_total = None;
    for r in &mut rollups {
        if last_total != Some(r.total) {
            rank += 1;
            last_total = Some(r.total);
        }
        r.rank = rank;
    }
    rollups
}

fn trends(latest: &[Rollup], previous: Option<&[Rollup]>) -> Vec<TrendDelta> {
    let previous_by_name: Option<HashMap<&str, &Rollup>> =
        previous.map(|rs| rs.iter().map(|r| (r.name.as_str(), r)).collect());

    let mut out = Vec::new();
    for current in latest {
        for metric in Metric::all() {
            let latest_value = current.value(metric);
            let previous_value = previous_by_name.as_ref().map(|by_name| {
                by_name
                    .get(current.name.as_str())
                    .map(|r| r.value(metric))
                    .unwrap_or(0)
            });
            out.push(TrendDelta {
                sub_division: current.name.clone(),
                metric,
                latest: latest_value,
                previous: previous_value,
                delta: previous_value.map(|p| delta(latest_value, p)),
            });
        }
    }
    out
}

/// Inclusive: a value equal to the threshold alerts.
fn alerts(latest: &[Rollup], threshold: u64) -> Vec<Alert> {
    latest
        .iter()
        .flat_map(|r| {
            Metric::all()
                .filter(move |m| r.value(*m) >= threshold)
                .map(move |metric| Alert {
                    sub_division: r.name.clone(),
                    metric,
                    value: r.value(metric),
                    threshold,
                })
        })
        .collect()
}

fn overview(on_latest: &[&Record], latest: &[Rollup], previous: Option<&[Rollup]>) -> Overview {
    let total_latest = saturating_sum(latest.iter().map(|r| r.total));
    let total_previous = previous.map(|rs| saturating_sum(rs.iter().map(|r| r.total)));

    let mut category_totals = CategoryCounts::default();
    for r in latest {
        category_totals.add(&r.categories);
    }
    let top_category = PendencyCategory::ALL
        .into_iter()
        .filter(|c| category_totals.get(*c) > 0)
        .max_by(|a, b| {
            category_totals
                .get(*a)
                .cmp(&category_totals.get(*b))
                // Earlier category wins ties.
                .then_with(|| b.cmp(a))
        });

    let officers: BTreeSet<&str> = on_latest.iter().map(|r| r.officer.as_str()).collect();

    Overview {
        total_latest,
        total_previous,
        change_percent: total_previous.map(|p| change_percent(total_latest, p)),
        sub_divisions: latest.len(),
        officers: officers.len(),
        top_category,
    }
}

/// District and per-sub-division totals for every date in `records`.
fn series(records: &[Record]) -> Vec<DatePoint> {
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, u64>> = BTreeMap::new();
    for r in records {
        let slot = by_date
            .entry(r.date)
            .or_default()
            .entry(r.sub_division.clone())
            .or_default();
        *slot = slot.saturating_add(r.total);
    }
    by_date
        .into_iter()
        .map(|(date, sub_divisions)| DatePoint {
            date,
            total: saturating_sum(sub_divisions.values().copied()),
            sub_divisions,
        })
        .collect()
}

/// Highest totals on the latest date, keyed by (sub-division, tehsil, officer),
/// each with its per-date history across `records`.
fn top_officers(on_latest: &[&Record], records: &[Record], grand_total: u64) -> Vec<OfficerRollup> {
    type Key<'a> = (&'a str, Option<&'a str>, &'a str);
    fn key(r: &Record) -> Key<'_> {
        (r.sub_division.as_str(), r.tehsil.as_deref(), r.officer.as_str())
    }

    let mut totals: BTreeMap<Key, u64> = BTreeMap::new();
    for &r in on_latest {
        let slot = totals.entry(key(r)).or_default();
        *slot = slot.saturating_add(r.total);
    }
    let mut ranked: Vec<(Key, u64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_OFFICERS);

    ranked
        .into_iter()
        .map(|(k, total)| {
            let mut history: BTreeMap<NaiveDate, u64> = BTreeMap::new();
            for r in records.iter().filter(|r| key(r) == k) {
                let slot = history.entry(r.date).or_default();
                *slot = slot.saturating_add(r.total);
            }
            let (sub_division, tehsil, officer) = k;
            OfficerRollup {
                officer: officer.to_string(),
                sub_division: sub_division.to_string(),
                tehsil: tehsil.map(str::to_string),
                total,
                percent_of_total: percent(total, grand_total),
                history: history
                    .into_iter()
                    .map(|(date, total)| OfficerPoint { date, total })
                    .collect(),
            }
        })
        .collect()
}

fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

/// Share of `total` in `grand_total`, in percent, rounded to two decimals.
fn percent(total: u64, grand_total: u64) -> f64 {
    if grand_total == 0 {
        return 0.0;
    }
    (total as f64 / grand_total as f64 * 10_000.0).round() / 100.0
}

/// `latest - previous`, saturating at the `i64` bounds.
fn delta(latest: u64, previous: u64) -> i64 {
    if latest >= previous {
        i64::try_from(latest - previous).unwrap_or(i64::MAX)
    } else {
        i64::try_from(previous - latest).map_or(i64::MIN, |d| -d)
    }
}

/// Percent change; 0 when both are zero, 100 when growing from zero.
pub fn change_percent(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return if current == 0 { 0.0 } else { 100.0 };
    }
    (current as f64 - previous as f64) / previous as f64 * 100.0
}
