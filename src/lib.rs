//! # FCR Pendency
//!
//! Ingestion and aggregation core for a revenue-department pendency
//! dashboard.
//!
//! Daily spreadsheet exports (`*.xlsx` / `*.xls` with a `YYYYMMDD` date in
//! the file name) are discovered in a local folder or an S3-compatible
//! bucket, parsed with tolerant column matching, merged with same-date
//! last-write-wins, and rolled up into per-sub-division and per-tehsil
//! figures, day-over-day trends and threshold alerts. The result is cached
//! in a single TTL slot and served through a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐   ┌──────────┐
//! │  Providers  │──▶│   Parser    │──▶│ Aggregator │──▶│  Cache   │
//! │  FS / S3    │   │  calamine   │   │ merge+roll │   │ 1 slot   │
//! └─────────────┘   └─────────────┘   └────────────┘   └────┬─────┘
//!                                                           │
//!                                       ┌───────────────────┤
//!                                       ▼                   ▼
//!                                  ┌──────────┐       ┌──────────┐
//!                                  │   CLI    │       │   HTTP   │
//!                                  │  (fcr)   │       │  (axum)  │
//!                                  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fcr sources                   # list dated exports in the folder
//! fcr report                    # summary for the latest date
//! fcr report --json --from 2025-11-01
//! fcr export --output out.csv   # filtered records as CSV
//! fcr upload FCR_20251102.xlsx  # add a new daily export
//! fcr serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion error taxonomy |
//! | [`traits`] | Folder provider trait |
//! | [`sources`] | Enumeration and upload rules |
//! | [`connector_fs`] | Local folder provider |
//! | [`connector_s3`] | S3-compatible bucket provider |
//! | [`parser`] | Workbook to record parsing |
//! | [`aggregate`] | Merge, rollups, trends, alerts |
//! | [`cache`] | Single-slot TTL report cache |
//! | [`ingest`] | Pipeline orchestration |
//! | [`export`] | CSV export |
//! | [`server`] | HTTP API |

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod connector_fs;
pub mod connector_s3;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod server;
pub mod sources;
pub mod traits;
