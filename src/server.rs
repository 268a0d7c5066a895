//! HTTP API for the pendency dashboard.
//!
//! Serves reports as JSON or CSV, accepts uploads of new daily exports, and
//! exposes a reload hook that drops the cached report.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version and cache counters) |
//! | `GET`  | `/report` | Aggregated report as JSON |
//! | `GET`  | `/report.csv` | Filtered records as CSV |
//! | `POST` | `/reload` | Invalidate the cached report |
//! | `GET`  | `/files` | Files the provider currently enumerates |
//! | `PUT`  | `/files/{name}` | Upload a workbook (raw body) |
//!
//! `/report` and `/report.csv` accept `from` and `to` (`YYYY-MM-DD`),
//! `threshold`, and comma-separated `sub_division`, `tehsil`, `officer`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid date 'x'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_upload` (400),
//! `source_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser dashboard
//! can be served from another origin.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::CacheStats;
use crate::config::Config;
use crate::error::IngestError;
use crate::export::write_csv;
use crate::ingest::Ingestor;
use crate::models::{ReportQuery, SourceFile};
use crate::sources::MAX_UPLOAD_BYTES;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ingestor: Ingestor,
}

impl AppState {
    pub fn new(config: Config, ingestor: Ingestor) -> Self {
        Self {
            config: Arc::new(config),
            ingestor,
        }
    }
}

/// Build the router with every endpoint and the CORS layer attached.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/report", get(handle_report))
        .route("/report.csv", get(handle_report_csv))
        .route("/reload", post(handle_reload))
        .route("/files", get(handle_list_files))
        .route(
            "/files/{name}",
            put(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. Returns an error if the provider cannot be built
/// or binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ingestor = Ingestor::from_config(config)?;
    println!(
        "serving reports from {} (cache ttl {}s)",
        ingestor.provider().name(),
        config.cache.ttl_secs
    );

    let app = router(AppState::new(config.clone(), ingestor));

    println!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"source_unavailable"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let (status, code) = match &err {
            IngestError::SourceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "source_unavailable")
            }
            IngestError::InvalidUpload { .. } => (StatusCode::BAD_REQUEST, "invalid_upload"),
            IngestError::MalformedSource { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Query parameters ============

/// Raw query string of `/report` and `/report.csv`.
///
/// Everything is taken as text so malformed values produce the JSON error
/// body instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
struct ReportParams {
    from: Option<String>,
    to: Option<String>,
    threshold: Option<String>,
    sub_division: Option<String>,
    tehsil: Option<String>,
    officer: Option<String>,
}

impl ReportParams {
    fn into_query(self, default_threshold: u64) -> Result<ReportQuery, AppError> {
        let from = parse_date("from", self.from.as_deref())?;
        let to = parse_date("to", self.to.as_deref())?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(bad_request(format!(
                    "'from' ({}) is after 'to' ({})",
                    from, to
                )));
            }
        }

        let threshold = match self.threshold.as_deref().map(str::trim) {
            None | Some("") => default_threshold,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| bad_request(format!("invalid threshold '{}'", raw)))?,
        };

        Ok(ReportQuery {
            from,
            to,
            threshold,
            sub_divisions: split_list(self.sub_division.as_deref()),
            tehsils: split_list(self.tehsil.as_deref()),
            officers: split_list(self.officer.as_deref()),
        })
    }
}

fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| bad_request(format!("invalid {} date '{}', expected YYYY-MM-DD", name, raw))),
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    cache: CacheStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: state.ingestor.cache().stats(),
    })
}

// ============ GET /report ============

async fn handle_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Response, AppError> {
    let query = params.into_query(state.config.report.alert_threshold)?;
    let report = state.ingestor.report(&query).await?;
    Ok(Json(report.as_ref()).into_response())
}

// ============ GET /report.csv ============

async fn handle_report_csv(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Response, AppError> {
    let query = params.into_query(state.config.report.alert_threshold)?;
    let report = state.ingestor.report(&query).await?;

    let mut body = Vec::new();
    write_csv(&report.records, &mut body).map_err(|e| internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"fcr_pendency.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

// ============ POST /reload ============

#[derive(Serialize)]
struct ReloadResponse {
    status: String,
}

async fn handle_reload(State(state): State<AppState>) -> Json<ReloadResponse> {
    state.ingestor.reload();
    Json(ReloadResponse {
        status: "reloaded".to_string(),
    })
}

// ============ GET /files ============

#[derive(Serialize)]
struct FilesResponse {
    provider: String,
    files: Vec<SourceFile>,
}

async fn handle_list_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, AppError> {
    let files = state.ingestor.list_files().await?;
    Ok(Json(FilesResponse {
        provider: state.ingestor.provider().name(),
        files,
    }))
}

// ============ PUT /files/{name} ============

async fn handle_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<SourceFile>), AppError> {
    let file = state.ingestor.upload(&name, &body).await?;
    Ok((StatusCode::CREATED, Json(file)))
}
