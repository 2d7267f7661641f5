use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transit_schedule_core::{
    Connection, ConnectionQuery, ImportError, ImportOptions, ImportReport, NotFoundError,
    ScheduleService, StopDeparture, StopSummary, TripDetails, VersionError, DEFAULT_BATCH_SIZE,
    DEFAULT_CONNECTION_LIMIT,
};
use transit_schedule_model::{DatasetVersion, GtfsTime, VersionId};

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";
const ADMIN_ROLE: &str = "ADMIN";
const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WebConfig::from_env();
    let state = AppState::new(ImportOptions::default().with_batch_size(config.batch_size));
    if let Some(path) = config.bootstrap_feed.clone() {
        bootstrap(&state, path).await?;
    }

    let app = app(state, config.max_upload_bytes);
    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!("listening on {}", config.addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug, Clone)]
struct WebConfig {
    addr: String,
    batch_size: usize,
    max_upload_bytes: usize,
    bootstrap_feed: Option<PathBuf>,
}

impl WebConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: usize| {
            lookup(key)
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };
        Self {
            addr: lookup("SCHEDULE_WEB_ADDR")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            batch_size: number("SCHEDULE_IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            max_upload_bytes: number("SCHEDULE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            bootstrap_feed: lookup("SCHEDULE_BOOTSTRAP_FEED")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Clone)]
struct AppState {
    service: Arc<ScheduleService>,
}

impl AppState {
    fn new(options: ImportOptions) -> Self {
        Self {
            service: Arc::new(ScheduleService::new(options)),
        }
    }
}

fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/version", get(version))
        .route("/gtfs/upload", post(upload_gtfs))
        .route("/gtfs/versions", get(list_versions))
        .route("/gtfs/versions/:version_id", delete(forget_version))
        .route("/gtfs/versions/:version_id/activate", post(activate_version))
        .route("/schedule/stops", get(list_stops))
        .route("/schedule/stops/:stop_id/departures", get(stop_departures))
        .route("/schedule/connections", get(find_connections))
        .route("/schedule/trips/:trip_id", get(trip_details))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn bootstrap(state: &AppState, path: PathBuf) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("read bootstrap feed {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let service = Arc::clone(&state.service);
    let report = tokio::task::spawn_blocking(move || service.import_dataset(&bytes, &filename, 0))
        .await
        .context("bootstrap import task")?
        .with_context(|| format!("import bootstrap feed {}", path.display()))?;
    info!(version = %report.version.id, "bootstrap feed imported");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    message: String,
    report: ImportReport,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionParams {
    from_stop_id: String,
    to_stop_id: String,
    date: Option<String>,
    time: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(MessageResponse {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let status = match err {
            ImportError::ActivationConflict(_) => StatusCode::CONFLICT,
            ImportError::LoaderPanic { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, format!("Error importing GTFS data: {}", err))
    }
}

impl From<NotFoundError> for ApiError {
    fn from(err: NotFoundError) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, err.to_string())
    }
}

impl From<VersionError> for ApiError {
    fn from(err: VersionError) -> Self {
        let status = match err {
            VersionError::NotFound(_) => StatusCode::NOT_FOUND,
            VersionError::NotImported(_) | VersionError::Active(_) => StatusCode::CONFLICT,
        };
        ApiError::new(status, err.to_string())
    }
}

/// Returns the uploader id of an admin caller.
fn require_admin(headers: &HeaderMap) -> Result<i64, ApiError> {
    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if role != ADMIN_ROLE {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Only administrators can upload GTFS data",
        ));
    }
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "missing or invalid X-User-Id"))
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn upload_gtfs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let uploader_id = require_admin(&headers)?;
    if body.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "empty upload"));
    }
    let filename = params
        .filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "upload.zip".to_string());

    let service = Arc::clone(&state.service);
    let report =
        tokio::task::spawn_blocking(move || service.import_dataset(&body, &filename, uploader_id))
            .await
            .map_err(|err| {
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("import task failed: {}", err),
                )
            })??;

    Ok(Json(UploadResponse {
        message: "GTFS data imported successfully".to_string(),
        report,
    }))
}

async fn list_versions(State(state): State<AppState>) -> Json<Vec<DatasetVersion>> {
    Json(state.service.versions())
}

async fn activate_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(version_id): AxumPath<u64>,
) -> Result<Json<DatasetVersion>, ApiError> {
    require_admin(&headers)?;
    let version = state.service.activate_version(VersionId(version_id))?;
    Ok(Json(version))
}

async fn forget_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(version_id): AxumPath<u64>,
) -> Result<Json<DatasetVersion>, ApiError> {
    require_admin(&headers)?;
    let version = state.service.forget_version(VersionId(version_id))?;
    Ok(Json(version))
}

async fn list_stops(State(state): State<AppState>) -> Json<Vec<StopSummary>> {
    Json(state.service.active_stops())
}

async fn stop_departures(
    State(state): State<AppState>,
    AxumPath(stop_id): AxumPath<String>,
) -> Result<Json<Vec<StopDeparture>>, ApiError> {
    Ok(Json(state.service.departures(&stop_id)?))
}

async fn trip_details(
    State(state): State<AppState>,
    AxumPath(trip_id): AxumPath<String>,
) -> Result<Json<TripDetails>, ApiError> {
    Ok(Json(state.service.trip(&trip_id)?))
}

async fn find_connections(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Result<Json<Vec<Connection>>, ApiError> {
    let now = Local::now();
    let date = match params.date.as_deref() {
        Some(value) => parse_date(value)?,
        None => now.date_naive(),
    };
    let time = match params.time.as_deref() {
        Some(value) => GtfsTime::parse(value)
            .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?,
        None => GtfsTime::from_naive_time(now.time()),
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_CONNECTION_LIMIT)
        .min(DEFAULT_CONNECTION_LIMIT);
    let query =
        ConnectionQuery::new(params.from_stop_id, params.to_stop_id, date, time).with_limit(limit);

    Ok(Json(state.service.find_connections(&query)))
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid date {}", value)))
}
