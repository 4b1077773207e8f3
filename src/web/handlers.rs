//! HTTP request handlers.

use super::AppState;
use crate::config::{ConfigError, ConfigUpdate};
use crate::db::{LogCheckResult, ProbeResult, Snapshot};
use crate::status::{aggregate, OverallStatus};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{Method, StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Snapshots considered for the dashboard uptime figure.
const UPTIME_WINDOW: u32 = 10;

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn success<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        timestamp: Utc::now(),
    })
    .into_response()
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(error.into()),
        timestamp: Utc::now(),
    };
    (status, Json(body)).into_response()
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> Response {
    tracing::error!("{}: {}", context, e);
    failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ============================================================================
// Root and fallback
// ============================================================================

pub async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to StatusWatch API" }))
}

pub async fn handle_not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": "Not Found",
            "message": format!("Route {} {} not found", method, uri.path()),
        })),
    )
}

// ============================================================================
// API: Latest status
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub ping_results: Vec<ProbeResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub log_check: LogCheckResult,
}

#[derive(Debug, Serialize)]
pub struct FullStatus {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub status: OverallStatus,
}

/// The most recent snapshot, or the response to send when there is none.
fn latest(state: &AppState) -> Result<Snapshot, Response> {
    match state.store.latest_snapshot() {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => Err(failure(StatusCode::NOT_FOUND, "No status logs found")),
        Err(e) => Err(internal_error("Failed to load latest snapshot", e)),
    }
}

pub async fn handle_ping_status(State(state): State<AppState>) -> Response {
    match latest(&state) {
        Ok(s) => success(PingEntry {
            id: None,
            timestamp: s.timestamp,
            ping_results: s.ping_results,
        }),
        Err(response) => response,
    }
}

pub async fn handle_steady_status(State(state): State<AppState>) -> Response {
    match latest(&state) {
        Ok(s) => success(LogEntry {
            id: None,
            timestamp: s.timestamp,
            log_check: s.log_check,
        }),
        Err(response) => response,
    }
}

pub async fn handle_full_status(State(state): State<AppState>) -> Response {
    match latest(&state) {
        Ok(snapshot) => {
            let status = aggregate(&snapshot);
            success(FullStatus { snapshot, status })
        }
        Err(response) => response,
    }
}

// ============================================================================
// API: Paginated history
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub start_after: Option<String>,
}

impl PageQuery {
    fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    fn cursor(&self) -> Result<Option<DateTime<Utc>>, String> {
        match self.start_after.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| format!("startAfter must be an RFC 3339 timestamp, got '{}'", raw)),
        }
    }
}

fn page(
    state: &AppState,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Vec<Snapshot>, Response> {
    let Query(query) =
        query.map_err(|rejection| failure(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    let cursor = query
        .cursor()
        .map_err(|msg| failure(StatusCode::BAD_REQUEST, msg))?;

    state
        .store
        .snapshot_page(query.limit(), cursor)
        .map_err(|e| internal_error("Failed to load snapshot page", e))
}

pub async fn handle_ping_list(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Response {
    match page(&state, query) {
        Ok(snapshots) => success(
            snapshots
                .into_iter()
                .map(|s| PingEntry {
                    id: Some(s.id),
                    timestamp: s.timestamp,
                    ping_results: s.ping_results,
                })
                .collect::<Vec<_>>(),
        ),
        Err(response) => response,
    }
}

pub async fn handle_steady_list(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Response {
    match page(&state, query) {
        Ok(snapshots) => success(
            snapshots
                .into_iter()
                .map(|s| LogEntry {
                    id: Some(s.id),
                    timestamp: s.timestamp,
                    log_check: s.log_check,
                })
                .collect::<Vec<_>>(),
        ),
        Err(response) => response,
    }
}

// ============================================================================
// API: Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub server: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub success: bool,
    pub status: &'static str,
    pub checks: HealthChecks,
    pub timestamp: DateTime<Utc>,
}

pub async fn handle_health(State(state): State<AppState>) -> Response {
    let database_ok = match state.store.count_snapshots() {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            false
        }
    };

    let report = HealthReport {
        success: database_ok,
        status: if database_ok { "healthy" } else { "unhealthy" },
        checks: HealthChecks {
            server: "up",
            database: if database_ok { "up" } else { "down" },
        },
        timestamp: Utc::now(),
    };

    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(report)).into_response()
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> Response {
    let recent = match state.store.snapshot_page(UPTIME_WINDOW, None) {
        Ok(recent) => recent,
        Err(e) => return internal_error("Failed to load dashboard data", e),
    };

    let content = render_dashboard(&recent);
    let page = fill_template(
        LAYOUT_TEMPLATE,
        &[("title", "StatusWatch Dashboard"), ("content", &content)],
    );

    Html(page).into_response()
}

/// Render the dashboard body from snapshots ordered newest first.
fn render_dashboard(recent: &[Snapshot]) -> String {
    let Some(latest) = recent.first() else {
        return fill_template(
            DASHBOARD_TEMPLATE,
            &[
                ("overall_class", "unknown"),
                ("overall_label", "no data yet"),
                ("last_check", "never"),
                ("uptime_window", &UPTIME_WINDOW.to_string()),
                ("uptime", "n/a"),
                ("endpoint_rows", ""),
                ("log_class", "unknown"),
                ("log_summary", "No log checks recorded"),
                ("history_rows", ""),
            ],
        );
    };

    let overall = aggregate(latest);

    let endpoint_rows: String = latest
        .ping_results
        .iter()
        .map(|r| {
            let (class, status, time) = if r.is_unreachable() {
                ("error", "unreachable".to_string(), "-".to_string())
            } else if r.is_successful() {
                ("healthy", r.status_code.to_string(), format!("{} ms", r.response_time_ms))
            } else {
                ("warning", r.status_code.to_string(), format!("{} ms", r.response_time_ms))
            };
            format!(
                "        <tr><td>{}</td><td class=\"{}\">{}</td><td>{}</td></tr>\n",
                escape_html(&r.endpoint),
                class,
                status,
                time
            )
        })
        .collect();

    let history_rows: String = recent
        .iter()
        .map(|s| {
            let status = aggregate(s);
            let up = s.ping_results.iter().filter(|r| r.is_successful()).count();
            format!(
                "        <tr><td>{}</td><td class=\"{}\">{}</td><td>{}/{}</td><td>{}</td></tr>\n",
                s.timestamp.to_rfc3339(),
                status_class(status),
                status.label(),
                up,
                s.ping_results.len(),
                if s.log_check.success { "ok" } else { "failed" }
            )
        })
        .collect();

    let log = &latest.log_check;
    let (log_class, log_summary) = if log.success {
        ("healthy", format!("{} matching entries found", log.found_entries))
    } else {
        (
            "error",
            escape_html(log.error.as_deref().unwrap_or("Log check failed")),
        )
    };

    fill_template(
        DASHBOARD_TEMPLATE,
        &[
            ("overall_class", status_class(overall)),
            ("overall_label", overall.label()),
            ("last_check", &latest.timestamp.to_rfc3339()),
            ("uptime_window", &recent.len().to_string()),
            ("uptime", &format!("{:.1}%", uptime_percent(recent))),
            ("endpoint_rows", &endpoint_rows),
            ("log_class", log_class),
            ("log_summary", &log_summary),
            ("history_rows", &history_rows),
        ],
    )
}

/// Replace each `{{name}}` in `template` with its value in one pass.
///
/// Inserted values are never scanned for placeholders. Unknown names are left as-is.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);

        let name = &after[..close];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

fn status_class(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Up => "healthy",
        OverallStatus::PartiallyUp => "warning",
        OverallStatus::Down => "error",
    }
}

/// Share of snapshots in which every endpoint answered 2xx.
fn uptime_percent(snapshots: &[Snapshot]) -> f64 {
    if snapshots.is_empty() {
        return 0.0;
    }
    let up = snapshots
        .iter()
        .filter(|s| s.ping_results.iter().all(|r| r.is_successful()))
        .count();
    up as f64 * 100.0 / snapshots.len() as f64
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// API: Configuration
// ============================================================================

pub async fn handle_get_config(State(state): State<AppState>) -> Response {
    success(state.config.current())
}

#[derive(Debug, Serialize)]
struct ValidationFailure {
    success: bool,
    error: &'static str,
    message: &'static str,
    errors: Vec<String>,
    timestamp: DateTime<Utc>,
}

fn validation_failure(errors: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ValidationFailure {
            success: false,
            error: "Bad Request",
            message: "Validation failed",
            errors,
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

pub async fn handle_update_config(
    State(state): State<AppState>,
    update: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match update {
        Ok(update) => update,
        Err(rejection) => return validation_failure(vec![rejection.body_text()]),
    };
    let previous = state.config.current();

    let next = match state.config.apply(update) {
        Ok(next) => next,
        Err(ConfigError::Invalid(errors)) => return validation_failure(errors),
        Err(e) => return internal_error("Failed to save configuration", e),
    };

    if next.ping_interval != previous.ping_interval
        || next.data_retention_days != previous.data_retention_days
    {
        tracing::info!("Schedule settings changed, restarting scheduler");
        let scheduler = state.scheduler.clone();
        let cadence = next.ping_interval.clone();
        let days = next.data_retention_days;
        tokio::spawn(async move {
            if let Err(e) = scheduler.start(&cadence, days).await {
                tracing::error!("Failed to restart scheduler: {}", e);
            }
        });
    }

    success(next)
}
