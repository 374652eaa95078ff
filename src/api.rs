//! HTTP API handlers for Sonae.
//!
//! - **POST /cron/weekly-report**: Runs the weekly digest. Requires the shared
//!   secret in the `x-cron-secret` header.
//! - **GET /teams/:team_id/report**: Aggregate report and missing categories.
//! - **GET /teams/:team_id/statuses**: Per-item stock statuses.
//! - **PUT /teams/:team_id/settings**: Replace a team's stock settings.
//! - **GET /health**: Health check.
//!
//! Failures are answered with a JSON `{"error": ...}` body.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::aggregation::{aggregate, missing_by_priority};
use crate::calculator::compute_status;
use crate::model::{
    ErrorResponse, ItemStatus, ItemStatusesResponse, Team, TeamReportResponse, TeamStockSettings,
    WeeklyReportResponse,
};
use crate::notifier::Notifier;
use crate::storage::Storage;

/// Header carrying the scheduler's shared secret.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub notifier: Notifier,
    pub cron_secret: SecretString,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cron/weekly-report", post(trigger_weekly_report))
        .route("/teams/:team_id/report", get(get_team_report))
        .route("/teams/:team_id/statuses", get(get_item_statuses))
        .route("/teams/:team_id/settings", put(put_team_settings))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// POST /cron/weekly-report - Run the weekly digest for every team.
///
/// # Response
///
/// ```json
/// {
///     "message": "Weekly report dispatched",
///     "teamsSent": 3
/// }
/// ```
///
/// Returns `401` when the secret is missing or wrong, and `500` when the run
/// could not start. Per-team and per-recipient failures do not fail the call.
#[instrument(skip(state, headers))]
pub async fn trigger_weekly_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WeeklyReportResponse>, ApiError> {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .map(|value| value.as_bytes());

    if !secret_matches(provided, &state.cron_secret) {
        warn!("Weekly report trigger rejected");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    match state.notifier.run_weekly_report(Utc::now()).await {
        Ok(summary) => {
            info!(
                teams_sent = summary.teams_sent,
                teams_skipped = summary.teams_skipped,
                "Weekly report triggered"
            );
            Ok(Json(WeeklyReportResponse {
                message: "Weekly report dispatched".to_string(),
                teams_sent: summary.teams_sent,
            }))
        }
        Err(e) => {
            warn!(error = %e, "Weekly report run failed");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to run weekly report",
            ))
        }
    }
}

/// Compare a presented secret against the configured one in constant time.
pub fn secret_matches(provided: Option<&[u8]>, expected: &SecretString) -> bool {
    provided.is_some_and(|provided| {
        bool::from(provided.ct_eq(expected.expose_secret().as_bytes()))
    })
}

async fn load_team(storage: &Storage, team_id: &str) -> Result<Team, ApiError> {
    match storage.get_team(team_id).await {
        Ok(Some(team)) => Ok(team),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Team not found")),
        Err(e) => {
            warn!(team_id = %team_id, error = %e, "Failed to load team");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load team",
            ))
        }
    }
}

/// GET /teams/:team_id/report - Aggregate report for the team's stock level.
///
/// # Response
///
/// ```json
/// {
///     "team_id": "team-1",
///     "report": { "total_items": 4, "overall_percentage": 63, "...": "..." },
///     "missing": { "essential": ["医薬品"], "important": [], "recommended": [] }
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_team_report(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<TeamReportResponse>, ApiError> {
    let team = load_team(&state.storage, &team_id).await?;

    let items = state.storage.list_active_items(&team_id).await.map_err(|e| {
        warn!(team_id = %team_id, error = %e, "Failed to load items");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load items")
    })?;

    let report = aggregate(&items, &team.settings);
    let missing = missing_by_priority(&items, team.settings.stock_level);

    info!(
        team_id = %team_id,
        total_items = report.total_items,
        overall_percentage = report.overall_percentage,
        "Team report queried"
    );

    Ok(Json(TeamReportResponse {
        team_id,
        report,
        missing,
    }))
}

/// GET /teams/:team_id/statuses - Stock status of every non-archived item.
#[instrument(skip(state))]
pub async fn get_item_statuses(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<ItemStatusesResponse>, ApiError> {
    let team = load_team(&state.storage, &team_id).await?;

    let items = state.storage.list_active_items(&team_id).await.map_err(|e| {
        warn!(team_id = %team_id, error = %e, "Failed to load items");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load items")
    })?;

    let items: Vec<ItemStatus> = items
        .iter()
        .map(|item| ItemStatus {
            item_id: item.id.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
            status: compute_status(item, &team.settings),
        })
        .collect();

    info!(team_id = %team_id, item_count = items.len(), "Item statuses queried");

    Ok(Json(ItemStatusesResponse { team_id, items }))
}

/// PUT /teams/:team_id/settings - Replace a team's stock settings.
///
/// Missing fields take their defaults. Returns `400` for a malformed body or
/// settings that fail validation, `404` for an unknown team.
#[instrument(skip(state, body))]
pub async fn put_team_settings(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    body: Result<Json<TeamStockSettings>, JsonRejection>,
) -> Result<Json<TeamStockSettings>, ApiError> {
    let Json(settings) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;

    if let Err(e) = settings.validate() {
        warn!(team_id = %team_id, error = %e, "Rejected settings update");
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }

    match state.storage.update_settings(&team_id, &settings).await {
        Ok(true) => {
            info!(
                team_id = %team_id,
                household_size = settings.household_size,
                stock_days = settings.stock_days,
                "Team settings updated"
            );
            Ok(Json(settings))
        }
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "Team not found")),
        Err(e) => {
            warn!(team_id = %team_id, error = %e, "Failed to update settings");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update settings",
            ))
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
