//! Start and download endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use scrapeboard_core::artifact::ActivityFormat;
use scrapeboard_core::{ActivityParams, WorkflowKind};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct StartRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub scope: Option<String>,
}

/// `POST /api/scrape/{kind}`: try to start a run. Returns 202 immediately;
/// progress is observed through the status endpoints.
///
/// The body is only read for `mods_activity` (general takes no input), so
/// it arrives as a raw string and is parsed per kind.
pub async fn start(
    State(app): State<AppState>,
    Path(kind): Path<String>,
    user: AuthUser,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let kind: WorkflowKind = kind.parse()?;
    let params = match kind {
        WorkflowKind::General => None,
        WorkflowKind::ModsActivity => {
            let request: StartRequest = if body.trim().is_empty() {
                StartRequest::default()
            } else {
                serde_json::from_str(&body)
                    .map_err(|e| AppError::bad_request(format!("invalid request body: {e}")))?
            };
            Some(parse_activity_params(&request)?)
        }
    };

    let run_id = app.orchestrator.start(kind, &user.0, params)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true, "run_id": run_id })),
    ))
}

fn parse_activity_params(body: &StartRequest) -> Result<ActivityParams, AppError> {
    let (Some(start), Some(end)) = (body.start_date.as_deref(), body.end_date.as_deref()) else {
        return Err(AppError::bad_request(
            "mods_activity requires start_date and end_date (YYYY-MM-DD)",
        ));
    };
    Ok(ActivityParams::parse(
        start,
        end,
        body.scope.as_deref().unwrap_or("active"),
    )?)
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct DownloadQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub scope: Option<String>,
    pub format: Option<String>,
}

/// `GET /api/scrape/{kind}/download`: the last successful artifact, or 404
/// while none exists. For `mods_activity` the stored records are filtered
/// by the query's date range and scope at read time.
pub async fn download(
    State(app): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<DownloadQuery>,
    _user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let kind: WorkflowKind = kind.parse()?;

    let filter = match (query.start_date.as_deref(), query.end_date.as_deref()) {
        (Some(start), Some(end)) => Some(ActivityParams::parse(
            start,
            end,
            query.scope.as_deref().unwrap_or("all"),
        )?),
        (None, None) => None,
        _ => {
            return Err(AppError::bad_request(
                "start_date and end_date must be provided together",
            ))
        }
    };
    let format = match query.format.as_deref() {
        None | Some("detail") => ActivityFormat::Detail,
        Some("summary") => ActivityFormat::Summary,
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "unknown format '{other}': expected 'detail' or 'summary'"
            )))
        }
    };

    let bytes = app.orchestrator.download(kind, filter.as_ref(), format)?;
    let (content_type, filename) = match kind {
        WorkflowKind::General => ("text/plain; charset=utf-8", "topics.txt"),
        WorkflowKind::ModsActivity => match format {
            ActivityFormat::Detail => ("text/csv; charset=utf-8", "activities.csv"),
            ActivityFormat::Summary => ("text/csv; charset=utf-8", "activity_summary.csv"),
        },
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    ))
}
