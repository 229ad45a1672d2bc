//! Status queries: pure ledger reads, polled by the dashboard every ~15 s.

use axum::extract::{Path, State};
use axum::Json;

use scrapeboard_core::{WorkflowKind, WorkflowStatus};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Snapshot of every workflow kind in one document.
pub async fn all_status(
    State(app): State<AppState>,
    _user: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut doc = serde_json::Map::new();
    for status in app.orchestrator.snapshot()? {
        doc.insert(status.kind.as_str().to_string(), serde_json::to_value(&status)?);
    }
    Ok(Json(doc.into()))
}

/// Snapshot of a single workflow kind.
pub async fn kind_status(
    State(app): State<AppState>,
    Path(kind): Path<String>,
    _user: AuthUser,
) -> Result<Json<WorkflowStatus>, AppError> {
    let kind: WorkflowKind = kind.parse()?;
    Ok(Json(app.orchestrator.query(kind)?))
}
