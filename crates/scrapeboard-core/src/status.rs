//! Workflow status document: the single source of truth a polling client
//! reads.
//!
//! Transitions: `not_started → in_progress → complete | failed`, re-entrant
//! after a terminal state (subject to rate limiting). Only the orchestrator
//! mutates a status; everything else consumes snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActivityParams, WorkflowKind};

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Lifecycle state of the most recent run of a workflow kind.
///
/// The orchestrator writes `InProgress` *before* dispatching the driver. On
/// restart, any kind stuck in `InProgress` is reconciled to `Failed` by
/// `StatusLedger::recover_orphans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// No run has ever been triggered for this kind.
    NotStarted,
    /// A supervised task is currently executing (or crashed before
    /// completing).
    InProgress,
    /// The last run finished and its artifact is available.
    Complete { result_ref: String },
    /// The last run failed; `error_detail` is a short diagnostic.
    Failed { error_detail: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// WorkflowStatus
// ---------------------------------------------------------------------------

/// One status document per workflow kind, independent of which user
/// triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub kind: WorkflowKind,
    #[serde(flatten)]
    pub state: RunState,
    /// Identifier of the supervised run, for log correlation.
    pub run_id: Option<Uuid>,
    /// User who triggered the current/last run.
    pub triggered_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Input of the current/last run (`mods_activity` only).
    pub params: Option<ActivityParams>,
}

impl WorkflowStatus {
    /// The lazily-created default: nothing has run yet.
    pub fn not_started(kind: WorkflowKind) -> Self {
        Self {
            kind,
            state: RunState::NotStarted,
            run_id: None,
            triggered_by: None,
            started_at: None,
            finished_at: None,
            params: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == RunState::InProgress
    }

    /// Transition to `in_progress` for a freshly accepted run.
    pub fn begin(
        &mut self,
        run_id: Uuid,
        user: &str,
        params: Option<ActivityParams>,
        now: DateTime<Utc>,
    ) {
        self.state = RunState::InProgress;
        self.run_id = Some(run_id);
        self.triggered_by = Some(user.to_string());
        self.started_at = Some(now);
        self.finished_at = None;
        self.params = params;
    }

    /// Terminal transition after the driver's records were materialized.
    pub fn complete(&mut self, result_ref: String, now: DateTime<Utc>) {
        self.state = RunState::Complete { result_ref };
        self.finished_at = Some(now);
    }

    /// Terminal transition after a driver error, timeout, or orphan
    /// reconciliation.
    pub fn fail(&mut self, error_detail: String, now: DateTime<Utc>) {
        self.state = RunState::Failed { error_detail };
        self.finished_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
