//! Persistent status ledger backed by redb.
//!
//! # Table design
//!
//! Two tables:
//! - `workflows` — one record per workflow kind, keyed by the kind's string
//!   name, value JSON-encoded [`WorkflowStatus`]. Statuses are created
//!   lazily: a `get` for a kind with no record returns `not_started`.
//! - `rate_limits` — one record per (user, kind), keyed by
//!   `user \x1f kind` (unit separator cannot appear in a user id), value the
//!   unix-millisecond timestamp of the last accepted trigger.
//!
//! All writes go through single-table transactions, so a concurrent `get`
//! observes either the previous or the new status document, never a torn
//! one.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::warn;

use crate::error::{Result, ScrapeError};
use crate::status::WorkflowStatus;
use crate::types::WorkflowKind;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: workflow kind name. Value: JSON-encoded WorkflowStatus.
const WORKFLOWS: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");

/// Key: `user \x1f kind`. Value: unix-millis of the last accepted trigger.
const RATE_LIMITS: TableDefinition<&str, u64> = TableDefinition::new("rate_limits");

fn rate_key(user: &str, kind: WorkflowKind) -> String {
    format!("{user}\x1f{kind}")
}

// ---------------------------------------------------------------------------
// StatusLedger
// ---------------------------------------------------------------------------

/// Durable store for workflow statuses and rate-limit records.
pub struct StatusLedger {
    db: Database,
}

impl StatusLedger {
    /// Open or create the redb database at `path`.
    ///
    /// Creates both tables if they don't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        let wt = db
            .begin_write()
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        wt.open_table(WORKFLOWS)
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        wt.open_table(RATE_LIMITS)
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        wt.commit().map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        Ok(Self { db })
    }

    /// Read the status for `kind`, defaulting to `not_started` when no run
    /// was ever recorded.
    pub fn get(&self, kind: WorkflowKind) -> Result<WorkflowStatus> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        let table = rt
            .open_table(WORKFLOWS)
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        match table
            .get(kind.as_str())
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?
        {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Ok(WorkflowStatus::not_started(kind)),
        }
    }

    /// Write (replace) the status document for its kind.
    pub fn put(&self, status: &WorkflowStatus) -> Result<()> {
        let value = serde_json::to_vec(status)?;
        let wt = self
            .db
            .begin_write()
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        {
            let mut table = wt
                .open_table(WORKFLOWS)
                .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
            table
                .insert(status.kind.as_str(), value.as_slice())
                .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        }
        wt.commit().map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        Ok(())
    }

    /// Last accepted trigger for (user, kind), if any.
    pub fn last_triggered(&self, user: &str, kind: WorkflowKind) -> Result<Option<DateTime<Utc>>> {
        let rt = self
            .db
            .begin_read()
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        let table = rt
            .open_table(RATE_LIMITS)
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        let millis = table
            .get(rate_key(user, kind).as_str())
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?
            .map(|v| v.value());
        Ok(millis.and_then(|ms| DateTime::from_timestamp_millis(ms as i64)))
    }

    /// Record an accepted trigger for (user, kind). Called only after every
    /// constraint check has passed.
    pub fn record_trigger(
        &self,
        user: &str,
        kind: WorkflowKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let wt = self
            .db
            .begin_write()
            .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        {
            let mut table = wt
                .open_table(RATE_LIMITS)
                .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
            table
                .insert(
                    rate_key(user, kind).as_str(),
                    now.timestamp_millis().max(0) as u64,
                )
                .map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        }
        wt.commit().map_err(|e| ScrapeError::Ledger(e.to_string()))?;
        Ok(())
    }

    /// On process startup, mark any kind still recorded `in_progress` as
    /// `failed`. A hard crash leaves such a record behind with no
    /// supervising task, and without reconciliation the single-flight check
    /// would lock that kind out forever.
    ///
    /// Returns the number of records reconciled.
    pub fn recover_orphans(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut count = 0u32;
        for kind in WorkflowKind::ALL {
            let mut status = self.get(kind)?;
            if status.is_in_progress() {
                warn!(kind = %kind, run_id = ?status.run_id, "reconciling orphaned run");
                status.fail("orphaned run: interrupted by a process restart".into(), now);
                self.put(&status)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
