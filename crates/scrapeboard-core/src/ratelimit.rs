//! Per-user, per-workflow cooldown checks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ledger::StatusLedger;
use crate::types::{Principal, WorkflowKind};

/// Minimum wait between accepted triggers of the same kind for non-admins.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Cooldown gate over the ledger's trigger records.
///
/// Each check uses one `now` snapshot, so an immediately retried check can
/// never flip to `Allowed` on clock jitter alone.
pub struct RateLimiter {
    ledger: Arc<StatusLedger>,
    window: chrono::Duration,
}

impl RateLimiter {
    pub fn new(ledger: Arc<StatusLedger>, window: Duration) -> Self {
        Self {
            ledger,
            window: chrono::Duration::from_std(window)
                .expect("cooldown window fits in a chrono Duration"),
        }
    }

    /// May `principal` trigger `kind` at `now`?
    ///
    /// Admins are always allowed. For everyone else the ledger record wins;
    /// the principal's legacy timestamp is consulted only when the ledger
    /// has never seen this (user, kind) pair.
    pub fn check(
        &self,
        principal: &Principal,
        kind: WorkflowKind,
        now: DateTime<Utc>,
    ) -> Result<RateDecision> {
        if principal.is_admin {
            return Ok(RateDecision::Allowed);
        }

        let last = match self.ledger.last_triggered(&principal.user_id, kind)? {
            Some(ts) => Some(ts),
            None => principal.legacy_trigger(kind),
        };
        let Some(last) = last else {
            return Ok(RateDecision::Allowed);
        };

        let elapsed = now - last;
        if elapsed >= self.window {
            Ok(RateDecision::Allowed)
        } else {
            let residual = (self.window - elapsed)
                .to_std()
                .unwrap_or(Duration::ZERO);
            Ok(RateDecision::Limited {
                retry_after: residual,
            })
        }
    }

    /// Record an accepted trigger. Invoked by the orchestrator only after
    /// all constraint checks passed.
    pub fn record(&self, user: &str, kind: WorkflowKind, now: DateTime<Utc>) -> Result<()> {
        self.ledger.record_trigger(user, kind, now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
