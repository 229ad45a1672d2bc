//! Scrape job orchestrator.
//!
//! Owns the per-kind single-flight slots, the cooldown gate, and the
//! supervision of driver runs. `start` validates and returns immediately;
//! the spawned task holds the slot token until it writes a terminal status,
//! so a concurrent `start` of the same kind always observes `in_progress`.
//! `query` and `download` never touch the driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};
use uuid::Uuid;

use crate::artifact::{ActivityFormat, ArtifactStore};
use crate::driver::ScrapeDriver;
use crate::error::{Result, ScrapeError};
use crate::ledger::StatusLedger;
use crate::ratelimit::{RateDecision, RateLimiter};
use crate::status::WorkflowStatus;
use crate::types::{ActivityParams, Principal, WorkflowKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Minimum wait between accepted triggers per (user, kind), non-admins.
    pub cooldown: Duration,
    /// Ceiling on a single run; a hung session transitions to `failed`
    /// instead of occupying the single-flight slot forever.
    pub run_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cooldown: crate::ratelimit::DEFAULT_COOLDOWN,
            run_timeout: Duration::from_secs(60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ledger: Arc<StatusLedger>,
    artifacts: Arc<ArtifactStore>,
    driver: Arc<dyn ScrapeDriver>,
    limiter: RateLimiter,
    /// One exclusive slot per kind. The guard lives inside the supervising
    /// task and drops only after the terminal ledger write.
    slots: HashMap<WorkflowKind, Arc<Mutex<()>>>,
    run_timeout: Duration,
}

impl Orchestrator {
    /// Build the orchestrator and reconcile orphaned runs before any
    /// request is served.
    pub fn new(
        ledger: Arc<StatusLedger>,
        artifacts: Arc<ArtifactStore>,
        driver: Arc<dyn ScrapeDriver>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let recovered = ledger.recover_orphans(Utc::now())?;
        if recovered > 0 {
            info!(recovered, "reconciled orphaned runs at startup");
        }
        let limiter = RateLimiter::new(Arc::clone(&ledger), config.cooldown);
        let slots = WorkflowKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        Ok(Self {
            ledger,
            artifacts,
            driver,
            limiter,
            slots,
            run_timeout: config.run_timeout,
        })
    }

    /// Try to start a run of `kind` for `principal`.
    ///
    /// Checks, in order: password-reset gate, single-flight, cooldown,
    /// parameter validity. On acceptance the ledger is updated, the trigger
    /// is recorded against the cooldown window, and the run is launched on
    /// its own supervised task; the call returns without waiting for it.
    pub fn start(
        &self,
        kind: WorkflowKind,
        principal: &Principal,
        params: Option<ActivityParams>,
    ) -> Result<Uuid> {
        if principal.password_needs_reset {
            return Err(ScrapeError::PasswordResetRequired);
        }

        // Single-flight: the slot token is the authority, the ledger only
        // supplies the runner name for display.
        let slot = Arc::clone(
            self.slots
                .get(&kind)
                .expect("a slot exists for every workflow kind"),
        );
        let Ok(guard) = slot.try_lock_owned() else {
            let runner = self.ledger.get(kind)?.triggered_by;
            return Err(ScrapeError::AlreadyRunning { kind, runner });
        };

        let now = Utc::now();
        if let RateDecision::Limited { retry_after } =
            self.limiter.check(principal, kind, now)?
        {
            return Err(ScrapeError::Cooldown { retry_after });
        }

        let params = validate_params(kind, params)?;

        let run_id = Uuid::new_v4();
        let mut status = self.ledger.get(kind)?;
        status.begin(run_id, &principal.user_id, params.clone(), now);
        self.ledger.put(&status)?;
        self.limiter.record(&principal.user_id, kind, now)?;
        info!(kind = %kind, run_id = %run_id, user = %principal.user_id, "scrape run accepted");

        let ctx = RunContext {
            ledger: Arc::clone(&self.ledger),
            artifacts: Arc::clone(&self.artifacts),
            driver: Arc::clone(&self.driver),
            run_timeout: self.run_timeout,
        };
        tokio::spawn(async move {
            supervise(guard, ctx, kind, params, run_id).await;
        });

        Ok(run_id)
    }

    /// Snapshot of the status document for `kind`. Pure read; never blocks
    /// on a run.
    pub fn query(&self, kind: WorkflowKind) -> Result<WorkflowStatus> {
        self.ledger.get(kind)
    }

    /// Snapshots for every workflow kind (the polling dashboard's view).
    pub fn snapshot(&self) -> Result<Vec<WorkflowStatus>> {
        WorkflowKind::ALL
            .into_iter()
            .map(|kind| self.ledger.get(kind))
            .collect()
    }

    /// Bytes of the last successful artifact for `kind`, or `NotReady`.
    ///
    /// Reads the artifact store directly, so a prior successful artifact
    /// stays downloadable after a failed retry.
    pub fn download(
        &self,
        kind: WorkflowKind,
        filter: Option<&ActivityParams>,
        format: ActivityFormat,
    ) -> Result<Vec<u8>> {
        match kind {
            WorkflowKind::General => self.artifacts.read_general(),
            WorkflowKind::ModsActivity => self.artifacts.read_activity(filter, format),
        }
    }
}

fn validate_params(
    kind: WorkflowKind,
    params: Option<ActivityParams>,
) -> Result<Option<ActivityParams>> {
    match kind {
        WorkflowKind::General => Ok(None),
        WorkflowKind::ModsActivity => {
            let params = params.ok_or_else(|| {
                ScrapeError::InvalidParams(
                    "mods_activity requires start_date, end_date, and scope".into(),
                )
            })?;
            params.validate()?;
            Ok(Some(params))
        }
    }
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

/// Everything a supervised run needs besides its own identity.
struct RunContext {
    ledger: Arc<StatusLedger>,
    artifacts: Arc<ArtifactStore>,
    driver: Arc<dyn ScrapeDriver>,
    run_timeout: Duration,
}

/// Drive one run to a terminal ledger state. Every failure path ends in a
/// `failed` write before the slot guard drops, so the kind is never left
/// locked behind a stale `in_progress` record.
async fn supervise(
    guard: OwnedMutexGuard<()>,
    ctx: RunContext,
    kind: WorkflowKind,
    params: Option<ActivityParams>,
    run_id: Uuid,
) {
    let RunContext {
        ledger,
        artifacts,
        driver,
        run_timeout,
    } = ctx;
    let outcome = match tokio::time::timeout(run_timeout, driver.run(kind, params.as_ref())).await
    {
        Ok(Ok(output)) => {
            let count = output.len();
            match artifacts.materialize(&output) {
                Ok(result_ref) => Ok((result_ref, count)),
                Err(e) => Err(format!("failed to materialize results: {e}")),
            }
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "run timed out after {} seconds",
            run_timeout.as_secs()
        )),
    };

    let finished = Utc::now();
    let mut status = match ledger.get(kind) {
        Ok(status) => status,
        Err(e) => {
            error!(kind = %kind, run_id = %run_id, error = %e, "cannot read status for terminal write");
            drop(guard);
            return;
        }
    };
    match outcome {
        Ok((result_ref, count)) => {
            info!(kind = %kind, run_id = %run_id, records = count, "scrape run completed");
            status.complete(result_ref, finished);
        }
        Err(detail) => {
            error!(kind = %kind, run_id = %run_id, detail = %detail, "scrape run failed");
            status.fail(detail, finished);
        }
    }
    if let Err(e) = ledger.put(&status) {
        error!(kind = %kind, run_id = %run_id, error = %e, "terminal status write failed");
    }
    drop(guard);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
