//! Seam between the orchestrator and the automation driver.
//!
//! The orchestrator supervises a driver through this trait and never sees
//! HTTP, HTML, or proxy plumbing. A driver run is all-or-nothing: an error
//! discards any partially collected records for that run.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ActivityParams, RunOutput, WorkflowKind};

/// Failure of a driver run, split so `error_detail` distinguishes the proxy
/// being down from the remote site misbehaving.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The SOCKS proxy endpoint could not be reached (operational failure,
    /// nothing was fetched from the site).
    #[error("proxy unavailable: {0}")]
    Proxy(String),

    /// The remote site rejected or broke the session: unexpected status,
    /// navigation timeout, or markup that no longer matches the selectors.
    #[error("site error: {0}")]
    Site(String),

    /// The forum rejected the scraper's own login.
    #[error("forum login failed: {0}")]
    Auth(String),
}

/// Performs one workflow run end-to-end and yields its records.
#[async_trait]
pub trait ScrapeDriver: Send + Sync {
    /// Run the workflow to completion. `params` is present exactly when
    /// `kind` is `mods_activity` (the orchestrator validates this before
    /// dispatch).
    async fn run(
        &self,
        kind: WorkflowKind,
        params: Option<&ActivityParams>,
    ) -> Result<RunOutput, DriverError>;
}
