use std::time::Duration;

use thiserror::Error;

use crate::types::WorkflowKind;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("a {kind} scrape is already running")]
    AlreadyRunning {
        kind: WorkflowKind,
        /// User who triggered the in-flight run, for display.
        runner: Option<String>,
    },

    #[error(
        "please wait {} minutes and {} seconds before starting a new scrape",
        .retry_after.as_secs() / 60,
        .retry_after.as_secs() % 60
    )]
    Cooldown { retry_after: Duration },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("password reset required before scrapes can be triggered")]
    PasswordResetRequired,

    #[error("no {0} artifact available yet: run the scraper first")]
    NotReady(WorkflowKind),

    #[error("unknown workflow kind: {0}")]
    UnknownKind(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
