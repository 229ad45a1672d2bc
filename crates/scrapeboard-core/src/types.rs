//! Shared domain types: workflow kinds, run parameters, principals, and the
//! records the automation driver produces.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

// ---------------------------------------------------------------------------
// WorkflowKind
// ---------------------------------------------------------------------------

/// One of the two supported scrape workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Anonymous walk of the public forum: every subforum's topic listing
    /// to pagination exhaustion.
    General,
    /// Logged-in fetch of the moderator activity log within a date range.
    ModsActivity,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 2] = [WorkflowKind::General, WorkflowKind::ModsActivity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::ModsActivity => "mods_activity",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "mods_activity" => Ok(Self::ModsActivity),
            other => Err(ScrapeError::UnknownKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ModScope / ActivityParams
// ---------------------------------------------------------------------------

/// Which moderators an activity download covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModScope {
    /// Only moderators currently listed in the moderator group.
    Active,
    /// Every moderator that appears in the log.
    All,
}

impl FromStr for ModScope {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "all" => Ok(Self::All),
            other => Err(ScrapeError::InvalidParams(format!(
                "mods scope must be 'active' or 'all', got '{other}'"
            ))),
        }
    }
}

/// Input for a `mods_activity` run.
///
/// The end date is inclusive: filtering and scraping both extend through
/// 23:59:59 of `end_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub scope: ModScope,
}

impl ActivityParams {
    /// Parse and validate raw form input (`YYYY-MM-DD` dates).
    pub fn parse(start_date: &str, end_date: &str, scope: &str) -> Result<Self, ScrapeError> {
        let start = parse_date(start_date)?;
        let end = parse_date(end_date)?;
        let params = Self {
            start_date: start,
            end_date: end,
            scope: scope.parse()?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.start_date > self.end_date {
            return Err(ScrapeError::InvalidParams(
                "start date must be before end date".into(),
            ));
        }
        Ok(())
    }

    /// Inclusive lower bound of the range.
    pub fn start_bound(&self) -> NaiveDateTime {
        self.start_date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
    }

    /// Inclusive upper bound of the range (whole end date included).
    pub fn end_bound(&self) -> NaiveDateTime {
        self.end_date
            .and_hms_opt(23, 59, 59)
            .expect("23:59:59 is a valid time")
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ScrapeError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        ScrapeError::InvalidParams(format!("invalid date '{s}': expected YYYY-MM-DD"))
    })
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The authenticated caller, as handed over by the auth collaborator.
///
/// The legacy `last_*_time` fields carry trigger timestamps recorded by the
/// previous system; the rate limiter consults them only when its own ledger
/// has no record for the (user, kind) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub password_needs_reset: bool,
    #[serde(default)]
    pub last_scrape_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_mods_scrape_time: Option<DateTime<Utc>>,
}

impl Principal {
    /// Legacy trigger timestamp for the given kind, if the auth layer
    /// provided one.
    pub fn legacy_trigger(&self, kind: WorkflowKind) -> Option<DateTime<Utc>> {
        match kind {
            WorkflowKind::General => self.last_scrape_time,
            WorkflowKind::ModsActivity => self.last_mods_scrape_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver records
// ---------------------------------------------------------------------------

/// One topic link harvested by the general workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub subforum: String,
    pub title: String,
    pub link: String,
}

/// One moderator-log entry harvested by the mods-activity workflow.
///
/// `active` is tagged at scrape time from the moderator-group membership so
/// downloads can filter by scope without re-running the scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub moderator: String,
    pub action: String,
    pub details: String,
    /// Forum-local timestamp of the action.
    pub timestamp: NaiveDateTime,
    pub active: bool,
}

/// Everything a completed run produced, handed to the result materializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunOutput {
    Topics(Vec<TopicRecord>),
    Activities(Vec<ActivityRecord>),
}

impl RunOutput {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::Topics(_) => WorkflowKind::General,
            Self::Activities(_) => WorkflowKind::ModsActivity,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Topics(t) => t.len(),
            Self::Activities(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in WorkflowKind::ALL {
            assert_eq!(kind.as_str().parse::<WorkflowKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "nightly".parse::<WorkflowKind>().unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownKind(_)));
    }

    #[test]
    fn activity_params_parse_valid_range() {
        let params = ActivityParams::parse("2024-01-01", "2024-01-31", "active").unwrap();
        assert_eq!(params.scope, ModScope::Active);
        assert_eq!(params.start_bound().to_string(), "2024-01-01 00:00:00");
        assert_eq!(params.end_bound().to_string(), "2024-01-31 23:59:59");
    }

    #[test]
    fn activity_params_reject_inverted_range() {
        let err = ActivityParams::parse("2024-02-01", "2024-01-01", "all").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidParams(_)));
    }

    #[test]
    fn activity_params_reject_bad_date() {
        let err = ActivityParams::parse("2024-13-01", "2024-01-31", "all").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidParams(_)));
        let err = ActivityParams::parse("01/01/2024", "2024-01-31", "all").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidParams(_)));
    }

    #[test]
    fn activity_params_reject_bad_scope() {
        let err = ActivityParams::parse("2024-01-01", "2024-01-31", "everyone").unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidParams(_)));
    }

    #[test]
    fn single_day_range_is_valid() {
        let params = ActivityParams::parse("2024-01-15", "2024-01-15", "all").unwrap();
        assert!(params.start_bound() < params.end_bound());
    }

    #[test]
    fn legacy_trigger_picks_field_by_kind() {
        let now = Utc::now();
        let principal = Principal {
            user_id: "alice".into(),
            is_admin: false,
            password_needs_reset: false,
            last_scrape_time: Some(now),
            last_mods_scrape_time: None,
        };
        assert_eq!(principal.legacy_trigger(WorkflowKind::General), Some(now));
        assert_eq!(principal.legacy_trigger(WorkflowKind::ModsActivity), None);
    }
}
