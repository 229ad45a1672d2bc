//! Result materializer and artifact store.
//!
//! One artifact file per workflow kind, overwritten on each successful run
//! (no versioning). A failed retry never touches the previous artifact.
//! Filtering by date range and scope happens at read time over the stored
//! records, so a single successful `mods_activity` run can serve any
//! sub-range without re-scraping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{Result, ScrapeError};
use crate::types::{ActivityParams, ActivityRecord, ModScope, RunOutput, TopicRecord, WorkflowKind};

// ---------------------------------------------------------------------------
// Download options
// ---------------------------------------------------------------------------

/// Rendering of a `mods_activity` download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityFormat {
    /// One CSV row per log entry.
    #[default]
    Detail,
    /// Count of entries per (moderator, action) pair.
    Summary,
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Flat-file store of materialized run results.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path(&self, kind: WorkflowKind) -> PathBuf {
        self.dir.join(format!("{kind}.json"))
    }

    /// Serialize a run's records, atomically replacing any prior artifact
    /// for the kind. Returns the artifact's `result_ref`.
    pub fn materialize(&self, output: &RunOutput) -> Result<String> {
        let kind = output.kind();
        let result_ref = format!("{kind}.json");
        let bytes = match output {
            RunOutput::Topics(topics) => serde_json::to_vec(topics)?,
            RunOutput::Activities(records) => serde_json::to_vec(records)?,
        };
        // Write-then-rename so a reader never observes a half-written file.
        let tmp = self.dir.join(format!("{kind}.json.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, self.path(kind))?;
        Ok(result_ref)
    }

    /// Whether a successful run of `kind` ever materialized an artifact.
    pub fn exists(&self, kind: WorkflowKind) -> bool {
        self.path(kind).is_file()
    }

    fn load<T: DeserializeOwned>(&self, kind: WorkflowKind) -> Result<T> {
        let bytes = match fs::read(self.path(kind)) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScrapeError::NotReady(kind))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The general artifact: topics grouped by subforum in the forum's own
    /// list markup.
    pub fn read_general(&self) -> Result<Vec<u8>> {
        let topics: Vec<TopicRecord> = self.load(WorkflowKind::General)?;
        Ok(render_topic_listing(&topics).into_bytes())
    }

    /// The mods-activity artifact, filtered by date range and scope at read
    /// time. An empty post-filter result is a valid (header-only) artifact.
    pub fn read_activity(
        &self,
        filter: Option<&ActivityParams>,
        format: ActivityFormat,
    ) -> Result<Vec<u8>> {
        let records: Vec<ActivityRecord> = self.load(WorkflowKind::ModsActivity)?;
        let filtered: Vec<&ActivityRecord> = records
            .iter()
            .filter(|r| match filter {
                Some(f) => {
                    r.timestamp >= f.start_bound()
                        && r.timestamp <= f.end_bound()
                        && (f.scope == ModScope::All || r.active)
                }
                None => true,
            })
            .collect();
        let rendered = match format {
            ActivityFormat::Detail => render_activity_csv(&filtered),
            ActivityFormat::Summary => render_summary_csv(&filtered),
        };
        Ok(rendered.into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// BBCode-style listing, one section per subforum:
///
/// ```text
/// [subforum]
/// [*][url=link]title[/url]
/// ```
fn render_topic_listing(topics: &[TopicRecord]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for topic in topics {
        if current != Some(topic.subforum.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", topic.subforum));
            current = Some(&topic.subforum);
        }
        out.push_str(&format!("[*][url={}]{}[/url]\n", topic.link, topic.title));
    }
    out
}

fn render_activity_csv(records: &[&ActivityRecord]) -> String {
    let mut out = String::from("moderator,action,details,date\n");
    for r in records {
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&r.moderator),
            csv_field(&r.action),
            csv_field(&r.details),
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    out
}

fn render_summary_csv(records: &[&ActivityRecord]) -> String {
    let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for r in records {
        *counts
            .entry((r.moderator.as_str(), r.action.as_str()))
            .or_default() += 1;
    }
    let mut out = String::from("moderator,action,count\n");
    for ((moderator, action), count) in counts {
        out.push_str(&format!(
            "{},{},{count}\n",
            csv_field(moderator),
            csv_field(action),
        ));
    }
    out
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn topic(subforum: &str, title: &str) -> TopicRecord {
        TopicRecord {
            subforum: subforum.into(),
            title: title.into(),
            link: format!("https://forum.example/t/{title}"),
        }
    }

    fn activity(moderator: &str, day: u32, active: bool) -> ActivityRecord {
        ActivityRecord {
            moderator: moderator.into(),
            action: "Usunięto post".into(),
            details: format!("post {day} removed"),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            active,
        }
    }

    fn params(start: &str, end: &str, scope: &str) -> ActivityParams {
        ActivityParams::parse(start, end, scope).unwrap()
    }

    #[test]
    fn read_before_materialize_is_not_ready() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_general(),
            Err(ScrapeError::NotReady(WorkflowKind::General))
        ));
        assert!(matches!(
            store.read_activity(None, ActivityFormat::Detail),
            Err(ScrapeError::NotReady(WorkflowKind::ModsActivity))
        ));
    }

    #[test]
    fn general_listing_groups_by_subforum() {
        let (_dir, store) = store();
        let output = RunOutput::Topics(vec![
            topic("hardware", "first"),
            topic("hardware", "second"),
            topic("software", "third"),
        ]);
        let result_ref = store.materialize(&output).unwrap();
        assert_eq!(result_ref, "general.json");

        let text = String::from_utf8(store.read_general().unwrap()).unwrap();
        assert!(text.starts_with("[hardware]\n"));
        assert!(text.contains("[*][url=https://forum.example/t/first]first[/url]\n"));
        assert!(text.contains("\n[software]\n"));
    }

    #[test]
    fn materialize_overwrites_prior_artifact() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Topics(vec![topic("a", "old")]))
            .unwrap();
        store
            .materialize(&RunOutput::Topics(vec![topic("a", "new")]))
            .unwrap();

        let text = String::from_utf8(store.read_general().unwrap()).unwrap();
        assert!(text.contains("new"));
        assert!(!text.contains("old"));
    }

    #[test]
    fn kinds_do_not_clobber_each_other() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Topics(vec![topic("a", "t")]))
            .unwrap();
        store
            .materialize(&RunOutput::Activities(vec![activity("mod1", 5, true)]))
            .unwrap();
        assert!(store.exists(WorkflowKind::General));
        assert!(store.exists(WorkflowKind::ModsActivity));
        assert!(store.read_general().is_ok());
    }

    #[test]
    fn activity_filter_respects_date_range() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![
                activity("mod1", 5, true),
                activity("mod1", 15, true),
                activity("mod1", 25, true),
            ]))
            .unwrap();

        let csv = String::from_utf8(
            store
                .read_activity(
                    Some(&params("2024-01-10", "2024-01-20", "all")),
                    ActivityFormat::Detail,
                )
                .unwrap(),
        )
        .unwrap();
        assert!(csv.contains("2024-01-15"));
        assert!(!csv.contains("2024-01-05"));
        assert!(!csv.contains("2024-01-25"));
    }

    #[test]
    fn end_date_is_inclusive() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![activity("mod1", 20, true)]))
            .unwrap();

        let csv = String::from_utf8(
            store
                .read_activity(
                    Some(&params("2024-01-01", "2024-01-20", "all")),
                    ActivityFormat::Detail,
                )
                .unwrap(),
        )
        .unwrap();
        assert!(csv.contains("2024-01-20 12:00:00"));
    }

    #[test]
    fn active_scope_is_subset_of_all() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![
                activity("mod1", 5, true),
                activity("mod2", 6, false),
                activity("mod3", 7, true),
            ]))
            .unwrap();

        let all = String::from_utf8(
            store
                .read_activity(
                    Some(&params("2024-01-01", "2024-01-31", "all")),
                    ActivityFormat::Detail,
                )
                .unwrap(),
        )
        .unwrap();
        let active = String::from_utf8(
            store
                .read_activity(
                    Some(&params("2024-01-01", "2024-01-31", "active")),
                    ActivityFormat::Detail,
                )
                .unwrap(),
        )
        .unwrap();

        for line in active.lines().skip(1) {
            assert!(all.contains(line), "active row missing from all: {line}");
        }
        assert!(all.contains("mod2"));
        assert!(!active.contains("mod2"));
    }

    #[test]
    fn empty_filter_result_is_a_valid_empty_artifact() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![activity("mod1", 5, true)]))
            .unwrap();

        let csv = String::from_utf8(
            store
                .read_activity(
                    Some(&params("2023-06-01", "2023-06-30", "all")),
                    ActivityFormat::Detail,
                )
                .unwrap(),
        )
        .unwrap();
        assert_eq!(csv, "moderator,action,details,date\n");
    }

    #[test]
    fn no_filter_returns_everything() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![
                activity("mod1", 5, true),
                activity("mod2", 6, false),
            ]))
            .unwrap();

        let csv = String::from_utf8(
            store.read_activity(None, ActivityFormat::Detail).unwrap(),
        )
        .unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn summary_counts_per_moderator_and_action() {
        let (_dir, store) = store();
        store
            .materialize(&RunOutput::Activities(vec![
                activity("mod1", 5, true),
                activity("mod1", 6, true),
                activity("mod2", 7, true),
            ]))
            .unwrap();

        let csv = String::from_utf8(
            store.read_activity(None, ActivityFormat::Summary).unwrap(),
        )
        .unwrap();
        assert!(csv.contains("mod1,Usunięto post,2"));
        assert!(csv.contains("mod2,Usunięto post,1"));
    }

    #[test]
    fn csv_fields_with_delimiters_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
