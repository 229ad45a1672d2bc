//! Site configuration: where the forum lives, how to reach it, and which
//! selectors its markup answers to.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::DriverError;

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// CSS selectors for the forum's markup. Defaults match the deployed skin;
/// overriding them in the site file survives a reskin without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(default = "default_subforum_link")]
    pub subforum_link: String,
    #[serde(default = "default_sub_subforum_link")]
    pub sub_subforum_link: String,
    #[serde(default = "default_topic_link")]
    pub topic_link: String,
    #[serde(default = "default_next_page")]
    pub next_page: String,
    #[serde(default = "default_login_form")]
    pub login_form: String,
    #[serde(default = "default_error_box")]
    pub error_box: String,
    #[serde(default = "default_member_name")]
    pub member_name: String,
    #[serde(default = "default_activity_row")]
    pub activity_row: String,
    #[serde(default = "default_activity_action")]
    pub activity_action: String,
    #[serde(default = "default_activity_moderator")]
    pub activity_moderator: String,
    #[serde(default = "default_activity_time")]
    pub activity_time: String,
}

fn default_subforum_link() -> String {
    "a.forumtitle".into()
}
fn default_sub_subforum_link() -> String {
    "a.subforumtitle".into()
}
fn default_topic_link() -> String {
    "a.topictitle".into()
}
fn default_next_page() -> String {
    "li.next a".into()
}
fn default_login_form() -> String {
    "form#login".into()
}
fn default_error_box() -> String {
    "div.error".into()
}
fn default_member_name() -> String {
    "div.member-row a.username".into()
}
fn default_activity_row() -> String {
    "div.log-row".into()
}
fn default_activity_action() -> String {
    "div.log-action".into()
}
fn default_activity_moderator() -> String {
    "div.log-moderator".into()
}
fn default_activity_time() -> String {
    "div.log-time".into()
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            subforum_link: default_subforum_link(),
            sub_subforum_link: default_sub_subforum_link(),
            topic_link: default_topic_link(),
            next_page: default_next_page(),
            login_form: default_login_form(),
            error_box: default_error_box(),
            member_name: default_member_name(),
            activity_row: default_activity_row(),
            activity_action: default_activity_action(),
            activity_moderator: default_activity_moderator(),
            activity_time: default_activity_time(),
        }
    }
}

// ---------------------------------------------------------------------------
// SiteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin of the forum, e.g. `https://forum.example`.
    pub base_url: String,
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Substring whose presence in the post-login page proves the session
    /// is authenticated (the logout link).
    #[serde(default = "default_logout_marker")]
    pub logout_marker: String,
    #[serde(default = "default_group_path")]
    pub group_path: String,
    /// Id of the moderator group.
    #[serde(default = "default_group_id")]
    pub group_id: u32,
    /// Pagination offsets of the member-list pages to fetch.
    #[serde(default = "default_member_page_offsets")]
    pub member_page_offsets: Vec<u32>,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    /// Rows per activity-log page.
    #[serde(default = "default_log_page_size")]
    pub log_page_size: u32,
    /// SOCKS endpoint all outbound traffic is routed through. `socks5h` so
    /// DNS also resolves through the circuit. Empty disables the proxy
    /// (local testing only).
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Whether the proxy enforces single-circuit semantics; if so, session
    /// acquisition is serialized across workflow kinds.
    #[serde(default = "default_single_circuit")]
    pub single_circuit: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ceiling on pages walked per listing, in case the site's pagination
    /// ever cycles.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Topic titles to skip wherever they appear.
    #[serde(default)]
    pub excluded_topics: Vec<String>,
    /// URL fragments identifying sub-subforums to skip.
    #[serde(default)]
    pub excluded_sub_subforum_urls: Vec<String>,
    /// Sub-subforum titles to skip.
    #[serde(default)]
    pub excluded_sub_subforums: Vec<String>,
    /// User-Agent/Referer pairs rotated per request.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<UserAgent>,
    #[serde(default)]
    pub selectors: Selectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgent {
    pub agent: String,
    pub referer: String,
}

fn default_index_path() -> String {
    "/".into()
}
fn default_login_path() -> String {
    "/ucp.php?mode=login".into()
}
fn default_logout_marker() -> String {
    "mode=logout".into()
}
fn default_group_path() -> String {
    "/memberlist.php?mode=group&g=".into()
}
fn default_group_id() -> u32 {
    4
}
fn default_member_page_offsets() -> Vec<u32> {
    vec![0, 15]
}
fn default_logs_path() -> String {
    "/mcp.php?i=logs&start=".into()
}
fn default_log_page_size() -> u32 {
    15
}
fn default_proxy_url() -> String {
    "socks5h://127.0.0.1:9050".into()
}
fn default_single_circuit() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_pages() -> u32 {
    500
}
fn default_user_agents() -> Vec<UserAgent> {
    [
        (
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
            "https://www.google.com/",
        ),
        (
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
            "https://duckduckgo.com/",
        ),
        (
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
            "https://www.bing.com/",
        ),
    ]
    .into_iter()
    .map(|(agent, referer)| UserAgent {
        agent: agent.into(),
        referer: referer.into(),
    })
    .collect()
}

impl SiteConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Site(format!("cannot read site config: {e}")))?;
        serde_yaml::from_str(&text)
            .map_err(|e| DriverError::Site(format!("invalid site config: {e}")))
    }

    /// A config pointing at `base_url` with every default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let yaml = format!("base_url: {:?}", base_url.into());
        serde_yaml::from_str(&yaml).expect("a bare base_url is a valid config")
    }

    pub fn index_url(&self) -> String {
        format!("{}{}", self.base_url, self.index_path)
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    pub fn group_url(&self, offset: u32) -> String {
        format!(
            "{}{}{}&start={offset}",
            self.base_url, self.group_path, self.group_id
        )
    }

    pub fn logs_url(&self, offset: u32) -> String {
        format!("{}{}{offset}", self.base_url, self.logs_path)
    }

    /// Absolutize a scraped link against the forum origin.
    pub fn absolutize(&self, link: &str) -> String {
        if link.starts_with("http") {
            link.to_string()
        } else if link.starts_with('/') {
            format!("{}{link}", self.base_url)
        } else {
            format!("{}/{link}", self.base_url)
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Forum account the mods-activity workflow signs in with. Never stored in
/// the site file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub const USERNAME_VAR: &'static str = "FORUM_USERNAME";
    pub const PASSWORD_VAR: &'static str = "FORUM_PASSWORD";

    /// Read from `FORUM_USERNAME` / `FORUM_PASSWORD`.
    pub fn from_env() -> Result<Self, DriverError> {
        let username = std::env::var(Self::USERNAME_VAR)
            .map_err(|_| DriverError::Auth(format!("{} is not set", Self::USERNAME_VAR)))?;
        let password = std::env::var(Self::PASSWORD_VAR)
            .map_err(|_| DriverError::Auth(format!("{} is not set", Self::PASSWORD_VAR)))?;
        Ok(Self { username, password })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config: SiteConfig =
            serde_yaml::from_str("base_url: https://forum.example").unwrap();
        assert_eq!(config.login_url(), "https://forum.example/ucp.php?mode=login");
        assert_eq!(config.log_page_size, 15);
        assert_eq!(config.member_page_offsets, vec![0, 15]);
        assert!(config.single_circuit);
        assert!(!config.user_agents.is_empty());
        assert_eq!(config.selectors.topic_link, "a.topictitle");
    }

    #[test]
    fn load_reads_overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_url: https://forum.example\ngroup_id: 9\nexcluded_topics:\n  - Archiwum"
        )
        .unwrap();

        let config = SiteConfig::load(file.path()).unwrap();
        assert_eq!(config.group_id, 9);
        assert_eq!(config.excluded_topics, vec!["Archiwum"]);
        assert!(config.group_url(15).ends_with("g=9&start=15"));
    }

    #[test]
    fn load_rejects_missing_base_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "group_id: 9").unwrap();
        assert!(SiteConfig::load(file.path()).is_err());
    }

    #[test]
    fn absolutize_handles_relative_and_absolute_links() {
        let config = SiteConfig::for_base_url("https://forum.example");
        assert_eq!(
            config.absolutize("/viewtopic.php?t=1"),
            "https://forum.example/viewtopic.php?t=1"
        );
        assert_eq!(
            config.absolutize("viewtopic.php?t=1"),
            "https://forum.example/viewtopic.php?t=1"
        );
        assert_eq!(
            config.absolutize("https://other.example/x"),
            "https://other.example/x"
        );
    }
}
