//! Mods-activity workflow: authenticated fetch of the moderator activity
//! log within a date range.
//!
//! The log is newest-first and paged. Rows newer than the requested range
//! are skipped, and the first row older than the range ends the walk. Every
//! record is tagged with the scraped moderator-group membership so scope
//! filtering can happen at download time.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use scraper::Html;
use tracing::{debug, info, warn};

use scrapeboard_core::types::{ActivityParams, ActivityRecord};

use crate::client::GatewayClient;
use crate::config::{Credentials, SiteConfig};
use crate::session::{self, sel};
use crate::Result;

/// Run the whole workflow against an already-built gateway client.
pub async fn collect_activities(
    client: &GatewayClient,
    config: &SiteConfig,
    credentials: &Credentials,
    params: &ActivityParams,
) -> Result<Vec<ActivityRecord>> {
    session::login(client, config, credentials).await?;

    let active = fetch_active_members(client, config).await?;
    info!(members = active.len(), "active moderator set fetched");

    let mut records = Vec::new();
    let mut page = 0u32;
    'pages: loop {
        if page >= config.max_pages {
            warn!(page, "activity log pagination cap reached, stopping walk");
            break;
        }
        let url = config.logs_url(page * config.log_page_size);
        let html = client.fetch(&url).await?;
        let rows = parse_activity_rows(&html, config)?;
        if rows.is_empty() {
            debug!(page, "no more activity rows");
            break;
        }

        for row in rows {
            let Some(timestamp) = parse_forum_timestamp(&row.time_text) else {
                warn!(text = %row.time_text, "unparseable activity timestamp, skipping row");
                continue;
            };
            if timestamp < params.start_bound() {
                // The log is newest-first: everything below is older still.
                break 'pages;
            }
            if timestamp > params.end_bound() {
                continue;
            }
            records.push(ActivityRecord {
                active: active.contains(&row.moderator.trim().to_lowercase()),
                moderator: row.moderator,
                action: row.action,
                details: row.details,
                timestamp,
            });
        }
        page += 1;
    }

    Ok(dedupe(records))
}

/// Lowercased usernames of the moderator group's current members.
pub async fn fetch_active_members(
    client: &GatewayClient,
    config: &SiteConfig,
) -> Result<HashSet<String>> {
    let mut members = HashSet::new();
    for &offset in &config.member_page_offsets {
        let html = client.fetch(&config.group_url(offset)).await?;
        let names = parse_member_names(&html, config)?;
        if names.is_empty() {
            debug!(offset, "no members on this page");
            continue;
        }
        members.extend(names.into_iter().map(|n| n.trim().to_lowercase()));
    }
    Ok(members)
}

fn parse_member_names(html: &str, config: &SiteConfig) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let name_sel = sel(&config.selectors.member_name)?;
    Ok(document
        .select(&name_sel)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

struct RawActivity {
    moderator: String,
    action: String,
    details: String,
    time_text: String,
}

/// One log page's rows: moderator, action type (the bolded prefix), free
/// detail text, and the raw timestamp text.
fn parse_activity_rows(html: &str, config: &SiteConfig) -> Result<Vec<RawActivity>> {
    let document = Html::parse_document(html);
    let row_sel = sel(&config.selectors.activity_row)?;
    let action_sel = sel(&config.selectors.activity_action)?;
    let moderator_sel = sel(&config.selectors.activity_moderator)?;
    let time_sel = sel(&config.selectors.activity_time)?;
    let strong_sel = sel("strong").expect("static 'strong' selector is valid");

    let mut rows = Vec::new();
    for row in document.select(&row_sel) {
        let (action, details) = match row.select(&action_sel).next() {
            Some(cell) => {
                let action_full = cell
                    .select(&strong_sel)
                    .next()
                    .map(|s| s.text().collect::<String>())
                    .unwrap_or_default();
                // The action type is the first two words of the bolded text;
                // the remainder of the cell is free-form detail.
                let action = action_full
                    .split_whitespace()
                    .take(2)
                    .collect::<Vec<_>>()
                    .join(" ");
                let full_text = cell.text().collect::<String>();
                let details = full_text
                    .replace(&action_full, "")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                (
                    if action.is_empty() { "Unknown".into() } else { action },
                    details,
                )
            }
            None => ("Unknown".into(), String::new()),
        };

        let moderator = row
            .select(&moderator_sel)
            .next()
            .map(|m| m.text().collect::<String>().trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown".into());

        let time_text = row
            .select(&time_sel)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        rows.push(RawActivity {
            moderator,
            action,
            details,
            time_text,
        });
    }
    Ok(rows)
}

// ─── Timestamp parsing ────────────────────────────────────────────────────

/// Genitive month names as the forum renders them.
const POLISH_MONTHS: [&str; 12] = [
    "stycznia",
    "lutego",
    "marca",
    "kwietnia",
    "maja",
    "czerwca",
    "lipca",
    "sierpnia",
    "września",
    "października",
    "listopada",
    "grudnia",
];

/// Parse the forum's timestamp text: `"12 stycznia 2024, 14:33"`, with an
/// ISO `"2024-01-12 14:33:05"` fallback.
pub(crate) fn parse_forum_timestamp(text: &str) -> Option<NaiveDateTime> {
    let cleaned = text.replace(',', " ");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if let [day, month_name, year, time] = parts.as_slice() {
        let month = POLISH_MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(month_name))
            .map(|i| i as u32 + 1)?;
        let day: u32 = day.parse().ok()?;
        let year: i32 = year.parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = chrono::NaiveTime::parse_from_str(time, "%H:%M:%S")
            .or_else(|_| chrono::NaiveTime::parse_from_str(time, "%H:%M"))
            .ok()?;
        return Some(date.and_time(time));
    }

    NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M"))
        .ok()
}

/// Drop exact duplicates on (moderator, action, details, timestamp),
/// keeping first occurrence order.
fn dedupe(records: Vec<ActivityRecord>) -> Vec<ActivityRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            seen.insert((
                r.moderator.clone(),
                r.action.clone(),
                r.details.clone(),
                r.timestamp,
            ))
        })
        .collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scrapeboard_core::types::ActivityParams;

    fn config(base_url: &str) -> SiteConfig {
        let mut config = SiteConfig::for_base_url(base_url);
        config.proxy_url = String::new();
        config
    }

    #[test]
    fn polish_timestamps_parse() {
        let ts = parse_forum_timestamp("12 stycznia 2024, 14:33").unwrap();
        assert_eq!(ts.to_string(), "2024-01-12 14:33:00");

        let ts = parse_forum_timestamp("3 października 2023, 09:05").unwrap();
        assert_eq!(ts.to_string(), "2023-10-03 09:05:00");
    }

    #[test]
    fn iso_timestamps_parse_as_fallback() {
        let ts = parse_forum_timestamp("2024-01-12 14:33:05").unwrap();
        assert_eq!(ts.to_string(), "2024-01-12 14:33:05");
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        assert!(parse_forum_timestamp("wczoraj").is_none());
        assert!(parse_forum_timestamp("32 stycznia 2024, 14:33").is_none());
        assert!(parse_forum_timestamp("").is_none());
    }

    const LOG_ROW: &str = r#"
        <div class="log-row">
          <div class="log-action"><strong>Usunięto post</strong> w temacie „Sprzedam rower”</div>
          <div class="log-moderator">janek</div>
          <div class="log-time">12 stycznia 2024, 14:33</div>
        </div>
    "#;

    #[test]
    fn activity_rows_split_action_and_details() {
        let rows = parse_activity_rows(LOG_ROW, &config("https://forum.example")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "Usunięto post");
        assert_eq!(rows[0].details, "w temacie „Sprzedam rower”");
        assert_eq!(rows[0].moderator, "janek");
        assert_eq!(rows[0].time_text, "12 stycznia 2024, 14:33");
    }

    #[test]
    fn rows_without_action_cell_fall_back_to_unknown() {
        let html = r#"
            <div class="log-row">
              <div class="log-time">12 stycznia 2024, 14:33</div>
            </div>
        "#;
        let rows = parse_activity_rows(html, &config("https://forum.example")).unwrap();
        assert_eq!(rows[0].action, "Unknown");
        assert_eq!(rows[0].moderator, "Unknown");
    }

    #[test]
    fn dedupe_collapses_identical_rows() {
        let ts = parse_forum_timestamp("2024-01-12 14:33:00").unwrap();
        let record = ActivityRecord {
            moderator: "janek".into(),
            action: "Usunięto post".into(),
            details: "d".into(),
            timestamp: ts,
            active: true,
        };
        let result = dedupe(vec![record.clone(), record.clone()]);
        assert_eq!(result.len(), 1);
    }

    async fn login_mocks(server: &mut mockito::Server) {
        let page = r#"
            <form id="login" method="post">
              <input type="hidden" name="sid" value="s" />
            </form>
        "#;
        server
            .mock("GET", "/ucp.php?mode=login")
            .with_body(page)
            .create_async()
            .await;
        server
            .mock("POST", "/ucp.php?mode=login")
            .with_body(r#"<a href="/ucp.php?mode=logout">Wyloguj</a>"#)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn collect_activities_windows_and_tags_membership() {
        let mut server = mockito::Server::new_async().await;
        let mut config = config(&server.url());
        config.member_page_offsets = vec![0];
        let credentials = Credentials {
            username: "scraper".into(),
            password: "hunter2".into(),
        };

        login_mocks(&mut server).await;
        server
            .mock("GET", "/memberlist.php?mode=group&g=4&start=0")
            .with_body(r#"<div class="member-row"><a class="username">janek</a></div>"#)
            .create_async()
            .await;
        // Page 0: one row too new, one in range (active mod), one in range
        // (inactive mod). Page 1: a row older than the range ends the walk.
        server
            .mock("GET", "/mcp.php?i=logs&start=0")
            .with_body(
                r#"
                <div class="log-row">
                  <div class="log-action"><strong>Zablokowano temat</strong></div>
                  <div class="log-moderator">janek</div>
                  <div class="log-time">5 lutego 2024, 10:00</div>
                </div>
                <div class="log-row">
                  <div class="log-action"><strong>Usunięto post</strong> spam</div>
                  <div class="log-moderator">janek</div>
                  <div class="log-time">20 stycznia 2024, 12:00</div>
                </div>
                <div class="log-row">
                  <div class="log-action"><strong>Usunięto post</strong></div>
                  <div class="log-moderator">dawny_mod</div>
                  <div class="log-time">15 stycznia 2024, 09:30</div>
                </div>
                "#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/mcp.php?i=logs&start=15")
            .with_body(
                r#"
                <div class="log-row">
                  <div class="log-action"><strong>Usunięto post</strong></div>
                  <div class="log-moderator">janek</div>
                  <div class="log-time">20 grudnia 2023, 08:00</div>
                </div>
                "#,
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&config).unwrap();
        let params = ActivityParams::parse("2024-01-01", "2024-01-31", "active").unwrap();
        let records = collect_activities(&client, &config, &credentials, &params)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].moderator, "janek");
        assert!(records[0].active);
        assert_eq!(records[0].details, "spam");
        assert_eq!(records[1].moderator, "dawny_mod");
        assert!(!records[1].active);
    }
}
