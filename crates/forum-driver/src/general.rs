//! General workflow: anonymous walk of every subforum's topic listing to
//! pagination exhaustion.

use std::collections::HashSet;

use scraper::Html;
use tracing::{debug, warn};

use scrapeboard_core::types::TopicRecord;

use crate::client::GatewayClient;
use crate::config::SiteConfig;
use crate::session::sel;
use crate::Result;

/// Walk the whole forum and return its topics, deduplicated and sorted.
pub async fn collect_topics(
    client: &GatewayClient,
    config: &SiteConfig,
) -> Result<Vec<TopicRecord>> {
    let index = client.fetch(&config.index_url()).await?;
    let subforums = parse_links(&index, &config.selectors.subforum_link, config)?;
    let subforums: Vec<Link> = subforums
        .into_iter()
        .filter(|link| !is_excluded(&link.title, &config.excluded_topics))
        .collect();
    debug!(count = subforums.len(), "subforums discovered");

    let mut topics = Vec::new();
    for subforum in &subforums {
        // Topics listed directly under the subforum.
        topics.extend(walk_listing(client, config, &subforum.title, &subforum.url).await?);

        // Its sub-subforums, minus the excluded ones.
        let page = client.fetch(&subforum.url).await?;
        for sub in parse_links(&page, &config.selectors.sub_subforum_link, config)? {
            if is_excluded(&sub.title, &config.excluded_sub_subforums)
                || config
                    .excluded_sub_subforum_urls
                    .iter()
                    .any(|fragment| sub.url.contains(fragment))
            {
                debug!(title = %sub.title, "skipping excluded sub-subforum");
                continue;
            }
            topics.extend(walk_listing(client, config, &sub.title, &sub.url).await?);
        }
    }

    Ok(dedupe_and_sort(topics))
}

/// Follow a listing's "next" links until they run out, collecting topic
/// links from every page.
async fn walk_listing(
    client: &GatewayClient,
    config: &SiteConfig,
    section: &str,
    url: &str,
) -> Result<Vec<TopicRecord>> {
    let mut topics = Vec::new();
    let mut next = Some(url.to_string());
    let mut pages = 0u32;

    while let Some(url) = next {
        if pages >= config.max_pages {
            warn!(section, pages, "pagination cap reached, stopping walk");
            break;
        }
        let page = client.fetch(&url).await?;
        let (page_topics, next_url) = parse_topic_page(&page, section, config)?;
        topics.extend(page_topics);
        next = next_url;
        pages += 1;
    }
    Ok(topics)
}

struct Link {
    title: String,
    url: String,
}

/// Anchor elements matching `selector`, with absolutized hrefs.
fn parse_links(html: &str, selector: &str, config: &SiteConfig) -> Result<Vec<Link>> {
    let document = Html::parse_document(html);
    let link_sel = sel(selector)?;
    Ok(document
        .select(&link_sel)
        .filter_map(|a| {
            let title = a.text().collect::<String>().trim().to_string();
            let href = a.value().attr("href")?;
            Some(Link {
                title,
                url: config.absolutize(href),
            })
        })
        .collect())
}

/// One listing page: its topics and the absolutized "next" link, if any.
fn parse_topic_page(
    html: &str,
    section: &str,
    config: &SiteConfig,
) -> Result<(Vec<TopicRecord>, Option<String>)> {
    let document = Html::parse_document(html);
    let topic_sel = sel(&config.selectors.topic_link)?;
    let next_sel = sel(&config.selectors.next_page)?;

    let topics = document
        .select(&topic_sel)
        .filter_map(|a| {
            let title = a.text().collect::<String>().trim().to_string();
            let href = a.value().attr("href")?;
            if is_excluded(&title, &config.excluded_topics) {
                return None;
            }
            Some(TopicRecord {
                subforum: section.to_string(),
                title,
                link: config.absolutize(href),
            })
        })
        .collect();

    let next = document
        .select(&next_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| config.absolutize(href));

    Ok((topics, next))
}

fn is_excluded(title: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|fragment| title.contains(fragment))
}

/// Drop duplicate titles (case-insensitive) and sort by section, then
/// title.
fn dedupe_and_sort(topics: Vec<TopicRecord>) -> Vec<TopicRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<TopicRecord> = topics
        .into_iter()
        .filter(|t| seen.insert(t.title.to_lowercase()))
        .collect();
    unique.sort_by(|a, b| {
        (a.subforum.as_str(), a.title.to_lowercase())
            .cmp(&(b.subforum.as_str(), b.title.to_lowercase()))
    });
    unique
}

// ─── Tests ────────────────────────────────────────────────────────────────
