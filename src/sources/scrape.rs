// src/sources/scrape.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use super::{get_text, ranked_candidates, FetchContext, SourceAdapter};
use crate::candidate::Candidate;
use crate::error::SourceError;
use crate::tags::normalize_title;

/// Bare hashtags anywhere in the page.
pub const DEFAULT_PATTERN: &str = r"#(\w+)";

/// Trend page scrape: capture group 1 of `pattern` is the raw tag.
pub struct ScrapeAdapter {
    id: String,
    url: String,
    pattern: Regex,
    client: reqwest::Client,
}

impl ScrapeAdapter {
    pub fn new(id: &str, url: impl Into<String>, pattern: Regex, client: reqwest::Client) -> Self {
        Self {
            id: id.to_string(),
            url: url.into(),
            pattern,
            client,
        }
    }
}

/// Matches without a group 1 are skipped. Never fails: a page with no matches is empty.
pub fn parse_scrape(html: &str, pattern: &Regex, source_id: &str, now: DateTime<Utc>) -> Vec<Candidate> {
    let raw = pattern
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| normalize_title(m.as_str())));
    ranked_candidates(raw, source_id, now)
}

#[async_trait]
impl SourceAdapter for ScrapeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        let body = get_text(&self.client, &self.url, ctx.timeout).await?;
        Ok(parse_scrape(&body, &self.pattern, &self.id, ctx.now))
    }
}
