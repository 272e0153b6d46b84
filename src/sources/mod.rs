// src/sources/mod.rs
//! Trend source adapters.
//!
//! Every adapter follows the same shape: a pure `parse_*` function that turns a
//! raw payload into candidates (fixture-testable), and an async `fetch` that does
//! the HTTP call and hands the body to the parser.

pub mod generator;
pub mod github;
pub mod json;
pub mod rss;
pub mod scrape;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::USER_AGENT;

use crate::candidate::Candidate;
use crate::config::{SourceKind, SourceSpec, TrendsConfig};
use crate::error::{SourceError, TrendError};
use crate::tags::{clean_tag, rank_score};

pub use generator::GeneratorAdapter;
pub use github::GithubAdapter;
pub use json::JsonAdapter;
pub use rss::RssAdapter;
pub use scrape::ScrapeAdapter;

/// Items kept per source response.
pub const MAX_ITEMS_PER_SOURCE: usize = 20;

const UA: &str = concat!("trend-bridge/", env!("CARGO_PKG_VERSION"));

/// Per-call context handed to adapters.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext {
    pub now: DateTime<Utc>,
    pub timeout: Duration,
}

impl FetchContext {
    pub fn new(now: DateTime<Utc>, timeout: Duration) -> Self {
        Self { now, timeout }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable id used for cache keys, breaker state and metrics labels.
    fn id(&self) -> &str;

    /// Whether a call consumes the shared daily read quota.
    fn counts_against_quota(&self) -> bool {
        false
    }

    /// Zero usable items is `Ok(vec![])`; transport and payload problems are errors.
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError>;
}

/// GET `url` and return the body; non-2xx is `Http`, an elapsed timeout is `Timeout`.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, SourceError> {
    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            SourceError::Timeout(timeout)
        } else {
            SourceError::from(e)
        }
    };
    let resp = client
        .get(url)
        .header(USER_AGENT, UA)
        .timeout(timeout)
        .send()
        .await
        .map_err(map_err)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
        });
    }
    resp.text().await.map_err(map_err)
}

/// Clean raw tags, drop in-source repeats and assign rank-based raw scores.
pub(crate) fn ranked_candidates<I, S>(raw: I, source_id: &str, now: DateTime<Utc>) -> Vec<Candidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let tags: Vec<String> = raw
        .into_iter()
        .filter_map(|r| clean_tag(r.as_ref()))
        .filter(|t| seen.insert(t.to_ascii_lowercase()))
        .take(MAX_ITEMS_PER_SOURCE)
        .collect();
    let n = tags.len();
    tags.into_iter()
        .enumerate()
        .filter_map(|(i, t)| Candidate::new(t, source_id, rank_score(i, n), now).ok())
        .collect()
}

/// Build the configured adapters in priority order, sharing one HTTP client.
pub fn build_adapters(
    cfg: &TrendsConfig,
    client: reqwest::Client,
) -> Result<Vec<Arc<dyn SourceAdapter>>, TrendError> {
    cfg.ordered_sources()
        .into_iter()
        .map(|spec| build_adapter(spec, client.clone()))
        .collect()
}

fn build_adapter(
    spec: &SourceSpec,
    client: reqwest::Client,
) -> Result<Arc<dyn SourceAdapter>, TrendError> {
    let url = || {
        spec.url
            .clone()
            .ok_or_else(|| TrendError::Config(format!("source `{}` needs a url", spec.id)))
    };
    let adapter: Arc<dyn SourceAdapter> = match spec.kind {
        SourceKind::Rss => Arc::new(RssAdapter::new(&spec.id, url()?, client)),
        SourceKind::Github => Arc::new(GithubAdapter::new(&spec.id, url()?, client)),
        SourceKind::Json => Arc::new(JsonAdapter::new(&spec.id, url()?, client)),
        SourceKind::Scrape => {
            let pattern = spec.pattern.as_deref().unwrap_or(scrape::DEFAULT_PATTERN);
            let re = Regex::new(pattern)
                .map_err(|e| TrendError::Config(format!("source `{}` regex error: {e}", spec.id)))?;
            Arc::new(ScrapeAdapter::new(&spec.id, url()?, re, client))
        }
        SourceKind::Generator => Arc::new(GeneratorAdapter::with_id(&spec.id)),
    };
    Ok(if spec.counts_against_quota {
        Arc::new(Metered(adapter))
    } else {
        adapter
    })
}

/// Marks a wrapped adapter as quota-counted.
struct Metered(Arc<dyn SourceAdapter>);

#[async_trait]
impl SourceAdapter for Metered {
    fn id(&self) -> &str {
        self.0.id()
    }

    fn counts_against_quota(&self) -> bool {
        true
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        self.0.fetch(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_source_without_pattern_uses_hashtag_capture() {
        let toml = "[[sources]]\nid = \"s\"\nkind = \"scrape\"\nurl = \"https://example.com/\"\n";
        let cfg = TrendsConfig::from_toml_str(toml).unwrap();
        let adapters = build_adapters(&cfg, reqwest::Client::new()).unwrap();
        assert_eq!(adapters.len(), 1);
        assert_eq!(adapters[0].id(), "s");
    }

    #[test]
    fn ranked_candidates_clean_and_rank() {
        let now = Utc::now();
        let out = ranked_candidates(["#WorldCup", "#worldcup", "#ab", "Taylor Swift"], "s", now);
        let tags: Vec<&str> = out.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["WorldCup", "TaylorSwift"]);
        assert_eq!(out[0].raw_score(), 1.0);
        assert_eq!(out[1].raw_score(), 0.5);
    }

    #[test]
    fn build_adapters_follows_priority_and_quota_flag() {
        let cfg = TrendsConfig::default();
        let adapters = build_adapters(&cfg, reqwest::Client::new()).unwrap();
        let ids: Vec<&str> = adapters.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["google_trends", "trends_proxy", "getdaytrends", "github"]);
        assert!(adapters[1].counts_against_quota());
        assert!(!adapters[0].counts_against_quota());
    }
}
