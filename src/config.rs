// src/config.rs
//! Pipeline configuration.
//!
//! Resolution order:
//! 1) `$TRENDS_CONFIG_PATH` (must exist)
//! 2) `config/trends.toml`
//! 3) built-in defaults
//!
//! Then env overrides: `MIN_RELEVANCE_SCORE` (clamped to [0,1]) and
//! `MAX_READS_PER_DAY`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::breaker::{BreakerConfig, DEFAULT_COOLDOWN_MINUTES, DEFAULT_FAILURE_THRESHOLD};
use crate::dedupe::DEFAULT_MAX_SIMILARITY;
use crate::error::TrendError;
use crate::sources::scrape::DEFAULT_PATTERN;
use crate::store::DEFAULT_MAX_READS_PER_DAY;

pub const DEFAULT_TRENDS_CONFIG_PATH: &str = "config/trends.toml";
pub const ENV_TRENDS_CONFIG_PATH: &str = "TRENDS_CONFIG_PATH";
pub const ENV_MIN_RELEVANCE: &str = "MIN_RELEVANCE_SCORE";
pub const ENV_MAX_READS_PER_DAY: &str = "MAX_READS_PER_DAY";

pub const DEFAULT_MIN_RELEVANCE: f32 = 0.55;

/// Upper bound for every `*_secs` setting (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    Github,
    Scrape,
    Json,
    Generator,
}

impl SourceKind {
    fn needs_url(self) -> bool {
        !matches!(self, SourceKind::Generator)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub min_relevance: f32,
    pub max_similarity: f32,
    pub min_count: usize,
    pub top_k: usize,
    pub pool_size: usize,
    pub max_workers: usize,
    pub fetch_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub default_cache_ttl_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            min_relevance: DEFAULT_MIN_RELEVANCE,
            max_similarity: DEFAULT_MAX_SIMILARITY,
            min_count: 10,
            top_k: 20,
            pool_size: 10,
            max_workers: 4,
            fetch_timeout_secs: 5,
            refresh_interval_secs: 20 * 60,
            default_cache_ttl_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_MINUTES as u64 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaSection {
    pub max_reads_per_day: u32,
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            max_reads_per_day: DEFAULT_MAX_READS_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub url: Option<String>,
    /// Capture regex for `scrape` sources; group 1 is the tag. Defaults to `#(\w+)`.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub counts_against_quota: bool,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    pub pipeline: PipelineSection,
    pub breaker: BreakerSection,
    pub quota: QuotaSection,
    /// Optional explicit order; ids not listed keep file order after the listed ones.
    pub source_priority: Vec<String>,
    pub sources: Vec<SourceSpec>,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSection::default(),
            breaker: BreakerSection::default(),
            quota: QuotaSection::default(),
            source_priority: Vec::new(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<SourceSpec> {
    let spec = |id: &str, kind: SourceKind, url: &str, pattern: Option<&str>, ttl: u64, quota: bool| SourceSpec {
        id: id.to_string(),
        kind,
        url: Some(url.to_string()),
        pattern: pattern.map(str::to_string),
        cache_ttl_secs: Some(ttl),
        counts_against_quota: quota,
        enabled: true,
    };
    vec![
        spec(
            "google_trends",
            SourceKind::Rss,
            "https://trends.google.com/trends/trendingsearches/daily/rss?geo=US",
            None,
            30 * 60,
            false,
        ),
        spec(
            "trends_proxy",
            SourceKind::Json,
            "https://twitter-trends.iamrohit.in/api.php?woeid=1",
            None,
            30 * 60,
            true,
        ),
        spec(
            "getdaytrends",
            SourceKind::Scrape,
            "https://getdaytrends.com/",
            Some(r"#(\w+)"),
            30 * 60,
            false,
        ),
        spec(
            "github",
            SourceKind::Github,
            "https://api.github.com/search/repositories?q=machine-learning+OR+ai+OR+gpu&sort=stars&order=desc&per_page=10",
            None,
            60 * 60,
            false,
        ),
    ]
}

impl TrendsConfig {
    /// Parse and validate a TOML document. Env overrides are not applied here.
    pub fn from_toml_str(s: &str) -> Result<Self, TrendError> {
        let cfg: TrendsConfig =
            toml::from_str(s).map_err(|e| TrendError::Config(format!("toml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, TrendError> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrendError::Config(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Env path, then the default path, then built-in defaults; env overrides last.
    pub fn load_default() -> Result<Self, TrendError> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_TRENDS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(TrendError::Config(format!(
                    "{ENV_TRENDS_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                )));
            }
            Self::load_from(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_TRENDS_CONFIG_PATH);
            if pb.exists() {
                Self::load_from(&pb)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_min_relevance_env(std::env::var(ENV_MIN_RELEVANCE).ok()) {
            self.pipeline.min_relevance = v;
        }
        if let Some(v) = std::env::var(ENV_MAX_READS_PER_DAY)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            self.quota.max_reads_per_day = v;
        }
    }

    pub fn validate(&self) -> Result<(), TrendError> {
        let p = &self.pipeline;
        let unit = |name: &str, v: f32| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TrendError::Config(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("pipeline.min_relevance", p.min_relevance)?;
        unit("pipeline.max_similarity", p.max_similarity)?;
        if p.top_k == 0 || p.max_workers == 0 || p.fetch_timeout_secs == 0 {
            return Err(TrendError::Config(
                "pipeline.top_k, max_workers and fetch_timeout_secs must be > 0".into(),
            ));
        }
        let bounded = |name: &str, secs: u64| {
            if secs <= MAX_DURATION_SECS {
                Ok(())
            } else {
                Err(TrendError::Config(format!(
                    "{name} must be at most {MAX_DURATION_SECS}s, got {secs}"
                )))
            }
        };
        bounded("pipeline.fetch_timeout_secs", p.fetch_timeout_secs)?;
        bounded("pipeline.refresh_interval_secs", p.refresh_interval_secs)?;
        bounded("pipeline.default_cache_ttl_secs", p.default_cache_ttl_secs)?;
        bounded("breaker.cooldown_secs", self.breaker.cooldown_secs)?;

        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.id.trim().is_empty() {
                return Err(TrendError::Config("source with empty id".into()));
            }
            if !seen.insert(s.id.as_str()) {
                return Err(TrendError::Config(format!("duplicate source id `{}`", s.id)));
            }
            if let Some(ttl) = s.cache_ttl_secs {
                bounded(format!("sources.{}.cache_ttl_secs", s.id).as_str(), ttl)?;
            }
            if s.kind.needs_url() && s.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(TrendError::Config(format!("source `{}` needs a url", s.id)));
            }
            if s.kind == SourceKind::Scrape {
                let pattern = s.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
                let re = Regex::new(pattern).map_err(|e| {
                    TrendError::Config(format!("source `{}` regex error: {e}", s.id))
                })?;
                if re.captures_len() < 2 {
                    return Err(TrendError::Config(format!(
                        "source `{}` pattern needs a capture group",
                        s.id
                    )));
                }
            }
        }
        for id in &self.source_priority {
            if !seen.contains(id.as_str()) {
                return Err(TrendError::Config(format!(
                    "source_priority names unknown source `{id}`"
                )));
            }
        }
        Ok(())
    }

    /// Enabled sources in priority order.
    pub fn ordered_sources(&self) -> Vec<&SourceSpec> {
        let enabled = self.sources.iter().filter(|s| s.enabled);
        let mut out: Vec<&SourceSpec> = self
            .source_priority
            .iter()
            .filter_map(|id| self.sources.iter().find(|s| s.enabled && &s.id == id))
            .collect();
        for s in enabled {
            if !self.source_priority.contains(&s.id) {
                out.push(s);
            }
        }
        out
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: chrono::Duration::seconds(
                self.breaker.cooldown_secs.min(MAX_DURATION_SECS) as i64,
            ),
        }
    }

    pub fn cache_ttl_by_source(&self) -> HashMap<String, Duration> {
        self.sources
            .iter()
            .map(|s| {
                let secs = s.cache_ttl_secs.unwrap_or(self.pipeline.default_cache_ttl_secs);
                (s.id.clone(), Duration::from_secs(secs))
            })
            .collect()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.fetch_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.refresh_interval_secs.max(1))
    }
}

fn parse_min_relevance_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
