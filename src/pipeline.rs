// src/pipeline.rs
//! Refresh cycle and selection.
//!
//! collect → merge same-tag candidates (union of sources) → dedupe, folding the
//! sources of dropped near-duplicates into the survivor → score → bridge off-domain
//! tags → sort → truncate to `top_k` → publish → record.
//!
//! Final score:
//! - on-domain:  `relevance + 0.1·popularity`
//! - bridged:    `min(min_relevance, relevance + 0.15 + 0.1·popularity)`
//!
//! where `popularity = (0.6·raw + 0.4·min(1, sources/3)) · max(0.5, 1 − age_h/24)`.
//! Bridged candidates therefore never outrank an on-domain one.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::breaker::{BreakerRegistry, BreakerState};
use crate::bridge::BridgeSynthesizer;
use crate::cache::CacheStore;
use crate::candidate::{Candidate, ScoredCandidate};
use crate::collector::{Collector, CollectorConfig, SourceReport};
use crate::config::TrendsConfig;
use crate::dedupe::{dedupe_with_sources, merge_sources};
use crate::error::TrendError;
use crate::filter::ContentFilter;
use crate::relevance::RelevanceScorer;
use crate::sources::{FetchContext, SourceAdapter};
use crate::store::TrendStore;

pub const BRIDGE_BOOST: f32 = 0.15;
pub const POPULARITY_WEIGHT: f32 = 0.1;
/// Floor for selection weights so zero-score candidates stay drawable.
const MIN_WEIGHT: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_relevance: f32,
    pub max_similarity: f32,
    pub min_count: usize,
    pub top_k: usize,
    pub pool_size: usize,
    pub fetch_timeout: Duration,
}

impl From<&TrendsConfig> for PipelineConfig {
    fn from(cfg: &TrendsConfig) -> Self {
        let p = &cfg.pipeline;
        Self {
            min_relevance: p.min_relevance,
            max_similarity: p.max_similarity,
            min_count: p.min_count.max(1),
            top_k: p.top_k.max(1),
            pool_size: p.pool_size.max(1),
            fetch_timeout: cfg.fetch_timeout(),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    ranked: Vec<ScoredCandidate>,
    refreshed_at: Option<DateTime<Utc>>,
    reports: Vec<SourceReport>,
    used_fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub degraded_until: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub cache_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub ranked: usize,
    pub used_fallback: bool,
    pub sources: Vec<SourceStatus>,
    pub last_reports: Vec<SourceReport>,
}

pub struct Pipeline {
    collector: Collector,
    scorer: RelevanceScorer,
    bridger: BridgeSynthesizer,
    cache: Arc<CacheStore>,
    breakers: Arc<BreakerRegistry>,
    store: Arc<dyn TrendStore>,
    cfg: PipelineConfig,
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl Pipeline {
    /// `adapters` in priority order (see `sources::build_adapters`).
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn TrendStore>,
        cfg: &TrendsConfig,
    ) -> Self {
        let cache = Arc::new(CacheStore::new());
        let breakers = Arc::new(BreakerRegistry::new(cfg.breaker_config()));
        let collector = Collector::new(
            adapters,
            Arc::clone(&cache),
            Arc::clone(&breakers),
            Arc::clone(&store),
            CollectorConfig {
                max_workers: cfg.pipeline.max_workers,
                cache_ttl_by_source: cfg.cache_ttl_by_source(),
                default_cache_ttl: Duration::from_secs(cfg.pipeline.default_cache_ttl_secs),
            },
        );
        Self {
            collector,
            scorer: RelevanceScorer::default(),
            bridger: BridgeSynthesizer::new(),
            cache,
            breakers,
            store,
            cfg: PipelineConfig::from(cfg),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SourceAdapter>) -> Self {
        self.collector = self.collector.with_fallback(fallback);
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.collector = self.collector.with_filter(filter);
        self
    }

    pub fn with_scorer(mut self, scorer: RelevanceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Run one refresh cycle and publish its ranking.
    ///
    /// At most one cycle runs at a time. A caller that had to wait for an
    /// in-flight cycle gets that cycle's published ranking instead of starting
    /// another. On cancellation nothing is published.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Vec<ScoredCandidate>, TrendError> {
        let seen = self.generation.load(AtomicOrdering::Acquire);
        let _guard = tokio::select! {
            g = self.refresh_lock.lock() => g,
            _ = cancel.cancelled() => return Err(TrendError::Cancelled),
        };
        if self.generation.load(AtomicOrdering::Acquire) != seen {
            return Ok(self.current());
        }

        let now = Utc::now();
        let ctx = FetchContext::new(now, self.cfg.fetch_timeout);
        let outcome = self.collector.collect(ctx, self.cfg.min_count, cancel).await?;
        let collected = outcome.candidates.len();
        let ranked = self.rank(outcome.candidates, now);

        if cancel.is_cancelled() {
            return Err(TrendError::Cancelled);
        }

        let bridged = ranked.iter().filter(|c| c.needs_bridge).count();
        {
            let mut snap = self.snapshot.write().expect("snapshot rwlock poisoned");
            *snap = Arc::new(Snapshot {
                ranked: ranked.clone(),
                refreshed_at: Some(now),
                reports: outcome.reports,
                used_fallback: outcome.used_fallback,
            });
        }
        self.generation.fetch_add(1, AtomicOrdering::Release);

        counter!("trends_refresh_total").increment(1);
        counter!("trends_bridged_total").increment(bridged as u64);
        gauge!("trends_last_refresh_ts").set(now.timestamp() as f64);
        info!(
            target: "trends",
            collected,
            ranked = ranked.len(),
            bridged,
            fallback = outcome.used_fallback,
            "refresh published"
        );

        if let Err(e) = self.store.record_refresh(&ranked).await {
            warn!(target: "trends", error = ?e, "failed to record refresh");
        }
        Ok(ranked)
    }

    /// Score, bridge, sort and truncate a collected batch.
    pub fn rank(&self, candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<ScoredCandidate> {
        let (merged, mut sources) = merge_sources(candidates);
        let before = merged.len();
        let unique = dedupe_with_sources(merged, self.cfg.max_similarity, &mut sources);
        counter!("trends_dedup_dropped_total").increment((before - unique.len()) as u64);

        let mut scored: Vec<ScoredCandidate> = unique
            .into_iter()
            .map(|c| {
                let srcs = sources.get(&c.key()).cloned().unwrap_or_else(|| {
                    std::iter::once(c.source_id().to_string()).collect()
                });
                let relevance = self.scorer.score(c.tag());
                let pop = popularity(c.raw_score(), srcs.len(), age_hours(c.observed_at(), now));
                let needs_bridge = relevance < self.cfg.min_relevance;
                let (bridge_text, final_score) = if needs_bridge {
                    (
                        Some(self.bridger.bridge(c.tag())),
                        bridged_score(relevance, pop, self.cfg.min_relevance),
                    )
                } else {
                    (None, relevance + POPULARITY_WEIGHT * pop)
                };
                ScoredCandidate {
                    candidate: c,
                    relevance,
                    sources: srcs,
                    needs_bridge,
                    bridge_text,
                    final_score,
                }
            })
            .collect();

        sort_ranked(&mut scored);
        scored.truncate(self.cfg.top_k);
        scored
    }

    /// Weighted random sample of `n` from the top pool of the last published ranking.
    pub fn select(&self, n: usize) -> Vec<ScoredCandidate> {
        self.select_with_rng(n, &mut rand::rng())
    }

    /// Weighted sampling without replacement (each item keyed by `u^(1/w)`, top `n` kept).
    pub fn select_with_rng<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<ScoredCandidate> {
        let snap = self.snapshot_arc();
        let pool_len = self.cfg.pool_size.min(snap.ranked.len());
        let pool = &snap.ranked[..pool_len];

        let mut keyed: Vec<(f64, usize)> = pool
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let w = f64::from(c.final_score).max(MIN_WEIGHT);
                let u: f64 = rng.random::<f64>();
                (u.powf(1.0 / w), i)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        keyed
            .into_iter()
            .take(n)
            .map(|(_, i)| pool[i].clone())
            .collect()
    }

    /// Last published ranking (empty before the first refresh).
    pub fn current(&self) -> Vec<ScoredCandidate> {
        self.snapshot_arc().ranked.clone()
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot_arc().refreshed_at
    }

    pub fn stats(&self) -> PipelineStats {
        let now = Utc::now();
        let snap = self.snapshot_arc();
        let breakers = self.breakers.snapshot(now);
        let ages = self.cache.ages();

        let sources = self
            .collector
            .source_ids()
            .into_iter()
            .map(|id| {
                let (state, st) = breakers
                    .get(&id)
                    .cloned()
                    .unwrap_or((BreakerState::Closed, Default::default()));
                SourceStatus {
                    cache_age_secs: ages.get(&id).map(|d| d.as_secs()),
                    state,
                    failure_count: st.failure_count,
                    degraded_until: st.degraded_until,
                    last_success: st.last_success,
                    source: id,
                }
            })
            .collect();

        PipelineStats {
            last_refresh_at: snap.refreshed_at,
            ranked: snap.ranked.len(),
            used_fallback: snap.used_fallback,
            sources,
            last_reports: snap.reports.clone(),
        }
    }

    fn snapshot_arc(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().expect("snapshot rwlock poisoned"))
    }
}

/// Popularity in `[0, 1]` from raw score, source agreement and freshness.
pub fn popularity(raw_score: f32, n_sources: usize, age_hours: f32) -> f32 {
    let agreement = (n_sources as f32 / 3.0).min(1.0);
    let freshness = (1.0 - age_hours.max(0.0) / 24.0).max(0.5);
    (0.6 * raw_score.clamp(0.0, 1.0) + 0.4 * agreement) * freshness
}

/// Final score of an off-domain candidate; capped so it never passes `min_relevance`.
pub fn bridged_score(relevance: f32, popularity: f32, min_relevance: f32) -> f32 {
    (relevance + BRIDGE_BOOST + POPULARITY_WEIGHT * popularity).min(min_relevance)
}

fn age_hours(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    (now - observed_at).num_seconds().max(0) as f32 / 3600.0
}

/// `final_score` desc, then most recent `observed_at`, then tag asc.
pub fn sort_ranked(items: &mut [ScoredCandidate]) {
    items.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.candidate.observed_at().cmp(&a.candidate.observed_at()))
            .then_with(|| a.tag().cmp(b.tag()))
    });
}
