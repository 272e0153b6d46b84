// src/collector.rs
//! Priority-ordered collection across sources.
//!
//! Per source, in order: TTL cache; quota (metered sources only); circuit
//! breaker; fetch under `fetch_timeout`. Fetches run in waves of at most
//! `max_workers` concurrent calls. Results are merged in priority order, and no
//! further wave starts once `min_count` candidates are in hand. When nothing at
//! all was collected the calendar generator fills in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerRegistry, Permit};
use crate::cache::CacheStore;
use crate::candidate::Candidate;
use crate::error::{SourceError, TrendError};
use crate::filter::ContentFilter;
use crate::metrics::ensure_metrics_described;
use crate::sources::{FetchContext, GeneratorAdapter, SourceAdapter};
use crate::store::TrendStore;
use crate::tags::clean_tag;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub max_workers: usize,
    pub cache_ttl_by_source: HashMap<String, Duration>,
    pub default_cache_ttl: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            cache_ttl_by_source: HashMap::new(),
            default_cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl CollectorConfig {
    fn ttl_for(&self, source_id: &str) -> Duration {
        self.cache_ttl_by_source
            .get(source_id)
            .copied()
            .unwrap_or(self.default_cache_ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Cached,
    Fetched,
    Failed,
    QuotaExceeded,
    QuotaUnavailable,
    CircuitOpen,
    Fallback,
}

/// What happened to one source during one collection.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub outcome: Outcome,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl SourceReport {
    fn new(source: &str, outcome: Outcome, count: usize) -> Self {
        Self {
            source: source.to_string(),
            outcome,
            count,
            error: None,
            elapsed_ms: None,
        }
    }

    fn with_error(mut self, e: &SourceError) -> Self {
        self.error = Some(e.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    /// Admitted candidates in source priority order.
    pub candidates: Vec<Candidate>,
    /// One entry per source consulted, in priority order.
    pub reports: Vec<SourceReport>,
    pub used_fallback: bool,
}

/// Slot in a wave: either resolved during planning, or waiting on a spawned fetch.
/// A pending slot owns the breaker permit until its result is settled.
enum Slot {
    Ready(SourceReport, Vec<Candidate>),
    Pending(usize, Permit),
}

type FetchResult = (usize, Result<Vec<Candidate>, SourceError>, u64);

pub struct Collector {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    fallback: Arc<dyn SourceAdapter>,
    cache: Arc<CacheStore>,
    breakers: Arc<BreakerRegistry>,
    store: Arc<dyn TrendStore>,
    filter: ContentFilter,
    cfg: CollectorConfig,
}

impl Collector {
    /// `adapters` must already be in priority order.
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        cache: Arc<CacheStore>,
        breakers: Arc<BreakerRegistry>,
        store: Arc<dyn TrendStore>,
        cfg: CollectorConfig,
    ) -> Self {
        Self {
            adapters,
            fallback: Arc::new(GeneratorAdapter::new()),
            cache,
            breakers,
            store,
            filter: ContentFilter::default(),
            cfg: CollectorConfig {
                max_workers: cfg.max_workers.max(1),
                ..cfg
            },
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SourceAdapter>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.id().to_string()).collect()
    }

    pub async fn collect(
        &self,
        ctx: FetchContext,
        min_count: usize,
        cancel: &CancellationToken,
    ) -> Result<CollectOutcome, TrendError> {
        ensure_metrics_described();

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut reports: Vec<SourceReport> = Vec::new();
        let mut next = 0usize;

        while next < self.adapters.len() && candidates.len() < min_count {
            if cancel.is_cancelled() {
                return Err(TrendError::Cancelled);
            }

            // Plan a wave.
            let mut slots: Vec<Slot> = Vec::new();
            let mut pending: Vec<usize> = Vec::new();
            let mut ready_count = 0usize;
            while next < self.adapters.len() && pending.len() < self.cfg.max_workers {
                if pending.is_empty() && candidates.len() + ready_count >= min_count {
                    break;
                }
                let idx = next;
                next += 1;
                let slot = self.prepare(idx, &ctx).await;
                match &slot {
                    Slot::Ready(_, found) => ready_count += found.len(),
                    Slot::Pending(idx, _) => pending.push(*idx),
                }
                slots.push(slot);
            }

            let mut fetched = self.run_wave(&pending, ctx, cancel).await?;

            // Merge in priority order.
            for slot in slots {
                let (report, found) = match slot {
                    Slot::Ready(report, found) => (report, found),
                    Slot::Pending(idx, permit) => match fetched.remove(&idx) {
                        Some((res, ms)) => self.settle(idx, permit, res, ms, &ctx),
                        None => self.settle(
                            idx,
                            permit,
                            Err(SourceError::Unavailable("fetch task did not complete".into())),
                            0,
                            &ctx,
                        ),
                    },
                };
                candidates.extend(found);
                reports.push(report);
            }
        }

        let mut used_fallback = false;
        if candidates.is_empty() {
            if cancel.is_cancelled() {
                return Err(TrendError::Cancelled);
            }
            used_fallback = true;
            let found = self.run_fallback(ctx).await;
            reports.push(SourceReport::new(self.fallback.id(), Outcome::Fallback, found.len()));
            if found.is_empty() {
                warn!(target: "trends", source = self.fallback.id(), "fallback produced no candidates");
                return Err(TrendError::NoCandidates);
            }
            info!(target: "trends", count = found.len(), "all sources empty; using generator");
            candidates = found;
        }

        Ok(CollectOutcome {
            candidates,
            reports,
            used_fallback,
        })
    }

    /// Resolve a source without the network if possible: cache hit, quota skip or
    /// open circuit. `Slot::Pending` means the caller must fetch it.
    async fn prepare(&self, idx: usize, ctx: &FetchContext) -> Slot {
        let adapter = &self.adapters[idx];
        let id = adapter.id();

        if let Some(hit) = self.cache.get(id) {
            counter!("trends_cache_hits_total").increment(1);
            debug!(target: "trends", source = id, count = hit.len(), "cache hit");
            let report = SourceReport::new(id, Outcome::Cached, hit.len());
            return Slot::Ready(report, hit);
        }

        if adapter.counts_against_quota() {
            match self.store.read_quota().await {
                Ok((used, limit)) if used >= limit => {
                    let e = SourceError::QuotaExceeded { used, limit };
                    info!(target: "trends", source = id, used, limit, "read quota exhausted; skipping");
                    self.count_outcome(id, e.kind());
                    return Slot::Ready(SourceReport::new(id, Outcome::QuotaExceeded, 0).with_error(&e), vec![]);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: "trends", source = id, error = ?e, "read quota unavailable; skipping");
                    let mut report = SourceReport::new(id, Outcome::QuotaUnavailable, 0);
                    report.error = Some(e.to_string());
                    return Slot::Ready(report, vec![]);
                }
            }
        }

        let permit = match self.breakers.try_acquire(id, ctx.now) {
            Ok(permit) => permit,
            Err(e) => {
                debug!(target: "trends", source = id, error = %e, "circuit open; skipping");
                self.count_outcome(id, e.kind());
                return Slot::Ready(SourceReport::new(id, Outcome::CircuitOpen, 0).with_error(&e), vec![]);
            }
        };

        if adapter.counts_against_quota() {
            if let Err(e) = self.store.record_read(id).await {
                warn!(target: "trends", source = id, error = ?e, "failed to record read");
            }
        }
        Slot::Pending(idx, permit)
    }

    async fn run_wave(
        &self,
        pending: &[usize],
        ctx: FetchContext,
        cancel: &CancellationToken,
    ) -> Result<HashMap<usize, (Result<Vec<Candidate>, SourceError>, u64)>, TrendError> {
        let mut out = HashMap::new();
        if pending.is_empty() {
            return Ok(out);
        }

        let mut set: JoinSet<FetchResult> = JoinSet::new();
        for &idx in pending {
            let adapter = Arc::clone(&self.adapters[idx]);
            set.spawn(async move {
                let t0 = Instant::now();
                let res = match tokio::time::timeout(ctx.timeout, adapter.fetch(&ctx)).await {
                    Ok(r) => r,
                    Err(_) => Err(SourceError::Timeout(ctx.timeout)),
                };
                (idx, res, t0.elapsed().as_millis() as u64)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Pending permits are dropped with the wave, releasing any probe.
                    set.abort_all();
                    info!(target: "trends", in_flight = pending.len(), "collection cancelled");
                    return Err(TrendError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, res, ms))) => {
                        out.insert(idx, (res, ms));
                    }
                    Some(Err(e)) => {
                        warn!(target: "trends", error = ?e, "fetch task failed");
                    }
                },
            }
        }
        Ok(out)
    }

    /// Feed a fetch result into breaker, cache and metrics; return the admitted candidates.
    fn settle(
        &self,
        idx: usize,
        permit: Permit,
        res: Result<Vec<Candidate>, SourceError>,
        ms: u64,
        ctx: &FetchContext,
    ) -> (SourceReport, Vec<Candidate>) {
        let id = self.adapters[idx].id();
        histogram!("trends_fetch_ms", "source" => id.to_string()).record(ms as f64);

        match res {
            Ok(raw) => {
                permit.record_success(ctx.now);
                let found = self.admit(raw);
                self.cache.put(id, found.clone(), self.cfg.ttl_for(id));
                self.count_outcome(id, "ok");
                debug!(target: "trends", source = id, count = found.len(), ms, "fetched");
                let mut report = SourceReport::new(id, Outcome::Fetched, found.len());
                report.elapsed_ms = Some(ms);
                (report, found)
            }
            Err(e) => {
                if e.is_breaker_failure() && permit.record_failure(ctx.now) {
                    counter!("trends_breaker_trips_total", "source" => id.to_string()).increment(1);
                    warn!(target: "trends", source = id, error = %e, "circuit opened");
                }
                warn!(target: "trends", source = id, error = ?e, "provider error");
                self.count_outcome(id, e.kind());
                let mut report = SourceReport::new(id, Outcome::Failed, 0).with_error(&e);
                report.elapsed_ms = Some(ms);
                (report, vec![])
            }
        }
    }

    async fn run_fallback(&self, ctx: FetchContext) -> Vec<Candidate> {
        match tokio::time::timeout(ctx.timeout, self.fallback.fetch(&ctx)).await {
            Ok(Ok(raw)) => self.admit(raw),
            Ok(Err(e)) => {
                warn!(target: "trends", source = self.fallback.id(), error = ?e, "fallback error");
                vec![]
            }
            Err(_) => {
                warn!(target: "trends", source = self.fallback.id(), "fallback timed out");
                vec![]
            }
        }
    }

    /// Tag hygiene and content filtering shared by every source.
    fn admit(&self, raw: Vec<Candidate>) -> Vec<Candidate> {
        raw.into_iter()
            .filter(|c| clean_tag(c.tag()).as_deref() == Some(c.tag()))
            .filter(|c| match self.filter.check(c.tag()) {
                None => true,
                Some(reason) => {
                    debug!(target: "trends", tag = c.tag(), ?reason, "blocked");
                    false
                }
            })
            .collect()
    }

    fn count_outcome(&self, source: &str, outcome: &'static str) {
        counter!(
            "trends_source_fetch_total",
            "source" => source.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}
