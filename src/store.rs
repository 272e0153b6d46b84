// src/store.rs
//! Persistence seam for refresh history and the daily read quota.
//!
//! `MemoryStore` keeps everything in-process: a capped log of refreshes and a
//! read counter that resets at UTC midnight.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::candidate::ScoredCandidate;

pub const DEFAULT_MAX_READS_PER_DAY: u32 = 3;
pub const DEFAULT_HISTORY_CAP: usize = 500;

#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Append the ranked output of one refresh.
    async fn record_refresh(&self, ranked: &[ScoredCandidate]) -> anyhow::Result<()>;

    /// `(used, limit)` for today.
    async fn read_quota(&self) -> anyhow::Result<(u32, u32)>;

    /// Count one quota-metered read against `source`.
    async fn record_read(&self, source: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRecord {
    pub at: DateTime<Utc>,
    pub count: usize,
    pub bridged: usize,
    pub top_tags: Vec<String>,
}

#[derive(Debug, Clone)]
struct DailyReads {
    day: NaiveDate,
    total: u32,
    by_source: BTreeMap<String, u32>,
}

impl DailyReads {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            total: 0,
            by_source: BTreeMap::new(),
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        if self.day != now.date_naive() {
            *self = Self::new(now);
        }
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    limit: u32,
    cap: usize,
    reads: Mutex<DailyReads>,
    history: Mutex<Vec<RefreshRecord>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_READS_PER_DAY)
    }
}

impl MemoryStore {
    pub fn new(max_reads_per_day: u32) -> Self {
        Self::with_history_cap(max_reads_per_day, DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(max_reads_per_day: u32, cap: usize) -> Self {
        Self {
            limit: max_reads_per_day,
            cap: cap.clamp(1, 10_000),
            reads: Mutex::new(DailyReads::new(Utc::now())),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn quota_at(&self, now: DateTime<Utc>) -> (u32, u32) {
        let mut r = self.reads.lock().expect("reads mutex poisoned");
        r.roll(now);
        (r.total, self.limit)
    }

    pub fn record_read_at(&self, source: &str, now: DateTime<Utc>) {
        let mut r = self.reads.lock().expect("reads mutex poisoned");
        r.roll(now);
        r.total = r.total.saturating_add(1);
        *r.by_source.entry(source.to_string()).or_insert(0) += 1;
    }

    /// Today's reads per source.
    pub fn reads_by_source(&self) -> BTreeMap<String, u32> {
        let mut r = self.reads.lock().expect("reads mutex poisoned");
        r.roll(Utc::now());
        r.by_source.clone()
    }

    pub fn push_refresh(&self, rec: RefreshRecord) {
        let mut v = self.history.lock().expect("history mutex poisoned");
        v.push(rec);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<RefreshRecord> {
        let v = self.history.lock().expect("history mutex poisoned");
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }
}

#[async_trait]
impl TrendStore for MemoryStore {
    async fn record_refresh(&self, ranked: &[ScoredCandidate]) -> anyhow::Result<()> {
        self.push_refresh(RefreshRecord {
            at: Utc::now(),
            count: ranked.len(),
            bridged: ranked.iter().filter(|c| c.needs_bridge).count(),
            top_tags: ranked.iter().take(5).map(|c| c.tag().to_string()).collect(),
        });
        Ok(())
    }

    async fn read_quota(&self) -> anyhow::Result<(u32, u32)> {
        Ok(self.quota_at(Utc::now()))
    }

    async fn record_read(&self, source: &str) -> anyhow::Result<()> {
        self.record_read_at(source, Utc::now());
        Ok(())
    }
}
