// tests/common/mod.rs
//
// Scriptable fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use trend_bridge::candidate::{Candidate, ScoredCandidate};
use trend_bridge::error::SourceError;
use trend_bridge::sources::{FetchContext, SourceAdapter};
use trend_bridge::store::{MemoryStore, TrendStore};

#[derive(Clone)]
pub enum Script {
    Tags(Vec<&'static str>),
    Fail(SourceError),
    /// Sleep longer than any test timeout.
    Hang,
    /// Return tags after a delay.
    Slow(Duration, Vec<&'static str>),
}

pub struct FakeAdapter {
    id: String,
    script: Mutex<Script>,
    calls: AtomicUsize,
    metered: bool,
}

impl FakeAdapter {
    pub fn new(id: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            metered: false,
        })
    }

    pub fn metered(id: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            metered: true,
        })
    }

    pub fn ok(id: &str, tags: &[&'static str]) -> Arc<Self> {
        Self::new(id, Script::Tags(tags.to_vec()))
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Self::new(id, Script::Fail(SourceError::Http { status: 503 }))
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn to_candidates(tags: &[&str], id: &str, ctx: &FetchContext) -> Vec<Candidate> {
    let n = tags.len().max(1) as f32;
    tags.iter()
        .enumerate()
        .map(|(i, t)| Candidate::new(*t, id, 1.0 - i as f32 / n, ctx.now).expect("valid fake tag"))
        .collect()
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn counts_against_quota(&self) -> bool {
        self.metered
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().clone();
        match script {
            Script::Tags(tags) => Ok(to_candidates(&tags, &self.id, ctx)),
            Script::Fail(e) => Err(e),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(vec![])
            }
            Script::Slow(d, tags) => {
                tokio::time::sleep(d).await;
                Ok(to_candidates(&tags, &self.id, ctx))
            }
        }
    }
}

pub fn as_dyn(a: &Arc<FakeAdapter>) -> Arc<dyn SourceAdapter> {
    Arc::clone(a) as Arc<dyn SourceAdapter>
}

/// Store whose quota lookups always fail.
pub struct BrokenQuotaStore;

#[async_trait]
impl TrendStore for BrokenQuotaStore {
    async fn record_refresh(&self, _ranked: &[ScoredCandidate]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn read_quota(&self) -> anyhow::Result<(u32, u32)> {
        Err(anyhow::anyhow!("quota backend down"))
    }

    async fn record_read(&self, _source: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// MemoryStore that also counts `record_refresh` calls.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub refreshes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(10),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendStore for CountingStore {
    async fn record_refresh(&self, ranked: &[ScoredCandidate]) -> anyhow::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.inner.record_refresh(ranked).await
    }

    async fn read_quota(&self) -> anyhow::Result<(u32, u32)> {
        self.inner.read_quota().await
    }

    async fn record_read(&self, source: &str) -> anyhow::Result<()> {
        self.inner.record_read(source).await
    }
}
