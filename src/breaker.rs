// src/breaker.rs
//! Per-source circuit breaker.
//!
//! closed ──F consecutive failures──▶ open ──cooldown elapsed──▶ half-open
//! half-open ──probe ok──▶ closed, half-open ──probe failed──▶ open (fresh cooldown)
//!
//! Half-open admits exactly one probe; further calls are short-circuited until the
//! probe reports back. Callers pass `now` explicitly, like the alert cooldown
//! logic, so transitions are deterministic under test.
//!
//! The registry hands out a [`Permit`] per call. A probe permit dropped without
//! an outcome (caller gone, future dropped) frees the probe slot again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::SourceError;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Mutable per-source record; only the owning breaker touches it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceState {
    pub failure_count: u32,
    pub degraded_until: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip)]
    probe_in_flight: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::minutes(DEFAULT_COOLDOWN_MINUTES),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    state: SourceState,
}

impl CircuitBreaker {
    pub fn new(cfg: BreakerConfig) -> Self {
        Self {
            cfg: BreakerConfig {
                failure_threshold: cfg.failure_threshold.max(1),
                cooldown: cfg.cooldown,
            },
            state: SourceState::default(),
        }
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> BreakerState {
        match self.state.degraded_until {
            None => BreakerState::Closed,
            Some(until) if now < until => BreakerState::Open,
            Some(_) => BreakerState::HalfOpen,
        }
    }

    pub fn source_state(&self) -> &SourceState {
        &self.state
    }

    /// Ask to call the wrapped source. `Ok(true)` means the call is the half-open
    /// probe; `Err(CircuitOpen)` means: do not call it.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> Result<bool, SourceError> {
        match self.state_at(now) {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => Err(self.open_error(now)),
            BreakerState::HalfOpen => {
                if self.state.probe_in_flight {
                    return Err(self.open_error(now));
                }
                self.state.probe_in_flight = true;
                Ok(true)
            }
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.state.failure_count = 0;
        self.state.degraded_until = None;
        self.state.probe_in_flight = false;
        self.state.last_success = Some(now);
    }

    /// Returns true if this failure opened (or re-opened) the circuit.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        let was_probe = self.state.probe_in_flight;
        self.state.probe_in_flight = false;
        self.state.failure_count = self.state.failure_count.saturating_add(1);

        if was_probe || self.state.failure_count >= self.cfg.failure_threshold {
            let until = now
                .checked_add_signed(self.cfg.cooldown)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.state.degraded_until = Some(until);
            return true;
        }
        false
    }

    /// Forget an in-flight probe whose outcome will never be reported (caller aborted).
    pub fn release_probe(&mut self) {
        self.state.probe_in_flight = false;
    }

    fn open_error(&self, now: DateTime<Utc>) -> SourceError {
        SourceError::CircuitOpen {
            until: self.state.degraded_until.unwrap_or(now),
        }
    }
}

/// Leave to call one source. Report the outcome with `record_success` /
/// `record_failure`; dropping it unreported releases a held probe.
#[must_use]
#[derive(Debug)]
pub struct Permit {
    breaker: Arc<Mutex<CircuitBreaker>>,
    probe: bool,
}

impl Permit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self, now: DateTime<Utc>) {
        self.probe = false;
        self.breaker
            .lock()
            .expect("breaker mutex poisoned")
            .record_success(now);
    }

    /// Returns true if this failure opened (or re-opened) the circuit.
    pub fn record_failure(mut self, now: DateTime<Utc>) -> bool {
        self.probe = false;
        self.breaker
            .lock()
            .expect("breaker mutex poisoned")
            .record_failure(now)
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.probe {
            if let Ok(mut b) = self.breaker.lock() {
                b.release_probe();
            }
        }
    }
}

/// One breaker per source id, each behind its own lock.
#[derive(Debug)]
pub struct BreakerRegistry {
    cfg: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    pub fn new(cfg: BreakerConfig) -> Self {
        Self {
            cfg,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, source_id: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(b) = self
            .breakers
            .read()
            .expect("breaker map rwlock poisoned")
            .get(source_id)
        {
            return Arc::clone(b);
        }
        let mut map = self.breakers.write().expect("breaker map rwlock poisoned");
        Arc::clone(
            map.entry(source_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(self.cfg)))),
        )
    }

    pub fn try_acquire(&self, source_id: &str, now: DateTime<Utc>) -> Result<Permit, SourceError> {
        let breaker = self.get(source_id);
        let probe = breaker
            .lock()
            .expect("breaker mutex poisoned")
            .try_acquire(now)?;
        Ok(Permit { breaker, probe })
    }

    /// `(state, record)` for every known source.
    pub fn snapshot(&self, now: DateTime<Utc>) -> HashMap<String, (BreakerState, SourceState)> {
        let entries: Vec<(String, Arc<Mutex<CircuitBreaker>>)> = {
            let map = self.breakers.read().expect("breaker map rwlock poisoned");
            map.iter().map(|(k, b)| (k.clone(), Arc::clone(b))).collect()
        };
        entries
            .into_iter()
            .map(|(k, b)| {
                let g = b.lock().expect("breaker mutex poisoned");
                (k, (g.state_at(now), g.source_state().clone()))
            })
            .collect()
    }
}
