// src/error.rs
//! Typed failures for source calls and for the refresh cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure of a single source call. Never surfaced by `Pipeline::refresh`;
/// the collector logs it, feeds the breaker and moves on to the next source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source returned HTTP {status}")]
    Http { status: u16 },

    #[error("source call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed source payload: {0}")]
    Parse(String),

    #[error("read quota exhausted ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("circuit open until {until}")]
    CircuitOpen { until: DateTime<Utc> },
}

impl SourceError {
    /// Whether this failure should count against the source's circuit breaker.
    /// Quota and circuit-open skips are decided locally and never reach the source.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Http { .. } | Self::Timeout(_) | Self::Parse(_)
        )
    }

    /// Short label for metrics and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Http { .. } => "http",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
            Self::QuotaExceeded { .. } => "quota",
            Self::CircuitOpen { .. } => "circuit_open",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SourceError::Http {
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return SourceError::Parse(err.to_string());
        }
        SourceError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<quick_xml::de::DeError> for SourceError {
    fn from(err: quick_xml::de::DeError) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// Conditions `Pipeline::refresh` reports to its caller.
#[derive(Debug, Error)]
pub enum TrendError {
    /// Every source, the generator included, produced nothing usable.
    #[error("no candidates available: generator produced nothing")]
    NoCandidates,

    #[error("refresh cancelled by caller")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}
