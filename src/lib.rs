// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod breaker;
pub mod bridge;
pub mod cache;
pub mod candidate;
pub mod collector;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod relevance;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod tags;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::candidate::{Candidate, ScoredCandidate};
pub use crate::config::TrendsConfig;
pub use crate::error::{SourceError, TrendError};
pub use crate::pipeline::Pipeline;
pub use crate::sources::{FetchContext, SourceAdapter};
pub use crate::store::{MemoryStore, TrendStore};
