// src/candidate.rs
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::tags::{MAX_TAG_LEN, MIN_TAG_LEN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTag {
    #[error("tag is empty")]
    Empty,
    #[error("tag contains control characters")]
    ControlChars,
    #[error("tag must be 3..=30 ASCII alphanumeric chars, got {0:?}")]
    Shape(String),
}

/// One topic observed from one source. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    tag: String,
    source_id: String,
    raw_score: f32,
    observed_at: DateTime<Utc>,
}

impl Candidate {
    /// Build a candidate from an already cleaned tag (see `tags::clean_tag`).
    pub fn new(
        tag: impl Into<String>,
        source_id: impl Into<String>,
        raw_score: f32,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, InvalidTag> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(InvalidTag::Empty);
        }
        if tag.chars().any(char::is_control) {
            return Err(InvalidTag::ControlChars);
        }
        let len = tag.chars().count();
        if !(MIN_TAG_LEN..=MAX_TAG_LEN).contains(&len)
            || !tag.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(InvalidTag::Shape(tag));
        }
        let raw_score = if raw_score.is_finite() {
            raw_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(Self {
            tag,
            source_id: source_id.into(),
            raw_score,
            observed_at,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn raw_score(&self) -> f32 {
        self.raw_score
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Case-insensitive identity used when merging the same tag seen by several sources.
    pub fn key(&self) -> String {
        self.tag.to_ascii_lowercase()
    }
}

/// A candidate after relevance scoring and (when off-domain) bridging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub relevance: f32,
    pub sources: BTreeSet<String>,
    pub needs_bridge: bool,
    pub bridge_text: Option<String>,
    pub final_score: f32,
}

impl ScoredCandidate {
    pub fn tag(&self) -> &str {
        self.candidate.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_tags() {
        let now = Utc::now();
        assert_eq!(Candidate::new("", "s", 1.0, now), Err(InvalidTag::Empty));
        assert_eq!(
            Candidate::new("ab\u{7}cd", "s", 1.0, now),
            Err(InvalidTag::ControlChars)
        );
        assert!(matches!(
            Candidate::new("has space", "s", 1.0, now),
            Err(InvalidTag::Shape(_))
        ));
        assert!(matches!(
            Candidate::new("ab", "s", 1.0, now),
            Err(InvalidTag::Shape(_))
        ));
    }

    #[test]
    fn clamps_raw_score() {
        let c = Candidate::new("WorldCup", "rss", 7.5, Utc::now()).unwrap();
        assert_eq!(c.raw_score(), 1.0);
        let c = Candidate::new("WorldCup", "rss", f32::NAN, Utc::now()).unwrap();
        assert_eq!(c.raw_score(), 0.0);
        assert_eq!(c.key(), "worldcup");
    }
}
