// src/filter.rs
//! Content blockers applied to every collected tag before it can be ranked.
//!
//! Short terms (≤ 4 chars) only block when they form a whole word segment of the
//! tag, so `#ClassAction` is not caught by "ass"; longer terms block on substring.

use crate::tags::segments;

const NSFW_TERMS: &[&str] = &[
    "porn", "xxx", "nsfw", "nude", "sex", "onlyfans", "adult", "escort", "fetish", "bdsm",
    "milf", "boobs", "ass", "dick",
];

const POLITICAL_TERMS: &[&str] = &[
    "trump", "biden", "democrat", "republican", "maga", "liberal", "conservative", "election",
    "vote", "politics", "congress", "senate", "president", "governor", "campaign", "ballot",
];

const VIOLENCE_TERMS: &[&str] = &[
    "war", "conflict", "attack", "bomb", "terror", "death", "died", "killed", "murder",
];

/// Which term group blocked a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Nsfw,
    Political,
    Violence,
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    groups: Vec<(BlockReason, Vec<String>)>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        let own = |terms: &[&str]| terms.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        Self {
            groups: vec![
                (BlockReason::Nsfw, own(NSFW_TERMS)),
                (BlockReason::Political, own(POLITICAL_TERMS)),
                (BlockReason::Violence, own(VIOLENCE_TERMS)),
            ],
        }
    }
}

impl ContentFilter {
    /// A filter that lets everything through.
    pub fn permissive() -> Self {
        Self { groups: Vec::new() }
    }

    /// Returns the first matching block reason, if any.
    pub fn check(&self, tag: &str) -> Option<BlockReason> {
        let lower = tag.to_ascii_lowercase();
        let segs = segments(tag);
        for (reason, terms) in &self.groups {
            for term in terms {
                let hit = if term.len() <= 4 {
                    lower == *term || segs.iter().any(|s| s == term)
                } else {
                    lower.contains(term.as_str())
                };
                if hit {
                    return Some(*reason);
                }
            }
        }
        None
    }

    pub fn allows(&self, tag: &str) -> bool {
        self.check(tag).is_none()
    }
}
