// src/dedupe.rs
//! Near-duplicate removal for candidate tags.
//!
//! Greedy and order-dependent: a candidate is admitted only if it is less than
//! `max_similarity` similar to every candidate admitted before it. Callers put
//! higher-confidence candidates first so those are the ones that survive.
//!
//! Similarity: `strsim::normalized_levenshtein` on lowercased tags
//! (`1 - distance / max_len`, returns f64 -> cast to f32).

use std::collections::{BTreeSet, HashMap};

use strsim::normalized_levenshtein;

use crate::candidate::Candidate;

pub const DEFAULT_MAX_SIMILARITY: f32 = 0.88;

/// Case-insensitive similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f32 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase()) as f32
}

/// Keep only candidates whose similarity to every already-admitted one is below `max_similarity`.
pub fn dedupe(candidates: Vec<Candidate>, max_similarity: f32) -> Vec<Candidate> {
    greedy(candidates, max_similarity, |_, _| {})
}

/// Like [`dedupe`], but a dropped candidate's sources (from `merge_sources`) are
/// folded into the set of the admitted tag that absorbed it.
pub fn dedupe_with_sources(
    candidates: Vec<Candidate>,
    max_similarity: f32,
    sources: &mut HashMap<String, BTreeSet<String>>,
) -> Vec<Candidate> {
    greedy(candidates, max_similarity, |survivor, dropped| {
        let absorbed = sources
            .remove(&dropped.key())
            .unwrap_or_else(|| BTreeSet::from([dropped.source_id().to_string()]));
        sources.entry(survivor.to_string()).or_default().extend(absorbed);
    })
}

fn greedy(
    candidates: Vec<Candidate>,
    max_similarity: f32,
    mut on_drop: impl FnMut(&str, &Candidate),
) -> Vec<Candidate> {
    let mut admitted: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut admitted_keys: Vec<String> = Vec::with_capacity(candidates.len());

    for c in candidates {
        let key = c.key();
        let survivor = admitted_keys
            .iter()
            .find(|k| normalized_levenshtein(&key, k) as f32 >= max_similarity);
        if let Some(survivor) = survivor {
            on_drop(survivor, &c);
            continue;
        }
        admitted_keys.push(key);
        admitted.push(c);
    }
    admitted
}

/// Collapse candidates with the same tag (case-insensitive) reported by several
/// sources. The first occurrence wins its position; it keeps the highest raw score
/// and latest observation among the group. Returns the merged list and the set of
/// sources behind each tag key.
pub fn merge_sources(candidates: Vec<Candidate>) -> (Vec<Candidate>, HashMap<String, BTreeSet<String>>) {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Candidate> = HashMap::new();
    let mut sources: HashMap<String, BTreeSet<String>> = HashMap::new();

    for c in candidates {
        let key = c.key();
        sources
            .entry(key.clone())
            .or_default()
            .insert(c.source_id().to_string());
        match best.get_mut(&key) {
            None => {
                order.push(key.clone());
                best.insert(key, c);
            }
            Some(first) => {
                let raw = first.raw_score().max(c.raw_score());
                let seen = first.observed_at().max(c.observed_at());
                if raw != first.raw_score() || seen != first.observed_at() {
                    if let Ok(merged) = Candidate::new(first.tag(), first.source_id(), raw, seen) {
                        *first = merged;
                    }
                }
            }
        }
    }

    let merged = order
        .into_iter()
        .filter_map(|k| best.remove(&k))
        .collect();
    (merged, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn cand(tag: &str, source: &str, raw: f32) -> Candidate {
        Candidate::new(tag, source, raw, Utc::now()).unwrap()
    }

    #[test]
    fn similarity_is_case_insensitive() {
        assert_eq!(similarity("WorldCup", "worldcup"), 1.0);
        assert!(similarity("WorldCup", "Oscars") < 0.5);
    }

    #[test]
    fn keeps_first_of_near_duplicates() {
        let out = dedupe(
            vec![
                cand("GPUCompute", "a", 1.0),
                cand("GPUComputing", "b", 1.0),
                cand("WorldCup", "b", 1.0),
            ],
            DEFAULT_MAX_SIMILARITY,
        );
        // GPUCompute vs GPUComputing: 1 - 3/12 = 0.75 < 0.88, both admitted
        assert_eq!(out.len(), 3);

        let out = dedupe(
            vec![cand("GPUCompute", "a", 1.0), cand("gpucompute", "b", 1.0)],
            DEFAULT_MAX_SIMILARITY,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id(), "a");
    }

    #[test]
    fn dropped_near_duplicate_hands_its_sources_to_the_survivor() {
        let (merged, mut sources) = merge_sources(vec![
            cand("WorldCup", "rss", 1.0),
            cand("WorldCups", "scrape", 0.9),
            cand("worldcups", "json", 0.5),
            cand("Oscars", "json", 0.8),
        ]);
        let out = dedupe_with_sources(merged, DEFAULT_MAX_SIMILARITY, &mut sources);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tag(), "WorldCup");
        let expected: BTreeSet<String> =
            ["json", "rss", "scrape"].iter().map(|s| s.to_string()).collect();
        assert_eq!(sources["worldcup"], expected);
        assert!(!sources.contains_key("worldcups"));
        assert_eq!(sources["oscars"].len(), 1);
    }

    #[test]
    fn merge_unions_sources_and_keeps_first_position() {
        let t0 = Utc::now();
        let later = t0 + Duration::minutes(5);
        let (merged, sources) = merge_sources(vec![
            Candidate::new("WorldCup", "rss", 0.4, t0).unwrap(),
            Candidate::new("Oscars", "rss", 0.9, t0).unwrap(),
            Candidate::new("worldcup", "scrape", 0.8, later).unwrap(),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tag(), "WorldCup");
        assert_eq!(merged[0].raw_score(), 0.8);
        assert_eq!(merged[0].observed_at(), later);
        let s = &sources["worldcup"];
        assert!(s.contains("rss") && s.contains("scrape"));
    }
}
