// src/bridge.rs
//! Bridge sentences that connect an off-domain trend to GPU / AI compute.
//!
//! Category patterns are checked in order (sports, entertainment, news,
//! generic); the first match picks a template family. Within a family the
//! template is chosen by a stable hash of the tag, so output is a pure function
//! of the input. Every template mentions the tag.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeCategory {
    Sports,
    Entertainment,
    News,
    Generic,
    Fallback,
}

struct Family {
    category: BridgeCategory,
    pattern: Regex,
    templates: &'static [&'static str],
}

const FALLBACK_TEMPLATE: &str = "While #{tag} trends, smart teams choose scalable GPU compute";

static FAMILIES: Lazy<Vec<Family>> = Lazy::new(|| {
    let fam = |category: BridgeCategory, pattern: &str, templates: &'static [&'static str]| Family {
        category,
        pattern: Regex::new(pattern).expect("bridge category regex"),
        templates,
    };
    vec![
        fam(
            BridgeCategory::Sports,
            r"ufc|mma|boxing|fight|nfl|nba|nhl|mlb|soccer|football|baseball|basketball|olympic|worldcup|championship|superbowl|league|tennis|f1|racing",
            &[
                "#{tag} traffic spike incoming? Autoscale your AI with on-demand GPUs",
                "Global audience for #{tag}? Deploy GPUs worldwide in minutes",
                "Game day for #{tag} means surge load. Scale inference instantly, pay per use",
            ],
        ),
        fam(
            BridgeCategory::Entertainment,
            r"music|concert|festival|album|tour|movie|film|netflix|disney|oscar|grammy|emmy|gaming|game|xbox|playstation|nintendo|series|trailer",
            &[
                "Streaming #{tag} to millions? GPU-powered transcoding at any scale",
                "#{tag} is all over the feed. Content at that scale needs serious GPU compute",
                "#{tag} + AI = next-gen experiences. Start with instant GPUs",
            ],
        ),
        fam(
            BridgeCategory::News,
            r"breaking|news|alert|live|update|launch|release|announce|earnings|report",
            &[
                "Making sense of #{tag}? Process data faster with GPU acceleration",
                "#{tag} launch traffic? Scale compute instantly, pay per use",
                "Real-time analysis of #{tag} runs on fast inference, not waiting queues",
            ],
        ),
        fam(
            BridgeCategory::Generic,
            r"trend|viral|hot|challenge|meme|day|week|vibes",
            &[
                "#{tag} going viral? Don't let your servers crash. Scale GPUs on-demand",
                "Riding #{tag}? Ship your AI features on elastic GPU compute",
            ],
        ),
    ]
});

/// Stateless, pure bridge generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeSynthesizer;

impl BridgeSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Category the tag falls into.
    pub fn categorize(&self, tag: &str) -> BridgeCategory {
        let key = clean(tag).to_ascii_lowercase();
        FAMILIES
            .iter()
            .find(|f| f.pattern.is_match(&key))
            .map(|f| f.category)
            .unwrap_or(BridgeCategory::Fallback)
    }

    /// A non-empty sentence mentioning `tag` and pivoting to the target domain.
    pub fn bridge(&self, tag: &str) -> String {
        let display = clean(tag);
        let display = if display.is_empty() { "this" } else { display.as_str() };
        let key = display.to_ascii_lowercase();

        let template = FAMILIES
            .iter()
            .find(|f| f.pattern.is_match(&key))
            .map(|f| f.templates[stable_index(&key, f.templates.len())])
            .unwrap_or(FALLBACK_TEMPLATE);

        template.replace("{tag}", display)
    }
}

fn clean(tag: &str) -> String {
    tag.trim()
        .trim_start_matches(['#', '@'])
        .chars()
        .filter(|c| !c.is_control() && !c.is_whitespace())
        .collect()
}

fn stable_index(key: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    let n = digest
        .iter()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    (n % len as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_match_patterns() {
        let b = BridgeSynthesizer::new();
        assert_eq!(b.categorize("#WorldCup"), BridgeCategory::Sports);
        assert_eq!(b.categorize("NetflixSeries"), BridgeCategory::Entertainment);
        assert_eq!(b.categorize("BreakingNews"), BridgeCategory::News);
        assert_eq!(b.categorize("ViralChallenge"), BridgeCategory::Generic);
        assert_eq!(b.categorize("Zzyzx"), BridgeCategory::Fallback);
    }

    #[test]
    fn fallback_mentions_tag() {
        let b = BridgeSynthesizer::new();
        assert_eq!(
            b.bridge("#Zzyzx"),
            "While #Zzyzx trends, smart teams choose scalable GPU compute"
        );
    }

    #[test]
    fn same_tag_same_sentence() {
        let b = BridgeSynthesizer::new();
        assert_eq!(b.bridge("Oscars"), b.bridge("Oscars"));
    }

    #[test]
    fn never_empty() {
        let b = BridgeSynthesizer::new();
        assert!(!b.bridge("").is_empty());
        assert!(!b.bridge("#").is_empty());
    }
}
