// src/tags.rs
//! Tag hygiene shared by every source: cleaning raw hashtags into the canonical
//! alphanumeric form, splitting them into lowercase word segments, and turning
//! free-text topics into CamelCase tags.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_TAG_LEN: usize = 3;
pub const MAX_TAG_LEN: usize = 30;

/// Substrings that mark scraper artefacts rather than real trends.
const NOISE_MARKERS: &[&str] = &["collapsible", "test", "debug", "lorem", "ipsum"];

static RE_HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{3,8}$").expect("hex regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("html tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Clean a raw hashtag (`#Foo_Bar!`, `@foo`, `foo bar`) into a canonical tag.
///
/// Returns `None` when nothing usable is left: wrong length, digits only,
/// a hex colour code, or a known noise marker.
pub fn clean_tag(raw: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(raw);
    let tag: String = decoded
        .trim()
        .trim_start_matches(['#', '@'])
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    let len = tag.len();
    if !(MIN_TAG_LEN..=MAX_TAG_LEN).contains(&len) {
        return None;
    }
    if tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let lower = tag.to_ascii_lowercase();
    // "#ff00aa" style colour codes leak out of scraped CSS; plain words like "add" stay.
    if RE_HEX.is_match(&lower) && lower.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if NOISE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    Some(tag)
}

/// Split a tag into lowercase word segments on camelCase, acronym and digit
/// boundaries: `GPUCompute` → `["gpu", "compute"]`, `AI2024` → `["ai", "2024"]`.
/// A tag written all in one case stays a single segment.
pub fn segments(tag: &str) -> Vec<String> {
    let chars: Vec<char> = tag.chars().collect();
    let mut out = Vec::new();
    let mut cur = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur).to_ascii_lowercase());
            }
            continue;
        }
        if !cur.is_empty() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_ascii_lowercase() && c.is_ascii_uppercase())
                || (prev.is_ascii_alphabetic() && c.is_ascii_digit())
                || (prev.is_ascii_digit() && c.is_ascii_alphabetic())
                || (prev.is_ascii_uppercase()
                    && c.is_ascii_uppercase()
                    && next.is_some_and(|n| n.is_ascii_lowercase()));
            if boundary {
                out.push(std::mem::take(&mut cur).to_ascii_lowercase());
            }
        }
        cur.push(c);
    }
    if !cur.is_empty() {
        out.push(cur.to_ascii_lowercase());
    }
    out
}

/// Build a CamelCase tag from the first three words of a topic:
/// `"machine-learning ops"` → `"MachineLearningOps"`.
pub fn camel_tag(topic: &str) -> String {
    topic
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(3)
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + cs.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Normalize a feed/page title: HTML entity decode, strip tags, collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    RE_WS.replace_all(&stripped, " ").trim().to_string()
}

/// Rank-based popularity in (0, 1]: the first of `n` items scores 1.0.
pub fn rank_score(index: usize, n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    (n.saturating_sub(index)) as f32 / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_tag_strips_prefix_and_punctuation() {
        assert_eq!(clean_tag("#Machine_Learning!"), Some("MachineLearning".into()));
        assert_eq!(clean_tag("  @OpenAI "), Some("OpenAI".into()));
        assert_eq!(clean_tag("world cup"), Some("worldcup".into()));
    }

    #[test]
    fn clean_tag_rejects_noise() {
        assert_eq!(clean_tag("#ab"), None);
        assert_eq!(clean_tag("#2024"), None);
        assert_eq!(clean_tag("#ff00aa"), None);
        assert_eq!(clean_tag("#LoremIpsum"), None);
        assert_eq!(clean_tag(&"x".repeat(31)), None);
        // plain hex-looking words survive
        assert_eq!(clean_tag("#add"), Some("add".into()));
    }

    #[test]
    fn segments_follow_case_and_digit_boundaries() {
        assert_eq!(segments("GPUCompute"), vec!["gpu", "compute"]);
        assert_eq!(segments("AIInfra"), vec!["ai", "infra"]);
        assert_eq!(
            segments("MachineLearning2024"),
            vec!["machine", "learning", "2024"]
        );
        assert_eq!(segments("gpucompute"), vec!["gpucompute"]);
        assert_eq!(segments("open_ai"), vec!["open", "ai"]);
    }

    #[test]
    fn camel_tag_takes_three_words() {
        assert_eq!(camel_tag("machine-learning"), "MachineLearning");
        assert_eq!(camel_tag("GPU shortage hits labs hard"), "GPUShortageHits");
    }

    #[test]
    fn normalize_title_decodes_and_collapses() {
        assert_eq!(normalize_title("<b>Taylor&nbsp;&nbsp;Swift</b> "), "Taylor Swift");
    }

    #[test]
    fn rank_score_is_descending() {
        assert_eq!(rank_score(0, 4), 1.0);
        assert_eq!(rank_score(3, 4), 0.25);
        assert_eq!(rank_score(0, 0), 0.0);
    }
}
