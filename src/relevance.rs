// src/relevance.rs
//! Domain relevance scoring for candidate tags.
//!
//! Two stages, cheapest first:
//! 1. keyword stage: a domain keyword found in the cleaned tag scores
//!    [`KEYWORD_SCORE`] immediately;
//! 2. vector stage: cosine similarity between the tag's term-frequency vector
//!    and a reference corpus vector built once at construction, plus a
//!    [`TECH_BOOST`] when the tag looks tech-adjacent.
//!
//! Very short keywords (`ai`, `ml`, `api`) only match whole word segments so
//! `#Bahrain` or `#Rapids` do not score as on-domain.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::tags::segments;

pub const KEYWORD_SCORE: f32 = 0.85;
pub const TECH_BOOST: f32 = 0.2;

pub const DOMAIN_KEYWORDS: &[&str] = &[
    "ai", "gpu", "llm", "cloud", "inference", "training", "rendering", "compute", "latency",
    "autoscale", "ml", "deep learning", "neural", "model", "deployment", "serverless",
    "kubernetes", "docker", "api", "performance", "optimization", "cuda", "tensor", "pytorch",
    "tensorflow", "huggingface", "openai", "anthropic", "gemini", "llama", "mistral", "nvidia",
    "mlops", "hpc", "datacenter",
];

/// Keywords too short to match safely inside other words.
const SEGMENT_ONLY: &[&str] = &["ai", "ml", "api"];

pub const REFERENCE_CORPUS: &str = "\
GPU computing cloud infrastructure AI machine learning. \
Deep learning neural networks training inference. \
CUDA tensor cores RTX A100 H100 compute. \
Kubernetes docker containers orchestration deployment. \
API REST GraphQL microservices serverless. \
Latency throughput performance optimization scaling. \
Cost effective pricing pay as you go on demand. \
Data science analytics big data processing. \
LLM transformer models GPT BERT diffusion. \
Rendering graphics visualization simulation. \
High performance computing HPC cluster. \
Autoscaling elastic compute resources. \
Cloud native infrastructure as a service. \
Machine learning operations MLOps DevOps.";

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "go", "in", "is", "of", "on", "or", "the", "to",
    "with", "you",
];

static RE_TECH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(tech|code|dev|data|api|cloud)\b").expect("tech regex"));
static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

/// Which stage produced the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Keyword { keyword: String },
    Vector { similarity: f32, boosted: bool },
}

/// Result of relevance evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceBreakdown {
    pub score: f32,
    #[serde(flatten)]
    pub stage: Stage,
}

#[derive(Debug, Clone)]
struct Keyword {
    term: String,
    segment_only: bool,
}

/// Keyword + vector hybrid scorer. Immutable after construction, so the same
/// tag always yields the same score.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    keywords: Vec<Keyword>,
    corpus: HashMap<String, f32>,
    corpus_norm: f32,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(DOMAIN_KEYWORDS, REFERENCE_CORPUS)
    }
}

impl RelevanceScorer {
    pub fn new(keywords: &[&str], corpus: &str) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| {
                let term: String = k
                    .to_ascii_lowercase()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect();
                let segment_only = SEGMENT_ONLY.contains(&term.as_str());
                Keyword { term, segment_only }
            })
            .filter(|k| !k.term.is_empty())
            .collect();

        let corpus = term_frequencies(tokenize(corpus));
        let corpus_norm = norm(&corpus);
        Self {
            keywords,
            corpus,
            corpus_norm,
        }
    }

    /// Relevance in `[0, 1]`.
    pub fn score(&self, tag: &str) -> f32 {
        self.evaluate(tag).score
    }

    pub fn evaluate(&self, tag: &str) -> RelevanceBreakdown {
        let segs = segments(tag.trim_start_matches(['#', '@']));
        let joined: String = segs.concat();

        // 1) Keyword stage
        for kw in &self.keywords {
            let hit = if kw.segment_only {
                segs.iter().any(|s| *s == kw.term)
            } else {
                joined.contains(kw.term.as_str())
            };
            if hit {
                debug!(target: "relevance", tag, keyword = %kw.term, "keyword match");
                return RelevanceBreakdown {
                    score: KEYWORD_SCORE,
                    stage: Stage::Keyword {
                        keyword: kw.term.clone(),
                    },
                };
            }
        }

        // 2) Vector stage
        let tokens: Vec<String> = segs
            .iter()
            .filter(|s| !STOPWORDS.contains(&s.as_str()))
            .cloned()
            .collect();
        let similarity = self.cosine(&term_frequencies(tokens));
        let boosted = RE_TECH.is_match(&segs.join(" "));
        let mut score = similarity;
        if boosted {
            score = (score + TECH_BOOST).min(1.0);
        }
        let score = score.clamp(0.0, 1.0);
        debug!(target: "relevance", tag, similarity, boosted, score, "vector score");

        RelevanceBreakdown {
            score,
            stage: Stage::Vector {
                similarity,
                boosted,
            },
        }
    }

    fn cosine(&self, tf: &HashMap<String, f32>) -> f32 {
        let n = norm(tf);
        if n == 0.0 || self.corpus_norm == 0.0 {
            return 0.0;
        }
        let dot: f32 = tf
            .iter()
            .filter_map(|(t, w)| self.corpus.get(t).map(|c| w * c))
            .sum();
        dot / (n * self.corpus_norm)
    }
}

/// Lowercased word tokens without stopwords.
fn tokenize(text: &str) -> Vec<String> {
    RE_WORD
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn term_frequencies(tokens: Vec<String>) -> HashMap<String, f32> {
    let mut tf = HashMap::new();
    for t in tokens {
        *tf.entry(t).or_insert(0.0) += 1.0;
    }
    tf
}

fn norm(v: &HashMap<String, f32>) -> f32 {
    v.values().map(|x| x * x).sum::<f32>().sqrt()
}
