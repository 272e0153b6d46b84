// src/sources/github.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_text, ranked_candidates, FetchContext, SourceAdapter};
use crate::candidate::Candidate;
use crate::error::SourceError;
use crate::tags::camel_tag;

const REPOS_USED: usize = 5;
const TOPICS_PER_REPO: usize = 2;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    #[serde(default)]
    topics: Vec<String>,
}

/// GitHub repository search; topics of the top repositories become tags.
pub struct GithubAdapter {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl GithubAdapter {
    pub fn new(id: &str, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.to_string(),
            url: url.into(),
            client,
        }
    }
}

pub fn parse_github(body: &str, source_id: &str, now: DateTime<Utc>) -> Result<Vec<Candidate>, SourceError> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    let topics = resp
        .items
        .into_iter()
        .take(REPOS_USED)
        .flat_map(|r| r.topics.into_iter().take(TOPICS_PER_REPO))
        .map(|t| camel_tag(&t));
    Ok(ranked_candidates(topics, source_id, now))
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        let body = get_text(&self.client, &self.url, ctx.timeout).await?;
        parse_github(&body, &self.id, ctx.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_become_camel_tags() {
        let body = r#"{"total_count": 2, "items": [
            {"full_name": "a/b", "topics": ["machine-learning", "pytorch", "ignored-third"]},
            {"full_name": "c/d", "topics": ["llm"]},
            {"full_name": "e/f"}
        ]}"#;
        let out = parse_github(body, "github", Utc::now()).unwrap();
        let tags: Vec<&str> = out.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["MachineLearning", "Pytorch", "Llm"]);
    }

    #[test]
    fn wrong_shape_is_parse_error() {
        assert_eq!(
            parse_github("[1,2,3]", "github", Utc::now()).unwrap_err().kind(),
            "parse"
        );
    }
}
