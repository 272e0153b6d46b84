// src/sources/json.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{get_text, ranked_candidates, FetchContext, SourceAdapter, MAX_ITEMS_PER_SOURCE};
use crate::candidate::Candidate;
use crate::error::SourceError;

/// Trends proxy endpoint returning either `[{"name": ..}]` or `{"trends": [{"name": ..}]}`.
pub struct JsonAdapter {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl JsonAdapter {
    pub fn new(id: &str, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.to_string(),
            url: url.into(),
            client,
        }
    }
}

pub fn parse_json(body: &str, source_id: &str, now: DateTime<Utc>) -> Result<Vec<Candidate>, SourceError> {
    let v: Value = serde_json::from_str(body)?;
    let items = match &v {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("trends") {
            Some(Value::Array(items)) => items,
            _ => return Err(SourceError::Parse("object without a `trends` array".into())),
        },
        _ => return Err(SourceError::Parse("expected array or object".into())),
    };
    let names = items
        .iter()
        .take(MAX_ITEMS_PER_SOURCE)
        .filter_map(|it| it.get("name").and_then(Value::as_str));
    Ok(ranked_candidates(names, source_id, now))
}

#[async_trait]
impl SourceAdapter for JsonAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        let body = get_text(&self.client, &self.url, ctx.timeout).await?;
        parse_json(&body, &self.id, ctx.now)
    }
}
