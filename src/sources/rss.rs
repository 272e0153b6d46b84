// src/sources/rss.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{get_text, ranked_candidates, FetchContext, SourceAdapter};
use crate::candidate::Candidate;
use crate::error::SourceError;
use crate::tags::{camel_tag, normalize_title};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
}

/// Daily-trends RSS feed; each item title becomes a CamelCase tag.
pub struct RssAdapter {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl RssAdapter {
    pub fn new(id: &str, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.to_string(),
            url: url.into(),
            client,
        }
    }
}

/// Parse an RSS document into ranked candidates, in feed order.
pub fn parse_rss(xml: &str, source_id: &str, now: DateTime<Utc>) -> Result<Vec<Candidate>, SourceError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean)?;
    let topics = rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| it.title)
        .map(|t| camel_tag(&normalize_title(&t)));
    Ok(ranked_candidates(topics, source_id, now))
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        let body = get_text(&self.client, &self.url, ctx.timeout).await?;
        parse_rss(&body, &self.id, ctx.now)
    }
}

/// HTML entities that feeds leak into XML and quick-xml would reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:ht="https://trends.google.com/trends/trendingsearches/daily">
  <channel>
    <title>Daily Search Trends</title>
    <item><title><![CDATA[World Cup]]></title><ht:approx_traffic>500,000+</ht:approx_traffic></item>
    <item><title>Taylor&nbsp;Swift tour</title></item>
    <item><title>#2024</title></item>
  </channel>
</rss>"#;

    #[test]
    fn parses_titles_in_order() {
        let out = parse_rss(FEED, "rss", Utc::now()).unwrap();
        let tags: Vec<&str> = out.iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["WorldCup", "TaylorSwiftTour"]);
        assert!(out[0].raw_score() > out[1].raw_score());
        assert!(out.iter().all(|c| c.source_id() == "rss"));
    }

    #[test]
    fn empty_channel_is_ok_and_empty() {
        let xml = "<rss><channel><title>x</title></channel></rss>";
        assert!(parse_rss(xml, "rss", Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let err = parse_rss("<rss><channel>", "rss", Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
