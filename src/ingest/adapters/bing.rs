//! Bing News search via its public RSS output.

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::batch::{Meta, SourceId, TrackedCrypto};
use crate::config::BingConfig;
use crate::ingest::adapters::get_body;
use crate::ingest::headline_text;
use crate::ingest::types::{
    validate_crypto, validate_query, FetchEnvelope, FetchError, FetchLimit, RawDocument,
    SourceAdapter, DEFAULT_FETCH_LIMIT,
};

const SOURCE: SourceId = SourceId::Bing;

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
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
}

pub struct BingNewsAdapter {
    http: reqwest::Client,
    base_url: String,
    market: String,
}

impl BingNewsAdapter {
    pub fn new(http: reqwest::Client, cfg: &BingConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            market: cfg.market.clone(),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<FetchEnvelope, FetchError> {
        let req = self
            .http
            .get(format!("{}/news/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "rss"),
                ("setmkt", self.market.as_str()),
            ]);
        let body = get_body(SOURCE, req).await?;
        parse_rss(&body, query, limit)
    }
}

/// Decode the RSS feed, keeping at most `limit` items in feed order.
pub fn parse_rss(xml: &str, query: &str, limit: usize) -> Result<FetchEnvelope, FetchError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::malformed(SOURCE, e))?;

    let mut env = FetchEnvelope::new(SOURCE, query);
    env.meta
        .insert("feed_items".into(), rss.channel.item.len().into());

    env.results = rss
        .channel
        .item
        .into_iter()
        .take(limit)
        .map(|it| {
            let text = headline_text(it.title.as_deref(), it.description.as_deref());
            let mut meta = Meta::new();
            if let Some(link) = it.link {
                meta.insert("url".into(), link.into());
            }
            if let Some(ts) = it.pub_date.as_deref().and_then(parse_rfc2822_to_unix) {
                meta.insert("published_at".into(), ts.into());
            }
            RawDocument::new(text).with_meta(meta)
        })
        .collect();

    Ok(env)
}

/// Named HTML entities are not valid XML; fold the common ones first.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

fn coin_query(crypto: &TrackedCrypto) -> String {
    format!("{} {}", crypto.name.trim(), crypto.acronym.trim())
}

#[async_trait]
impl SourceAdapter for BingNewsAdapter {
    fn source(&self) -> SourceId {
        SOURCE
    }

    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError> {
        validate_crypto(crypto)?;
        self.search(&coin_query(crypto), limit.get()).await
    }

    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        let q = validate_query(query)?;
        self.search(q, DEFAULT_FETCH_LIMIT).await
    }
}
