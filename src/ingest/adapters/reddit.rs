//! Reddit site-wide search (`/search.json`), newest first.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::batch::{Meta, SourceId, TrackedCrypto};
use crate::config::RedditConfig;
use crate::ingest::adapters::get_body;
use crate::ingest::headline_text;
use crate::ingest::types::{
    validate_crypto, validate_query, FetchEnvelope, FetchError, FetchLimit, RawDocument,
    SourceAdapter, DEFAULT_FETCH_LIMIT,
};

const SOURCE: SourceId = SourceId::Reddit;
const MAX_LIMIT: usize = 100;
/// Post fields copied into document metadata.
const KEPT_FIELDS: [&str; 8] = [
    "id",
    "author",
    "subreddit",
    "created_utc",
    "score",
    "num_comments",
    "upvote_ratio",
    "permalink",
];

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Meta,
}

pub struct RedditAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl RedditAdapter {
    pub fn new(http: reqwest::Client, cfg: &RedditConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<FetchEnvelope, FetchError> {
        let limit = limit.to_string();
        let req = self
            .http
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("q", query),
                ("sort", "new"),
                ("type", "link"),
                ("limit", limit.as_str()),
            ]);
        let body = get_body(SOURCE, req).await?;
        parse_search_response(&body, query)
    }
}

/// Decode a search listing. A body carrying `error` is a failed fetch.
pub fn parse_search_response(body: &str, query: &str) -> Result<FetchEnvelope, FetchError> {
    let listing: Listing =
        serde_json::from_str(body).map_err(|e| FetchError::malformed(SOURCE, e))?;

    if let Some(err) = listing.error {
        let reason = listing.message.unwrap_or_else(|| err.to_string());
        return Err(FetchError::transient(SOURCE, format!("reddit error: {reason}")));
    }
    let data = listing
        .data
        .ok_or_else(|| FetchError::malformed(SOURCE, "listing without data"))?;

    let mut env = FetchEnvelope::new(SOURCE, query);
    if let Some(after) = data.after {
        env.meta.insert("after".into(), after.into());
    }
    env.meta
        .insert("result_count".into(), data.children.len().into());

    env.results = data
        .children
        .into_iter()
        .map(|Child { data: post }| {
            let title = post.get("title").and_then(Value::as_str);
            let body = post.get("selftext").and_then(Value::as_str);
            let text = headline_text(title, body);
            let meta: Meta = KEPT_FIELDS
                .iter()
                .filter_map(|k| post.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect();
            RawDocument::new(text).with_meta(meta)
        })
        .collect();

    Ok(env)
}

fn coin_query(crypto: &TrackedCrypto) -> String {
    format!("{} OR {}", crypto.name.trim(), crypto.acronym.trim())
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn source(&self) -> SourceId {
        SOURCE
    }

    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError> {
        validate_crypto(crypto)?;
        self.search(&coin_query(crypto), limit.clamp_to(1, MAX_LIMIT))
            .await
    }

    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        let q = validate_query(query)?;
        self.search(q, DEFAULT_FETCH_LIMIT.min(MAX_LIMIT)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_fails_closed() {
        let err = parse_search_response(r#"{"error":429,"message":"Too Many Requests"}"#, "q")
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn listing_without_data_is_malformed() {
        let err = parse_search_response(r#"{"kind":"Listing"}"#, "q").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn coin_query_mentions_name_and_ticker() {
        assert_eq!(
            coin_query(&TrackedCrypto::new("Cardano", "ADA")),
            "Cardano OR ADA"
        );
    }
}
