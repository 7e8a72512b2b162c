//! Twitter v2 recent search.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::batch::{Meta, SourceId, TrackedCrypto};
use crate::config::TwitterConfig;
use crate::ingest::adapters::{get_body, missing_credential};
use crate::ingest::normalize_text;
use crate::ingest::types::{
    validate_crypto, validate_query, FetchEnvelope, FetchError, FetchLimit, RawDocument,
    SourceAdapter,
};

const SOURCE: SourceId = SourceId::Twitter;
/// `max_results` range accepted by the recent-search endpoint.
const MIN_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;
const TWEET_FIELDS: &str =
    "created_at,entities,in_reply_to_user_id,public_metrics,referenced_tweets,source,author_id";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Meta>,
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    errors: Vec<Value>,
}

pub struct TwitterAdapter {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl TwitterAdapter {
    pub fn new(http: reqwest::Client, cfg: &TwitterConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            bearer_token: cfg.bearer_token.clone().filter(|t| !t.trim().is_empty()),
        }
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<FetchEnvelope, FetchError> {
        let token = self
            .bearer_token
            .as_deref()
            .ok_or_else(|| missing_credential(SOURCE, "TWITTER_BEARER_TOKEN"))?;

        tracing::debug!(query, max_results, "twitter recent search");
        let max_results = max_results.to_string();
        let req = self
            .http
            .get(format!("{}/tweets/search/recent", self.base_url))
            .bearer_auth(token)
            .query(&[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
            ]);
        let body = get_body(SOURCE, req).await?;
        parse_search_response(&body, query)
    }
}

/// Decode a recent-search body. Any `errors` entry fails the whole fetch.
pub fn parse_search_response(body: &str, query: &str) -> Result<FetchEnvelope, FetchError> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::malformed(SOURCE, e))?;

    if !resp.errors.is_empty() {
        return Err(FetchError::PartialResponse {
            provider: SOURCE,
            errors: resp.errors.iter().map(describe_error).collect(),
            documents: resp.data.len(),
        });
    }

    let mut env = FetchEnvelope::new(SOURCE, query);
    if let Some(meta) = resp.meta {
        env.meta.extend(meta);
    }

    env.results = resp
        .data
        .into_iter()
        .map(|mut tweet| {
            let text = match tweet.remove("text") {
                Some(Value::String(s)) => s,
                _ => return Err(FetchError::malformed(SOURCE, "tweet without text")),
            };
            Ok(RawDocument::new(normalize_text(&text)).with_meta(tweet))
        })
        .collect::<Result<_, _>>()?;

    Ok(env)
}

fn describe_error(e: &Value) -> String {
    e.get("detail")
        .or_else(|| e.get("message"))
        .or_else(|| e.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| e.to_string())
}

fn coin_query(crypto: &TrackedCrypto) -> String {
    format!("{} lang:en", crypto.acronym.trim())
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn source(&self) -> SourceId {
        SOURCE
    }

    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError> {
        validate_crypto(crypto)?;
        let n = limit.clamp_to(MIN_RESULTS, MAX_RESULTS);
        let mut env = self.search(&coin_query(crypto), n).await?;
        // The API never returns fewer than 10; honour smaller requests here.
        env.results.truncate(limit.get());
        Ok(env)
    }

    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        let q = validate_query(query)?;
        self.search(q, MAX_RESULTS).await
    }
}
