//! GNews v4 search.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::batch::{Meta, SourceId, TrackedCrypto};
use crate::config::GNewsConfig;
use crate::ingest::adapters::{get_body, missing_credential};
use crate::ingest::headline_text;
use crate::ingest::types::{
    validate_crypto, validate_query, FetchEnvelope, FetchError, FetchLimit, RawDocument,
    SourceAdapter, DEFAULT_FETCH_LIMIT,
};

const SOURCE: SourceId = SourceId::Gnews;
const MAX_ARTICLES: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total_articles: Option<u64>,
    #[serde(default)]
    articles: Vec<Article>,
    /// GNews reports failures as either a list or a keyed object of messages.
    #[serde(default)]
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct GNewsAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    lang: String,
}

impl GNewsAdapter {
    pub fn new(http: reqwest::Client, cfg: &GNewsConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            lang: cfg.lang.clone(),
        }
    }

    async fn search(&self, query: &str, max: usize) -> Result<FetchEnvelope, FetchError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_credential(SOURCE, "GNEWS_API_KEY"))?;
        let max = max.to_string();
        let req = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("lang", self.lang.as_str()),
                ("max", max.as_str()),
                ("apikey", key),
            ]);
        let body = get_body(SOURCE, req).await?;
        parse_search_response(&body, query)
    }
}

/// Decode a search body. A non-empty `errors` member fails the fetch.
pub fn parse_search_response(body: &str, query: &str) -> Result<FetchEnvelope, FetchError> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::malformed(SOURCE, e))?;

    let errors = collect_errors(resp.errors.as_ref());
    if !errors.is_empty() {
        return Err(FetchError::PartialResponse {
            provider: SOURCE,
            errors,
            documents: resp.articles.len(),
        });
    }

    let mut env = FetchEnvelope::new(SOURCE, query);
    if let Some(total) = resp.total_articles {
        env.meta.insert("total_articles".into(), total.into());
    }

    env.results = resp
        .articles
        .into_iter()
        .map(|a| {
            let text = headline_text(a.title.as_deref(), a.description.as_deref());
            let mut meta = Meta::new();
            if let Some(url) = a.url {
                meta.insert("url".into(), url.into());
            }
            if let Some(ts) = a.published_at {
                meta.insert("published_at".into(), ts.into());
            }
            if let Some(name) = a.source.and_then(|s| s.name) {
                meta.insert("publisher".into(), name.into());
            }
            RawDocument::new(text).with_meta(meta)
        })
        .collect();

    Ok(env)
}

fn collect_errors(errors: Option<&Value>) -> Vec<String> {
    let as_text = |v: &Value| v.as_str().map_or_else(|| v.to_string(), str::to_string);
    match errors {
        Some(Value::Array(items)) => items.iter().map(as_text).collect(),
        Some(Value::Object(map)) => map.values().map(as_text).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![as_text(other)],
    }
}

#[async_trait]
impl SourceAdapter for GNewsAdapter {
    fn source(&self) -> SourceId {
        SOURCE
    }

    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError> {
        validate_crypto(crypto)?;
        self.search(crypto.name.trim(), limit.clamp_to(1, MAX_ARTICLES))
            .await
    }

    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        let q = validate_query(query)?;
        self.search(q, DEFAULT_FETCH_LIMIT.min(MAX_ARTICLES)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_shapes_are_collected() {
        assert_eq!(
            collect_errors(Some(&serde_json::json!(["quota exceeded"]))),
            vec!["quota exceeded".to_string()]
        );
        assert_eq!(
            collect_errors(Some(&serde_json::json!({"q": "required"}))),
            vec!["required".to_string()]
        );
        assert!(collect_errors(None).is_empty());
        assert!(collect_errors(Some(&serde_json::json!([]))).is_empty());
    }
}
