//! Concrete source adapters plus the registry the orchestrator selects from.

pub mod bing;
pub mod gnews;
pub mod reddit;
pub mod twitter;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::batch::SourceId;
use crate::config::SourcesConfig;
use crate::ingest::types::{FetchError, SourceAdapter};

pub use bing::BingNewsAdapter;
pub use gnews::GNewsAdapter;
pub use reddit::RedditAdapter;
pub use twitter::TwitterAdapter;

const USER_AGENT: &str = "crypto-sentiment/0.1 (sentiment batch collector)";

/// Shared HTTP client for every outbound call of a run.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4).min(timeout))
        .timeout(timeout)
        .build()
}

/// Send a GET and return the body, mapping transport and status failures into
/// the fetch error taxonomy.
pub(crate) async fn get_body(
    source: SourceId,
    req: reqwest::RequestBuilder,
) -> Result<String, FetchError> {
    let resp = req
        .send()
        .await
        .map_err(|e| FetchError::transient(source, e))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| FetchError::transient(source, format!("reading body: {e}")))?;
    if !status.is_success() {
        return Err(status_error(source, status, &body));
    }
    Ok(body)
}

fn status_error(source: SourceId, status: StatusCode, body: &str) -> FetchError {
    let snippet: String = body.chars().take(200).collect();
    let reason = format!("HTTP {status}: {snippet}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized {
            provider: source,
            reason,
        },
        // 429, 5xx and remaining 4xx: a failed call, not a decoding problem.
        _ => FetchError::Transient {
            provider: source,
            reason,
        },
    }
}

pub(crate) fn missing_credential(source: SourceId, what: &str) -> FetchError {
    FetchError::Unauthorized {
        provider: source,
        reason: format!("{what} is not configured"),
    }
}

/// SourceId → adapter, built once at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for its own `source()`.
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.source(), adapter);
        self
    }

    /// All four production adapters sharing one HTTP client.
    pub fn from_config(cfg: &SourcesConfig, http: reqwest::Client) -> Self {
        Self::new()
            .with(Arc::new(TwitterAdapter::new(http.clone(), &cfg.twitter)))
            .with(Arc::new(RedditAdapter::new(http.clone(), &cfg.reddit)))
            .with(Arc::new(BingNewsAdapter::new(http.clone(), &cfg.bing)))
            .with(Arc::new(GNewsAdapter::new(http, &cfg.gnews)))
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&id).cloned()
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.adapters.keys().copied()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}
