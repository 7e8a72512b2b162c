// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::batch::{Meta, SourceId, TrackedCrypto};

/// Default (and maximum) number of documents requested from a source.
pub const DEFAULT_FETCH_LIMIT: usize = 100;

/// One text item as returned by a source; metadata is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub text: String,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl RawDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            meta: Meta::new(),
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

/// Normalized result of one fetch. `results` keeps source order and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchEnvelope {
    pub source: SourceId,
    pub results: Vec<RawDocument>,
    #[serde(default)]
    pub meta: Meta,
}

impl FetchEnvelope {
    pub fn new(source: SourceId, query: &str) -> Self {
        let mut meta = Meta::new();
        meta.insert("query".into(), query.into());
        Self {
            source,
            results: Vec::new(),
            meta,
        }
    }
}

/// Requested document count; always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimit(usize);

impl FetchLimit {
    pub fn new(n: usize) -> Result<Self, FetchError> {
        if n == 0 {
            return Err(FetchError::InvalidInput("limit must be >= 1".into()));
        }
        Ok(Self(n))
    }

    pub fn get(&self) -> usize {
        self.0
    }

    /// Fit the request into what a given API accepts.
    pub fn clamp_to(&self, min: usize, max: usize) -> usize {
        self.0.clamp(min, max)
    }
}

impl Default for FetchLimit {
    fn default() -> Self {
        Self(DEFAULT_FETCH_LIMIT)
    }
}

/// Why a fetch produced no usable envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Rejected before any network call.
    #[error("invalid fetch input: {0}")]
    InvalidInput(String),
    /// Network failure, timeout, throttling or 5xx.
    #[error("{provider} fetch failed: {reason}")]
    Transient { provider: SourceId, reason: String },
    /// Missing or rejected credentials.
    #[error("{provider} rejected credentials: {reason}")]
    Unauthorized { provider: SourceId, reason: String },
    /// Body did not decode into the expected shape.
    #[error("{provider} returned a malformed response: {reason}")]
    Malformed { provider: SourceId, reason: String },
    /// Source reported errors next to (possibly) some data. Fails closed.
    #[error("{provider} reported {} error(s) alongside {documents} document(s): {}", errors.len(), errors.join("; "))]
    PartialResponse {
        provider: SourceId,
        errors: Vec<String>,
        documents: usize,
    },
}

impl FetchError {
    /// Provider that failed; `None` for input rejected before any call.
    pub fn provider(&self) -> Option<SourceId> {
        match self {
            FetchError::InvalidInput(_) => None,
            FetchError::Transient { provider, .. }
            | FetchError::Unauthorized { provider, .. }
            | FetchError::Malformed { provider, .. }
            | FetchError::PartialResponse { provider, .. } => Some(*provider),
        }
    }

    /// True for failures that might succeed on a later run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. }
                | FetchError::Unauthorized { .. }
                | FetchError::PartialResponse { .. }
        )
    }

    pub fn malformed(provider: SourceId, reason: impl ToString) -> Self {
        FetchError::Malformed {
            provider,
            reason: reason.to_string(),
        }
    }

    pub fn transient(provider: SourceId, reason: impl ToString) -> Self {
        FetchError::Transient {
            provider,
            reason: reason.to_string(),
        }
    }
}

/// Capability every source implements. Callers hold `Arc<dyn SourceAdapter>`
/// and never branch on the concrete type.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// Documents about `crypto`, at most `limit` (clamped to the source's range).
    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError>;

    /// Keyword lookup with the source's default limit.
    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError>;
}

/// Shared input checks for `fetch`.
pub fn validate_crypto(crypto: &TrackedCrypto) -> Result<(), FetchError> {
    if crypto.acronym.trim().is_empty() {
        return Err(FetchError::InvalidInput(format!(
            "coin `{}` has an empty acronym",
            crypto.name
        )));
    }
    Ok(())
}

/// Shared input checks for `fetch_public`.
pub fn validate_query(query: &str) -> Result<&str, FetchError> {
    let q = query.trim();
    if q.is_empty() {
        return Err(FetchError::InvalidInput("query must not be blank".into()));
    }
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_rejects_zero_and_clamps() {
        assert!(FetchLimit::new(0).is_err());
        let l = FetchLimit::new(5).unwrap();
        assert_eq!(l.clamp_to(10, 100), 10);
        assert_eq!(FetchLimit::new(500).unwrap().clamp_to(10, 100), 100);
        assert_eq!(FetchLimit::default().get(), DEFAULT_FETCH_LIMIT);
    }

    #[test]
    fn input_validation() {
        assert!(validate_crypto(&TrackedCrypto::new("Bitcoin", " ")).is_err());
        assert!(validate_crypto(&TrackedCrypto::new("Bitcoin", "BTC")).is_ok());
        assert_eq!(validate_query("  eth  ").unwrap(), "eth");
        assert!(validate_query("   ").is_err());
    }

    #[test]
    fn transient_classification() {
        assert!(FetchError::transient(SourceId::Reddit, "timeout").is_transient());
        assert!(!FetchError::malformed(SourceId::Reddit, "bad json").is_transient());
        assert!(!FetchError::InvalidInput("x".into()).is_transient());
    }
}
