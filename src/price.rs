//! Point-in-time price lookup used to enrich batch summaries.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::PriceConfig;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price lookup is disabled")]
    Disabled,
    #[error("empty coin symbol")]
    EmptySymbol,
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("price service returned HTTP {0}")]
    Status(u16),
    #[error("price service error: {0}")]
    Upstream(String),
    #[error("unexpected price payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Current price of `acronym` in the configured quote currency.
    async fn get_price(&self, acronym: &str) -> Result<f64, PriceError>;
}

/// Always fails with `Disabled`; summaries then carry `batchTimePrice: null`.
pub struct DisabledPriceLookup;

#[async_trait]
impl PriceLookup for DisabledPriceLookup {
    async fn get_price(&self, _acronym: &str) -> Result<f64, PriceError> {
        Err(PriceError::Disabled)
    }
}

/// CryptoCompare `data/price` client.
pub struct CryptoCompareClient {
    http: reqwest::Client,
    base_url: String,
    quote: String,
    api_key: Option<String>,
}

impl CryptoCompareClient {
    pub fn new(http: reqwest::Client, cfg: &PriceConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            quote: cfg.quote.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl PriceLookup for CryptoCompareClient {
    async fn get_price(&self, acronym: &str) -> Result<f64, PriceError> {
        let fsym = acronym.trim().to_ascii_uppercase();
        if fsym.is_empty() {
            return Err(PriceError::EmptySymbol);
        }

        let mut req = self
            .http
            .get(format!("{}/data/price", self.base_url))
            .query(&[("fsym", fsym.as_str()), ("tsyms", self.quote.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.header("authorization", format!("Apikey {key}"));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PriceError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        parse_price(&body, &self.quote)
    }
}

/// `{"USD": 42000.1}` on success, `{"Response":"Error","Message":...}` otherwise.
pub fn parse_price(body: &str, quote: &str) -> Result<f64, PriceError> {
    let v: Value = serde_json::from_str(body).map_err(|e| PriceError::Malformed(e.to_string()))?;

    if v.get("Response").and_then(Value::as_str) == Some("Error") {
        let msg = v
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(PriceError::Upstream(msg.to_string()));
    }

    v.get(quote)
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite())
        .ok_or_else(|| PriceError::Malformed(format!("no numeric `{quote}` field")))
}
