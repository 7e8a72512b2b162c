// src/config/pipeline.rs
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::ingest::types::{FetchLimit, DEFAULT_FETCH_LIMIT};
use crate::sentiment::ModelLocation;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

fn default_catalog_path() -> PathBuf {
    PathBuf::from("config/keywords.json")
}
fn default_store_path() -> PathBuf {
    PathBuf::from("data/batches.jsonl")
}
fn default_limit() -> usize {
    DEFAULT_FETCH_LIMIT
}
fn default_score_workers() -> usize {
    1
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

/// Everything a run needs, built once in `main` and handed to constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// 1 = score inline; >1 = blocking worker pool of that size.
    #[serde(default = "default_score_workers")]
    pub score_workers: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Prometheus exposition is written here at the end of the run.
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            store_path: default_store_path(),
            default_limit: default_limit(),
            score_workers: default_score_workers(),
            http_timeout_secs: default_http_timeout_secs(),
            metrics_textfile: None,
            model: ModelConfig::default(),
            price: PriceConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `None` uses the compiled-in artifact.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Expected hex SHA-256 of the artifact at `path`.
    #[serde(default)]
    pub sha256: Option<String>,
}

fn default_price_base_url() -> String {
    "https://min-api.cryptocompare.com".into()
}
fn default_quote() -> String {
    "USD".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_price_base_url")]
    pub base_url: String,
    /// Quote currency for `batchTimePrice`.
    #[serde(default = "default_quote")]
    pub quote: String,
    /// "ENV" means: read from CRYPTOCOMPARE_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_price_base_url(),
            quote: default_quote(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub bing: BingConfig,
    #[serde(default)]
    pub gnews: GNewsConfig,
}

fn default_twitter_base_url() -> String {
    "https://api.twitter.com/2".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_base_url")]
    pub base_url: String,
    /// "ENV" means: read from TWITTER_BEARER_TOKEN.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            base_url: default_twitter_base_url(),
            bearer_token: None,
        }
    }
}

fn default_reddit_base_url() -> String {
    "https://www.reddit.com".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_reddit_base_url(),
        }
    }
}

fn default_bing_base_url() -> String {
    "https://www.bing.com".into()
}
fn default_market() -> String {
    "en-US".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BingConfig {
    #[serde(default = "default_bing_base_url")]
    pub base_url: String,
    #[serde(default = "default_market")]
    pub market: String,
}

impl Default for BingConfig {
    fn default() -> Self {
        Self {
            base_url: default_bing_base_url(),
            market: default_market(),
        }
    }
}

fn default_gnews_base_url() -> String {
    "https://gnews.io/api/v4".into()
}
fn default_lang() -> String {
    "en".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GNewsConfig {
    #[serde(default = "default_gnews_base_url")]
    pub base_url: String,
    /// "ENV" means: read from GNEWS_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: String,
}

impl Default for GNewsConfig {
    fn default() -> Self {
        Self {
            base_url: default_gnews_base_url(),
            api_key: None,
            lang: default_lang(),
        }
    }
}

impl PipelineConfig {
    /// Resolve the config file, parse it, then apply process env overrides:
    /// 1) explicit path (CLI)
    /// 2) $PIPELINE_CONFIG_PATH
    /// 3) config/pipeline.toml if present
    /// 4) built-in defaults
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match env::var(ENV_CONFIG_PATH) {
                Ok(p) => {
                    let pb = PathBuf::from(p);
                    if !pb.exists() {
                        bail!(
                            "{ENV_CONFIG_PATH} points to non-existent path {}",
                            pb.display()
                        );
                    }
                    Some(pb)
                }
                Err(_) => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
            },
        };

        let mut cfg = match path {
            Some(p) => Self::load_from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(|k| env::var(k).ok())?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Secrets and deployment paths come from the environment. `lookup` is
    /// injected so tests don't need to touch the process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PIPELINE_CATALOG_PATH") {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = get("PIPELINE_STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = get("SENTIMENT_MODEL_PATH") {
            self.model.path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SENTIMENT_MODEL_SHA256") {
            self.model.sha256 = Some(v);
        }

        resolve_secret(
            &mut self.sources.twitter.bearer_token,
            get("TWITTER_BEARER_TOKEN"),
            "TWITTER_BEARER_TOKEN",
        )?;
        resolve_secret(
            &mut self.sources.gnews.api_key,
            get("GNEWS_API_KEY"),
            "GNEWS_API_KEY",
        )?;
        resolve_secret(
            &mut self.price.api_key,
            get("CRYPTOCOMPARE_API_KEY"),
            "CRYPTOCOMPARE_API_KEY",
        )?;
        Ok(())
    }

    fn sanitize(&mut self) -> anyhow::Result<()> {
        if self.default_limit == 0 {
            bail!("default_limit must be >= 1");
        }
        if self.score_workers == 0 {
            self.score_workers = 1;
        }
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = default_http_timeout_secs();
        }
        self.price.quote = self.price.quote.trim().to_ascii_uppercase();
        if self.price.quote.is_empty() {
            self.price.quote = default_quote();
        }
        Ok(())
    }

    pub fn fetch_limit(&self) -> FetchLimit {
        FetchLimit::new(self.default_limit).unwrap_or_default()
    }

    pub fn model_location(&self) -> ModelLocation {
        match &self.model.path {
            Some(path) => ModelLocation::Path {
                path: path.clone(),
                sha256: self.model.sha256.clone(),
            },
            None => ModelLocation::Embedded,
        }
    }
}

/// Env value wins; a literal "ENV" placeholder left in the file without a
/// matching variable is an error.
fn resolve_secret(
    slot: &mut Option<String>,
    from_env: Option<String>,
    var: &str,
) -> anyhow::Result<()> {
    if let Some(v) = from_env {
        *slot = Some(v);
        return Ok(());
    }
    if slot
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("env"))
    {
        bail!("{var} is required by the config but not set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.default_limit, DEFAULT_FETCH_LIMIT);
        assert_eq!(cfg.catalog_path, PathBuf::from("config/keywords.json"));
        assert!(cfg.price.enabled);
        assert_eq!(cfg.model_location(), ModelLocation::Embedded);
    }

    #[test]
    fn env_placeholder_requires_variable() {
        let mut cfg = PipelineConfig::from_toml_str(
            r#"
[sources.gnews]
api_key = "ENV"
"#,
        )
        .unwrap();
        assert!(cfg.apply_env_overrides(|_| None).is_err());

        let vars: HashMap<&str, &str> = [("GNEWS_API_KEY", "k-123")].into();
        cfg.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.sources.gnews.api_key.as_deref(), Some("k-123"));
    }

    #[test]
    fn sanitize_fixes_soft_values_and_rejects_zero_limit() {
        let mut cfg = PipelineConfig {
            score_workers: 0,
            ..Default::default()
        };
        cfg.price.quote = " eur ".into();
        cfg.sanitize().unwrap();
        assert_eq!(cfg.score_workers, 1);
        assert_eq!(cfg.price.quote, "EUR");

        cfg.default_limit = 0;
        assert!(cfg.sanitize().is_err());
    }
}
