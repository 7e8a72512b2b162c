//! Crypto sentiment collector: binary entrypoint.
//! One invocation = one batch for one source and one coin (or query).
//!
//! Exit codes: 0 batch stored, 2 batch built but not persisted, 1 fatal.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crypto_sentiment::config::PipelineConfig;
use crypto_sentiment::ingest::adapters::{build_http_client, AdapterRegistry};
use crypto_sentiment::ingest::catalog::load_catalog_from;
use crypto_sentiment::metrics::Metrics;
use crypto_sentiment::price::{CryptoCompareClient, DisabledPriceLookup, PriceLookup};
use crypto_sentiment::sentiment::{SentimentModel, SentimentScorer};
use crypto_sentiment::store::JsonlStore;
use crypto_sentiment::{Aggregator, Pipeline, RunOutcome, RunRequest, Target};

#[derive(Parser, Debug)]
#[command(name = "crypto-sentiment")]
#[command(about = "Fetch, score and store a sentiment batch", long_about = None)]
struct Cli {
    /// Source to fetch from: twitter, reddit, bing or gnews
    #[arg(short, long)]
    service: String,

    /// Position of the coin in the tracked-crypto catalog
    #[arg(short, long, default_value_t = 0, conflicts_with = "query")]
    coin_index: usize,

    /// Public keyword search instead of a catalog coin
    #[arg(short, long)]
    query: Option<String>,

    /// Maximum documents to request (coin mode)
    #[arg(short, long)]
    limit: Option<usize>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn run_request(&self) -> RunRequest {
        let target = match &self.query {
            Some(q) => Target::Query(q.clone()),
            None => Target::Coin(self.coin_index),
        };
        RunRequest {
            source: self.service.clone(),
            target,
            limit: self.limit,
        }
    }
}

/// Compact logs by default; `LOG_FORMAT=json` for line-delimited JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = ?e, "loading config failed");
            return ExitCode::from(1);
        }
    };

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics recorder unavailable");
            None
        }
    };

    let code = match run(&cli, &cfg).await {
        Ok(RunOutcome::Stored { inserted, summary }) => {
            tracing::info!(
                source = %summary.source,
                coin = %summary.coin.acronym,
                inserted,
                average_score = summary.average_score,
                prediction = %summary.prediction,
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::PersistFailed { summary, error }) => {
            tracing::error!(
                source = %summary.source,
                coin = %summary.coin.acronym,
                error = %error,
                "batch built but not stored"
            );
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = ?e, "run failed");
            ExitCode::from(1)
        }
    };

    if let (Some(m), Some(path)) = (&metrics, &cfg.metrics_textfile) {
        if let Err(e) = m.write_textfile(path) {
            tracing::warn!(error = ?e, path = %path.display(), "writing metrics textfile failed");
        }
    }
    code
}

async fn run(cli: &Cli, cfg: &PipelineConfig) -> anyhow::Result<RunOutcome> {
    let model =
        SentimentModel::init(&cfg.model_location()).context("initializing sentiment model")?;
    tracing::info!(
        model = model.model_version(),
        vocabulary = model.vocabulary_size(),
        "sentiment model ready"
    );
    let scorer: Arc<dyn SentimentScorer> = Arc::new(model);

    let catalog = load_catalog_from(&cfg.catalog_path)?;

    let http = build_http_client(Duration::from_secs(cfg.http_timeout_secs))
        .context("building HTTP client")?;
    let adapters = AdapterRegistry::from_config(&cfg.sources, http.clone());

    let price: Arc<dyn PriceLookup> = if cfg.price.enabled {
        Arc::new(CryptoCompareClient::new(http, &cfg.price))
    } else {
        Arc::new(DisabledPriceLookup)
    };

    let store = Arc::new(JsonlStore::new(cfg.store_path.clone()));
    let aggregator = Aggregator::new(scorer, price, cfg.score_workers);
    let pipeline = Pipeline::new(catalog, adapters, aggregator, store, cfg.fetch_limit());

    Ok(pipeline.run(&cli.run_request()).await?)
}
