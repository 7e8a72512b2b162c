//! # Orchestrator
//! One run: resolve the source and the target, fetch, aggregate, persist.
//! Selection errors are reported before any network call.

use metrics::counter;
use std::str::FromStr;
use std::sync::Arc;

use crate::aggregate::{AggregateError, Aggregator};
use crate::batch::{BatchSummary, SourceId, TrackedCrypto};
use crate::ingest::adapters::AdapterRegistry;
use crate::ingest::catalog::Catalog;
use crate::ingest::types::{FetchError, FetchLimit, SourceAdapter};
use crate::ingest::{self, FetchRequest};
use crate::store::{BatchStore, StoreError};

/// What to collect documents about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Position in the tracked-crypto catalog.
    Coin(usize),
    /// Free-text public search.
    Query(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Source selector as typed by the caller (case-insensitive).
    pub source: String,
    pub target: Target,
    /// Overrides the configured default limit in coin mode.
    pub limit: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown source `{0}` (expected one of TWITTER, REDDIT, BING, GNEWS)")]
    UnknownSource(String),
    #[error("coin index {index} out of range (catalog has {len} entries)")]
    CoinIndexOutOfRange { index: usize, len: usize },
    #[error("no adapter registered for {0}")]
    AdapterUnavailable(SourceId),
    #[error("invalid limit: {0}")]
    InvalidLimit(usize),
    #[error("query must not be blank")]
    EmptyQuery,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// How a run that produced a batch ended.
#[derive(Debug)]
pub enum RunOutcome {
    Stored {
        inserted: usize,
        summary: BatchSummary,
    },
    PersistFailed {
        summary: BatchSummary,
        error: StoreError,
    },
}

impl RunOutcome {
    pub fn summary(&self) -> &BatchSummary {
        match self {
            RunOutcome::Stored { summary, .. } | RunOutcome::PersistFailed { summary, .. } => {
                summary
            }
        }
    }
}

/// A run after selection, before any I/O.
struct Plan {
    adapter: Arc<dyn SourceAdapter>,
    coin: TrackedCrypto,
    request: FetchRequest,
}

pub struct Pipeline {
    catalog: Catalog,
    adapters: AdapterRegistry,
    aggregator: Aggregator,
    store: Arc<dyn BatchStore>,
    default_limit: FetchLimit,
}

impl Pipeline {
    pub fn new(
        catalog: Catalog,
        adapters: AdapterRegistry,
        aggregator: Aggregator,
        store: Arc<dyn BatchStore>,
        default_limit: FetchLimit,
    ) -> Self {
        Self {
            catalog,
            adapters,
            aggregator,
            store,
            default_limit,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn run(&self, req: &RunRequest) -> Result<RunOutcome, PipelineError> {
        let plan = self.select(req)?;
        let source = plan.adapter.source();

        let envelope = ingest::fetch(plan.adapter.as_ref(), &plan.request).await?;
        let batch = self.aggregator.aggregate(envelope, &plan.coin).await?;
        let summary = batch.summary.clone();

        match self.store.insert_batch(&batch).await {
            Ok(report) => {
                counter!("pipeline_batches_stored_total", "source" => source.as_str()).increment(1);
                tracing::info!(
                    %source,
                    coin = %plan.coin.acronym,
                    "inserted {} documents",
                    report.inserted_count
                );
                Ok(RunOutcome::Stored {
                    inserted: report.inserted_count,
                    summary,
                })
            }
            Err(error) => {
                counter!("pipeline_persist_failures_total", "source" => source.as_str())
                    .increment(1);
                tracing::error!(
                    %source,
                    coin = %plan.coin.acronym,
                    error = %error,
                    "persisting batch failed"
                );
                Ok(RunOutcome::PersistFailed { summary, error })
            }
        }
    }

    fn select(&self, req: &RunRequest) -> Result<Plan, PipelineError> {
        let source = SourceId::from_str(&req.source)
            .map_err(|_| PipelineError::UnknownSource(req.source.trim().to_string()))?;
        let adapter = self
            .adapters
            .get(source)
            .ok_or(PipelineError::AdapterUnavailable(source))?;

        match &req.target {
            Target::Coin(index) => {
                let coin = self
                    .catalog
                    .get(*index)
                    .cloned()
                    .ok_or(PipelineError::CoinIndexOutOfRange {
                        index: *index,
                        len: self.catalog.len(),
                    })?;
                let limit = match req.limit {
                    Some(n) => FetchLimit::new(n).map_err(|_| PipelineError::InvalidLimit(n))?,
                    None => self.default_limit,
                };
                Ok(Plan {
                    adapter,
                    request: FetchRequest::Coin {
                        crypto: coin.clone(),
                        limit,
                    },
                    coin,
                })
            }
            Target::Query(q) if q.trim().is_empty() => Err(PipelineError::EmptyQuery),
            Target::Query(q) => {
                let coin = self.coin_for_query(q);
                Ok(Plan {
                    adapter,
                    coin,
                    request: FetchRequest::Public { query: q.clone() },
                })
            }
        }
    }

    /// Catalog entry matching the query, else a coin named after the query.
    fn coin_for_query(&self, query: &str) -> TrackedCrypto {
        match self.catalog.resolve_query(query) {
            Some(c) => c.clone(),
            None => {
                let q = query.trim();
                TrackedCrypto::new(q, q.to_uppercase())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::DisabledPriceLookup;
    use crate::sentiment::{ModelLocation, SentimentModel};
    use crate::store::InsertReport;
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl BatchStore for NullStore {
        async fn insert_batch(
            &self,
            batch: &crate::batch::Batch,
        ) -> Result<InsertReport, StoreError> {
            Ok(InsertReport {
                inserted_count: batch.results.len(),
            })
        }
    }

    fn pipeline() -> Pipeline {
        let catalog = Catalog::new(vec![
            TrackedCrypto::new("Bitcoin", "BTC"),
            TrackedCrypto::new("Ethereum", "ETH"),
        ])
        .unwrap();
        let scorer = Arc::new(SentimentModel::init(&ModelLocation::Embedded).unwrap());
        Pipeline::new(
            catalog,
            AdapterRegistry::new(),
            Aggregator::new(scorer, Arc::new(DisabledPriceLookup), 1),
            Arc::new(NullStore),
            FetchLimit::default(),
        )
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let req = RunRequest {
            source: "myspace".into(),
            target: Target::Coin(0),
            limit: None,
        };
        assert!(matches!(
            pipeline().select(&req),
            Err(PipelineError::UnknownSource(s)) if s == "myspace"
        ));
    }

    #[test]
    fn missing_adapter_is_reported() {
        let req = RunRequest {
            source: "bing".into(),
            target: Target::Coin(0),
            limit: None,
        };
        assert!(matches!(
            pipeline().select(&req),
            Err(PipelineError::AdapterUnavailable(SourceId::Bing))
        ));
    }

    #[test]
    fn query_falls_back_to_synthesized_coin() {
        let p = pipeline();
        assert_eq!(p.coin_for_query("eth").acronym, "ETH");
        assert_eq!(p.coin_for_query("bitcoin").name, "Bitcoin");
        let c = p.coin_for_query(" dogwifhat ");
        assert_eq!(c, TrackedCrypto::new("dogwifhat", "DOGWIFHAT"));
    }
}
