// tests/pipeline_run.rs
//
// End-to-end runs through `Pipeline` with in-memory adapters and stores.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crypto_sentiment::batch::{Batch, SourceId, TrackedCrypto};
use crypto_sentiment::ingest::adapters::AdapterRegistry;
use crypto_sentiment::ingest::catalog::Catalog;
use crypto_sentiment::ingest::types::{
    FetchEnvelope, FetchError, FetchLimit, RawDocument, SourceAdapter,
};
use crypto_sentiment::price::DisabledPriceLookup;
use crypto_sentiment::sentiment::{ModelLocation, SentimentModel};
use crypto_sentiment::store::{BatchStore, InsertReport, StoreError};
use crypto_sentiment::{
    AggregateError, Aggregator, Pipeline, PipelineError, Prediction, RunOutcome, RunRequest,
    Target,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Coin(TrackedCrypto, usize),
    Public(String),
}

/// Records every call; answers with canned texts or a canned error.
struct FakeAdapter {
    id: SourceId,
    texts: Vec<&'static str>,
    fail: Option<FetchError>,
    calls: Mutex<Vec<Call>>,
}

impl FakeAdapter {
    fn new(id: SourceId, texts: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            id,
            texts,
            fail: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(id: SourceId, err: FetchError) -> Arc<Self> {
        Arc::new(Self {
            id,
            texts: Vec::new(),
            fail: Some(err),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn answer(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        let mut env = FetchEnvelope::new(self.id, query);
        env.results = self.texts.iter().map(|t| RawDocument::new(*t)).collect();
        Ok(env)
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn source(&self) -> SourceId {
        self.id
    }

    async fn fetch(
        &self,
        crypto: &TrackedCrypto,
        limit: FetchLimit,
    ) -> Result<FetchEnvelope, FetchError> {
        self.calls
            .lock()
            .push(Call::Coin(crypto.clone(), limit.get()));
        self.answer(&crypto.acronym)
    }

    async fn fetch_public(&self, query: &str) -> Result<FetchEnvelope, FetchError> {
        self.calls.lock().push(Call::Public(query.to_string()));
        self.answer(query)
    }
}

#[derive(Default)]
struct MemoryStore {
    batches: Mutex<Vec<Batch>>,
    reject: bool,
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn insert_batch(&self, batch: &Batch) -> Result<InsertReport, StoreError> {
        if self.reject {
            return Err(StoreError::Rejected("write concern failed".into()));
        }
        self.batches.lock().push(batch.clone());
        Ok(InsertReport {
            inserted_count: batch.results.len(),
        })
    }
}

fn catalog() -> Catalog {
    Catalog::new(vec![
        TrackedCrypto::new("Bitcoin", "BTC"),
        TrackedCrypto::new("Ethereum", "ETH"),
        TrackedCrypto::new("Solana", "SOL"),
    ])
    .unwrap()
}

fn pipeline(adapter: Arc<FakeAdapter>, store: Arc<MemoryStore>) -> Pipeline {
    let scorer = Arc::new(SentimentModel::init(&ModelLocation::Embedded).unwrap());
    Pipeline::new(
        catalog(),
        AdapterRegistry::new().with(adapter),
        Aggregator::new(scorer, Arc::new(DisabledPriceLookup), 1),
        store,
        FetchLimit::new(25).unwrap(),
    )
}

fn coin_request(source: &str, index: usize) -> RunRequest {
    RunRequest {
        source: source.into(),
        target: Target::Coin(index),
        limit: None,
    }
}

#[tokio::test]
async fn coin_run_stores_batch_for_selected_coin() {
    let adapter = FakeAdapter::new(
        SourceId::Reddit,
        vec!["ETH rally, bullish breakout", "ETH gains keep coming", "quiet day"],
    );
    let store = Arc::new(MemoryStore::default());
    let p = pipeline(adapter.clone(), store.clone());

    let out = p.run(&coin_request("reddit", 1)).await.unwrap();
    let RunOutcome::Stored { inserted, summary } = out else {
        panic!("expected a stored batch");
    };

    assert_eq!(inserted, 3);
    assert_eq!(summary.source, SourceId::Reddit);
    assert_eq!(summary.coin, TrackedCrypto::new("Ethereum", "ETH"));
    assert_eq!(summary.batch_time_price, None);
    assert_eq!(
        summary.prediction,
        Prediction::classify(summary.average_score)
    );

    assert_eq!(
        *adapter.calls.lock(),
        vec![Call::Coin(TrackedCrypto::new("Ethereum", "ETH"), 25)]
    );
    let stored = store.batches.lock();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].summary, summary);
}

#[tokio::test]
async fn explicit_limit_overrides_default() {
    let adapter = FakeAdapter::new(SourceId::Bing, vec!["bitcoin news"]);
    let p = pipeline(adapter.clone(), Arc::new(MemoryStore::default()));

    let mut req = coin_request("BING", 0);
    req.limit = Some(5);
    p.run(&req).await.unwrap();
    assert_eq!(
        *adapter.calls.lock(),
        vec![Call::Coin(TrackedCrypto::new("Bitcoin", "BTC"), 5)]
    );
}

#[tokio::test]
async fn unknown_source_fails_before_any_fetch() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["x"]);
    let p = pipeline(adapter.clone(), Arc::new(MemoryStore::default()));

    let err = p.run(&coin_request("myspace", 0)).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownSource(ref s) if s == "myspace"));
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn out_of_range_coin_index_fails_before_any_fetch() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["x"]);
    let p = pipeline(adapter.clone(), Arc::new(MemoryStore::default()));

    let err = p.run(&coin_request("twitter", 3)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::CoinIndexOutOfRange { index: 3, len: 3 }
    ));
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn zero_limit_is_rejected_before_any_fetch() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["x"]);
    let p = pipeline(adapter.clone(), Arc::new(MemoryStore::default()));

    let mut req = coin_request("twitter", 0);
    req.limit = Some(0);
    let err = p.run(&req).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidLimit(0)));
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn fetch_error_aborts_without_persisting() {
    let adapter = FakeAdapter::failing(
        SourceId::Gnews,
        FetchError::Unauthorized {
            provider: SourceId::Gnews,
            reason: "GNEWS_API_KEY is not configured".into(),
        },
    );
    let store = Arc::new(MemoryStore::default());
    let p = pipeline(adapter.clone(), store.clone());

    let err = p.run(&coin_request("gnews", 0)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(FetchError::Unauthorized { .. })));
    assert_eq!(adapter.call_count(), 1);
    assert!(store.batches.lock().is_empty());
}

#[tokio::test]
async fn empty_fetch_is_an_aggregate_error() {
    let adapter = FakeAdapter::new(SourceId::Reddit, vec![]);
    let store = Arc::new(MemoryStore::default());
    let p = pipeline(adapter, store.clone());

    let err = p.run(&coin_request("reddit", 0)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Aggregate(AggregateError::EmptyAnalyzableSet { fetched: 0, .. })
    ));
    assert!(store.batches.lock().is_empty());
}

#[tokio::test]
async fn persistence_failure_is_reported_not_raised() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["BTC scam, rug pull, crash"]);
    let store = Arc::new(MemoryStore {
        reject: true,
        ..Default::default()
    });
    let p = pipeline(adapter, store);

    let out = p.run(&coin_request("twitter", 0)).await.unwrap();
    match out {
        RunOutcome::PersistFailed { summary, error } => {
            assert_eq!(summary.coin.acronym, "BTC");
            assert_eq!(summary.prediction, Prediction::Negative);
            assert!(matches!(error, StoreError::Rejected(_)));
        }
        other => panic!("expected PersistFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn query_mode_uses_public_fetch_and_resolves_catalog_coin() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["sol looking strong"]);
    let p = pipeline(adapter.clone(), Arc::new(MemoryStore::default()));

    let req = RunRequest {
        source: "Twitter".into(),
        target: Target::Query("sol".into()),
        limit: None,
    };
    let out = p.run(&req).await.unwrap();

    assert_eq!(*adapter.calls.lock(), vec![Call::Public("sol".into())]);
    assert_eq!(out.summary().coin, TrackedCrypto::new("Solana", "SOL"));
}

#[tokio::test]
async fn query_without_catalog_match_names_the_coin_after_the_query() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["pepe pumping"]);
    let p = pipeline(adapter, Arc::new(MemoryStore::default()));

    let req = RunRequest {
        source: "twitter".into(),
        target: Target::Query("pepe".into()),
        limit: None,
    };
    let out = p.run(&req).await.unwrap();
    assert_eq!(out.summary().coin, TrackedCrypto::new("pepe", "PEPE"));
}

#[tokio::test]
async fn blank_query_fails_before_any_fetch() {
    let adapter = FakeAdapter::new(SourceId::Twitter, vec!["x"]);
    let store = Arc::new(MemoryStore::default());
    let p = pipeline(adapter.clone(), store.clone());

    for q in ["", "   ", "\t\n"] {
        let req = RunRequest {
            source: "twitter".into(),
            target: Target::Query(q.into()),
            limit: None,
        };
        let err = p.run(&req).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyQuery), "query {q:?}");
    }
    assert_eq!(adapter.call_count(), 0);
    assert!(store.batches.lock().is_empty());
}
