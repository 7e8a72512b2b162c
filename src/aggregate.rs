//! # Aggregator
//! Turns a fetch envelope into a `Batch`: score every document, average the
//! analyzable ones, classify the average, attach a point-in-time price.
//!
//! Policy:
//! - a document that fails scoring is skipped and counted, never fatal;
//! - zero analyzable documents fails the batch (no NaN averages);
//! - a failed price lookup degrades `batchTimePrice` to `null`.

use chrono::{SecondsFormat, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;

use crate::batch::{
    AnalyzedDocument, Batch, BatchState, BatchSummary, Prediction, SourceId, TrackedCrypto,
};
use crate::ingest::types::{FetchEnvelope, RawDocument};
use crate::price::PriceLookup;
use crate::sentiment::{Analysis, ScoreError, SentimentScorer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("{source_id}: empty batch ({fetched} fetched, {skipped} skipped)")]
    EmptyAnalyzableSet {
        source_id: SourceId,
        fetched: usize,
        skipped: usize,
    },
}

pub struct Aggregator {
    scorer: Arc<dyn SentimentScorer>,
    price: Arc<dyn PriceLookup>,
    score_workers: usize,
}

impl Aggregator {
    /// `score_workers <= 1` scores inline on the calling task.
    pub fn new(
        scorer: Arc<dyn SentimentScorer>,
        price: Arc<dyn PriceLookup>,
        score_workers: usize,
    ) -> Self {
        Self {
            scorer,
            price,
            score_workers: score_workers.max(1),
        }
    }

    pub async fn aggregate(
        &self,
        envelope: FetchEnvelope,
        coin: &TrackedCrypto,
    ) -> Result<Batch, AggregateError> {
        let FetchEnvelope {
            source,
            results,
            meta,
        } = envelope;
        let fetched = results.len();

        let texts: Vec<String> = results.iter().map(|d| d.text.clone()).collect();
        let outcomes = self.score_all(texts).await;

        let mut analyzed = Vec::with_capacity(fetched);
        let mut skipped = 0usize;
        for (idx, (doc, outcome)) in results.into_iter().zip(outcomes).enumerate() {
            match outcome.and_then(in_unit_range) {
                Ok(analysis) => {
                    analyzed.push(analyzed_document(source, coin, &meta, doc, analysis));
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(%source, index = idx, error = %e, "document skipped");
                }
            }
        }

        counter!("pipeline_documents_scored_total", "source" => source.as_str())
            .increment(analyzed.len() as u64);
        counter!("pipeline_documents_skipped_total", "source" => source.as_str())
            .increment(skipped as u64);

        let average_score = average_score(&analyzed).ok_or(AggregateError::EmptyAnalyzableSet {
            source_id: source,
            fetched,
            skipped,
        })?;
        let prediction = Prediction::classify(average_score);
        gauge!("pipeline_last_average_score").set(average_score);

        let batch_time_price = self.lookup_price(coin).await;

        tracing::info!(
            %source,
            coin = %coin.acronym,
            analyzed = analyzed.len(),
            skipped,
            average_score,
            %prediction,
            price = ?batch_time_price,
            "batch aggregated"
        );

        let summary = BatchSummary {
            source,
            coin: coin.clone(),
            average_score,
            prediction,
            batch_time_price,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            analyzed_count: analyzed.len(),
            skipped_count: skipped,
        };

        Ok(Batch {
            summary,
            source,
            coin: coin.clone(),
            meta,
            results: analyzed,
            state: BatchState::Virgin,
        })
    }

    /// One outcome per input text, in input order.
    async fn score_all(&self, texts: Vec<String>) -> Vec<Result<Analysis, ScoreError>> {
        if self.score_workers <= 1 || texts.len() < 2 {
            return texts.iter().map(|t| self.scorer.score(t)).collect();
        }

        let chunk_size = texts.len().div_ceil(self.score_workers);
        let mut handles = Vec::with_capacity(self.score_workers);
        let mut chunk_lens = Vec::with_capacity(self.score_workers);
        for chunk in texts.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            chunk_lens.push(chunk.len());
            let scorer = Arc::clone(&self.scorer);
            handles.push(tokio::task::spawn_blocking(move || {
                chunk.iter().map(|t| scorer.score(t)).collect::<Vec<_>>()
            }));
        }

        // Join in spawn order so outcomes line up with the input.
        let mut out = Vec::with_capacity(texts.len());
        for (handle, len) in handles.into_iter().zip(chunk_lens) {
            match handle.await {
                Ok(part) => out.extend(part),
                Err(e) => {
                    tracing::error!(error = %e, "scoring worker failed");
                    out.extend((0..len).map(|_| Err(ScoreError::Worker(e.to_string()))));
                }
            }
        }
        out
    }

    async fn lookup_price(&self, coin: &TrackedCrypto) -> Option<f64> {
        match self.price.get_price(&coin.acronym).await {
            Ok(p) if p.is_finite() => Some(p),
            Ok(p) => {
                tracing::warn!(coin = %coin.acronym, price = p, "non-finite price ignored");
                counter!("pipeline_price_lookup_failures_total").increment(1);
                None
            }
            Err(e) => {
                tracing::warn!(coin = %coin.acronym, error = %e, "price lookup failed");
                counter!("pipeline_price_lookup_failures_total").increment(1);
                None
            }
        }
    }
}

/// Scorers are pluggable; only finite scores in `[0, 1]` reach the mean.
fn in_unit_range(analysis: Analysis) -> Result<Analysis, ScoreError> {
    if !analysis.score.is_finite() {
        return Err(ScoreError::NonFinite);
    }
    if !(0.0..=1.0).contains(&analysis.score) {
        return Err(ScoreError::OutOfRange(analysis.score));
    }
    Ok(analysis)
}

fn analyzed_document(
    source: SourceId,
    coin: &TrackedCrypto,
    batch_meta: &crate::batch::Meta,
    doc: RawDocument,
    analysis: Analysis,
) -> AnalyzedDocument {
    AnalyzedDocument {
        source,
        coin: coin.clone(),
        meta: batch_meta.clone(),
        document: doc.meta,
        raw_source: doc.text,
        analysis,
    }
}

/// Arithmetic mean of the document scores; `None` for an empty set.
pub fn average_score(docs: &[AnalyzedDocument]) -> Option<f64> {
    if docs.is_empty() {
        return None;
    }
    let sum: f64 = docs.iter().map(|d| f64::from(d.analysis.score)).sum();
    Some(sum / docs.len() as f64)
}
