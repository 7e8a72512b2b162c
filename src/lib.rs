// src/lib.rs
// Library surface shared by the binary and integration tests.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod price;
pub mod sentiment;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{AggregateError, Aggregator};
pub use crate::batch::{Batch, BatchSummary, Prediction, SourceId, TrackedCrypto};
pub use crate::pipeline::{Pipeline, PipelineError, RunOutcome, RunRequest, Target};
