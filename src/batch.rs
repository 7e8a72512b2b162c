//! Shapes produced by the aggregator and handed to persistence.
//!
//! Field names serialize in camelCase (`averageScore`, `rawSource`, ...) and enum
//! values in upper case (`TWITTER`, `NEUTRAL`, `VIRGIN`) so stored documents keep
//! the layout downstream consumers already read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sentiment::Analysis;

/// Opaque per-source metadata carried through the pipeline untouched.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Averages strictly below this are NEGATIVE.
pub const NEGATIVE_BELOW: f64 = 0.25;
/// Averages at or above this are POSITIVE.
pub const POSITIVE_FROM: f64 = 0.75;

/// Closed set of external providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceId {
    Twitter,
    Reddit,
    Bing,
    Gnews,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::Twitter,
        SourceId::Reddit,
        SourceId::Bing,
        SourceId::Gnews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Twitter => "TWITTER",
            SourceId::Reddit => "REDDIT",
            SourceId::Bing => "BING",
            SourceId::Gnews => "GNEWS",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source `{0}` (expected one of TWITTER, REDDIT, BING, GNEWS)")]
pub struct UnknownSourceId(pub String);

impl FromStr for SourceId {
    type Err = UnknownSourceId;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSourceId(s.to_string()))
    }
}

/// One catalog entry: a coin by display name and ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCrypto {
    pub name: String,
    pub acronym: String,
}

impl TrackedCrypto {
    pub fn new(name: impl Into<String>, acronym: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acronym: acronym.into(),
        }
    }
}

impl fmt::Display for TrackedCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.acronym)
    }
}

/// Batch-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Negative,
    Neutral,
    Positive,
}

impl Prediction {
    /// Pure threshold mapping; both lower bounds are inclusive.
    pub fn classify(score: f64) -> Self {
        if score < NEGATIVE_BELOW {
            Prediction::Negative
        } else if score < POSITIVE_FROM {
            Prediction::Neutral
        } else {
            Prediction::Positive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Negative => "NEGATIVE",
            Prediction::Neutral => "NEUTRAL",
            Prediction::Positive => "POSITIVE",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle tag. Later states belong to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchState {
    Virgin,
}

/// A single scored document together with the batch context it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedDocument {
    pub source: SourceId,
    pub coin: TrackedCrypto,
    /// Fetch-level metadata (query, paging info).
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Source-specific document metadata (author, timestamps, engagement).
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub document: Meta,
    pub raw_source: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub source: SourceId,
    pub coin: TrackedCrypto,
    pub average_score: f64,
    pub prediction: Prediction,
    /// `None` when the price lookup failed; serialized as `null`.
    pub batch_time_price: Option<f64>,
    /// RFC 3339 / ISO-8601, UTC, taken when the summary was assembled.
    pub timestamp: String,
    pub analyzed_count: usize,
    pub skipped_count: usize,
}

/// Unit handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub summary: BatchSummary,
    pub source: SourceId,
    pub coin: TrackedCrypto,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    pub results: Vec<AnalyzedDocument>,
    pub state: BatchState,
}
