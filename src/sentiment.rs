//! Pretrained lexicon model: loaded once, then scores text into `[0, 1]`.
//!
//! The artifact is a JSON document holding a weighted vocabulary plus the
//! logistic parameters used to squash the summed weights:
//!
//! `score = sigmoid(bias + scale * Σ weight(token))`
//!
//! A negator within the previous `negation_window` tokens flips the sign of a
//! word's weight. Empty (or token-less) text is exactly neutral, 0.5.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::Prediction;

/// Compiled-in default artifact.
const EMBEDDED_MODEL: &str = include_str!("../sentiment_model.json");

/// Score assigned to text the model cannot say anything about.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Per-document model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Analysis {
    pub fn neutral() -> Self {
        Self::from_score(NEUTRAL_SCORE)
    }

    fn from_score(score: f32) -> Self {
        Self {
            score,
            label: Some(Prediction::classify(f64::from(score)).to_string()),
        }
    }
}

/// Scoring capability. Implementations must be deterministic and free of
/// interior mutability so one instance can be shared across workers.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<Analysis, ScoreError>;

    /// Identifier for logs.
    fn model_version(&self) -> &str {
        "unknown"
    }
}

/// Recoverable, per-document failure. The document is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("input has {len} chars, model accepts at most {max}")]
    InputTooLong { len: usize, max: usize },
    #[error("model produced a non-finite score")]
    NonFinite,
    #[error("score {0} is outside [0, 1]")]
    OutOfRange(f32),
    #[error("scoring worker failed: {0}")]
    Worker(String),
}

/// Fatal: the run cannot score anything without a model.
#[derive(Debug, thiserror::Error)]
pub enum ScorerInitError {
    #[error("model artifact not found at {}", .0.display())]
    Missing(PathBuf),
    #[error("reading model artifact {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact is not valid JSON: {0}")]
    Parse(String),
    #[error("model artifact checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("model artifact is invalid: {0}")]
    Invalid(String),
}

/// Where to load the model from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    Embedded,
    Path {
        path: PathBuf,
        /// Expected lower-case hex SHA-256 of the file, if pinned.
        sha256: Option<String>,
    },
}

fn default_max_len() -> usize {
    100
}
fn default_max_input_chars() -> usize {
    4_000
}
fn default_negation_window() -> usize {
    3
}
fn default_scale() -> f32 {
    1.0
}

/// On-disk artifact layout.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    #[serde(default)]
    version: Option<String>,
    #[serde(default = "default_max_len")]
    max_len: usize,
    #[serde(default = "default_max_input_chars")]
    max_input_chars: usize,
    #[serde(default = "default_negation_window")]
    negation_window: usize,
    #[serde(default)]
    bias: f32,
    #[serde(default = "default_scale")]
    scale: f32,
    vocabulary: HashMap<String, f32>,
}

#[derive(Debug, Clone)]
pub struct SentimentModel {
    version: String,
    vocabulary: HashMap<String, f32>,
    bias: f32,
    scale: f32,
    max_len: usize,
    max_input_chars: usize,
    negation_window: usize,
}

impl SentimentModel {
    /// Load and validate the artifact. Call once per process and share the
    /// result (`Arc<dyn SentimentScorer>`).
    pub fn init(location: &ModelLocation) -> Result<Self, ScorerInitError> {
        match location {
            ModelLocation::Embedded => Self::from_json(EMBEDDED_MODEL),
            ModelLocation::Path { path, sha256 } => {
                let bytes = read_artifact(path)?;
                if let Some(expected) = sha256 {
                    verify_sha256(&bytes, expected)?;
                }
                let raw = std::str::from_utf8(&bytes)
                    .map_err(|e| ScorerInitError::Parse(e.to_string()))?;
                Self::from_json(raw)
            }
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ScorerInitError> {
        let art: ModelArtifact =
            serde_json::from_str(raw).map_err(|e| ScorerInitError::Parse(e.to_string()))?;

        if art.vocabulary.is_empty() {
            return Err(ScorerInitError::Invalid("empty vocabulary".into()));
        }
        if let Some((word, _)) = art.vocabulary.iter().find(|(_, w)| !w.is_finite()) {
            return Err(ScorerInitError::Invalid(format!(
                "non-finite weight for `{word}`"
            )));
        }
        if !art.bias.is_finite() || !art.scale.is_finite() || art.scale <= 0.0 {
            return Err(ScorerInitError::Invalid("bias/scale out of range".into()));
        }
        if art.max_len == 0 || art.max_input_chars == 0 {
            return Err(ScorerInitError::Invalid(
                "max_len and max_input_chars must be >= 1".into(),
            ));
        }

        // Lower-case keys so lookups match the tokenizer.
        let vocabulary = art
            .vocabulary
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        Ok(Self {
            version: art.version.unwrap_or_else(|| "unversioned".into()),
            vocabulary,
            bias: art.bias,
            scale: art.scale,
            max_len: art.max_len,
            max_input_chars: art.max_input_chars,
            negation_window: art.negation_window,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    #[inline]
    fn word_weight(&self, w: &str) -> f32 {
        self.vocabulary.get(w).copied().unwrap_or(0.0)
    }

    /// Summed (negation-adjusted) weight over at most `max_len` tokens.
    fn raw_sum(&self, tokens: &[String]) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..tokens.len() {
            let base = self.word_weight(&tokens[i]);
            if base == 0.0 {
                continue;
            }
            let negated =
                (1..=self.negation_window).any(|k| i >= k && is_negator(&tokens[i - k]));
            sum += if negated { -base } else { base };
        }
        sum
    }
}

impl SentimentScorer for SentimentModel {
    fn score(&self, text: &str) -> Result<Analysis, ScoreError> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(ScoreError::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }

        let tokens: Vec<String> = tokenize(text).take(self.max_len).collect();
        if tokens.is_empty() {
            return Ok(Analysis::neutral());
        }

        let score = sigmoid(self.bias + self.scale * self.raw_sum(&tokens));
        if !score.is_finite() {
            return Err(ScoreError::NonFinite);
        }
        Ok(Analysis::from_score(score))
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ScorerInitError> {
    fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScorerInitError::Missing(path.to_path_buf())
        } else {
            ScorerInitError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

fn verify_sha256(bytes: &[u8], expected: &str) -> Result<(), ScorerInitError> {
    let actual = format!("{:x}", Sha256::digest(bytes));
    let expected = expected.trim().to_ascii_lowercase();
    if actual != expected {
        return Err(ScorerInitError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Lower-case tokens; apostrophes stay inside words ("isn't"), cashtags lose
/// their `$` ("$btc" -> "btc").
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '\u{2019}'))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('\u{2019}', "'").to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "without"
    )
}
