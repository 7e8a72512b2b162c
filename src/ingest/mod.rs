// src/ingest/mod.rs
pub mod adapters;
pub mod catalog;
pub mod types;

use crate::batch::TrackedCrypto;
use crate::ingest::types::{FetchEnvelope, FetchError, FetchLimit, SourceAdapter};
use metrics::{counter, histogram};

/// Longest document text kept after normalization (chars).
pub const MAX_TEXT_CHARS: usize = 1500;

/// Normalize text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP left over from entity decoding)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

/// Join a headline and a body the way news items are scored: "title. body".
pub fn headline_text(title: Option<&str>, body: Option<&str>) -> String {
    let title = normalize_text(title.unwrap_or_default());
    let body = normalize_text(body.unwrap_or_default());
    match (title.is_empty(), body.is_empty()) {
        (true, true) => String::new(),
        (false, true) => title,
        (true, false) => body,
        (false, false) => {
            let sep = if title.ends_with(['.', '!', '?']) {
                " "
            } else {
                ". "
            };
            format!("{title}{sep}{body}")
        }
    }
}

/// What the orchestrator asks a source for.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Coin {
        crypto: TrackedCrypto,
        limit: FetchLimit,
    },
    Public {
        query: String,
    },
}

/// Run one fetch through the adapter capability, with timing and telemetry.
pub async fn fetch(
    adapter: &dyn SourceAdapter,
    request: &FetchRequest,
) -> Result<FetchEnvelope, FetchError> {
    let source = adapter.source();
    let t0 = std::time::Instant::now();

    let res = match request {
        FetchRequest::Coin { crypto, limit } => {
            tracing::info!(%source, coin = %crypto, limit = limit.get(), "fetching documents");
            adapter.fetch(crypto, *limit).await
        }
        FetchRequest::Public { query } => {
            tracing::info!(%source, query = %query, "fetching public documents");
            adapter.fetch_public(query).await
        }
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("source_fetch_ms", "source" => source.as_str()).record(ms);

    match &res {
        Ok(env) => {
            counter!("pipeline_documents_fetched_total", "source" => source.as_str())
                .increment(env.results.len() as u64);
            tracing::info!(%source, count = env.results.len(), elapsed_ms = ms, "fetch finished");
        }
        Err(e) => {
            counter!("pipeline_fetch_errors_total", "source" => source.as_str()).increment(1);
            tracing::warn!(%source, error = %e, transient = e.is_transient(), "fetch failed");
        }
    }
    res
}
