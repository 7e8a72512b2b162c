// src/ingest/catalog.rs
//! Ordered, read-only list of tracked coins. Position in the file is the
//! coin-index used on the command line.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::batch::TrackedCrypto;

/// Minimum Jaro-Winkler similarity for a query to match a coin name.
const NAME_MATCH_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    coins: Vec<TrackedCrypto>,
}

impl Catalog {
    pub fn new(coins: Vec<TrackedCrypto>) -> Result<Self> {
        let coins = clean_list(coins)?;
        if coins.is_empty() {
            return Err(anyhow!("tracked-crypto catalog is empty"));
        }
        Ok(Self { coins })
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackedCrypto> {
        self.coins.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedCrypto> {
        self.coins.iter()
    }

    /// Best catalog entry for a free-text query: exact acronym first, then the
    /// closest name above the similarity threshold.
    pub fn resolve_query(&self, query: &str) -> Option<&TrackedCrypto> {
        let q = query.trim().trim_start_matches('$');
        if q.is_empty() {
            return None;
        }
        if let Some(hit) = self
            .coins
            .iter()
            .find(|c| c.acronym.eq_ignore_ascii_case(q))
        {
            return Some(hit);
        }

        let q = q.to_lowercase();
        self.coins
            .iter()
            .map(|c| (c, strsim::jaro_winkler(&q, &c.name.to_lowercase())))
            .filter(|(_, sim)| *sim >= NAME_MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }
}

/// Load the catalog from a path. Supports a JSON array or TOML `coins = [...]`.
pub fn load_catalog_from(path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading tracked-crypto catalog from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let coins = parse_catalog(&content, ext.as_str())
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    Catalog::new(coins)
}

fn parse_catalog(s: &str, hint_ext: &str) -> Result<Vec<TrackedCrypto>> {
    if hint_ext == "toml" {
        return parse_toml(s);
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    parse_toml(s).map_err(|_| anyhow!("unsupported catalog format"))
}

fn parse_toml(s: &str) -> Result<Vec<TrackedCrypto>> {
    #[derive(serde::Deserialize)]
    struct TomlCatalog {
        coins: Vec<TrackedCrypto>,
    }
    let v: TomlCatalog = toml::from_str(s)?;
    Ok(v.coins)
}

fn parse_json(s: &str) -> Result<Vec<TrackedCrypto>> {
    Ok(serde_json::from_str(s)?)
}

/// Trim fields; every entry needs both a name and an acronym. Order is kept
/// (duplicates too) because indices are positional.
fn clean_list(items: Vec<TrackedCrypto>) -> Result<Vec<TrackedCrypto>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let name = c.name.trim();
            let acronym = c.acronym.trim();
            if name.is_empty() || acronym.is_empty() {
                return Err(anyhow!("catalog entry #{i} needs a name and an acronym"));
            }
            Ok(TrackedCrypto::new(name, acronym))
        })
        .collect()
}
