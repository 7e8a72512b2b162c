use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;

/// One-time metric descriptions (so series carry help text when rendered).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_documents_fetched_total",
            "Raw documents returned by source adapters."
        );
        describe_counter!(
            "pipeline_documents_scored_total",
            "Documents scored and kept in a batch."
        );
        describe_counter!(
            "pipeline_documents_skipped_total",
            "Documents excluded from a batch after a scoring failure."
        );
        describe_counter!(
            "pipeline_fetch_errors_total",
            "Source fetches that failed (transient, malformed or partial)."
        );
        describe_counter!(
            "pipeline_price_lookup_failures_total",
            "Price lookups that degraded batchTimePrice to null."
        );
        describe_counter!(
            "pipeline_batches_stored_total",
            "Batches accepted by the persistence gateway."
        );
        describe_counter!(
            "pipeline_persist_failures_total",
            "Batches the persistence gateway rejected."
        );
        describe_histogram!("source_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!(
            "pipeline_last_average_score",
            "Average sentiment score of the most recent batch."
        );
    });
}

/// Process-wide Prometheus recorder for a single run.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition for a node-exporter textfile collector. Written to
    /// a temp file first so scrapers never read a half-written file.
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render()).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("renaming to {}", path.display()))?;
        Ok(())
    }
}
