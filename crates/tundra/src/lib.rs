//! Runs a bounded source over a directory of typed CSV files.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tundra_connector::TableClient;
use tundra_connector_filesystem::CsvTableClient;
use tundra_source::{BoundedSource, ParallelSource, SourceOutput, SourceSettings};

/// Installs the global `tracing` subscriber, honouring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// What a finished run read, per subtask.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub table: String,
    pub splits: usize,
    pub rows: u64,
    pub per_subtask: Vec<(usize, usize, u64)>,
}

impl RunSummary {
    fn from_output(table: &str, output: &SourceOutput) -> Self {
        Self {
            table: table.to_string(),
            splits: output.final_state.splits.len(),
            rows: output.row_count(),
            per_subtask: output.stats.iter().map(|s| (s.subtask_id, s.splits_read.len(), s.rows_read)).collect(),
        }
    }
}

/// Reads `settings.table` from the CSV directory named by `settings.master`.
pub async fn run(settings: SourceSettings) -> anyhow::Result<RunSummary> {
    let client: Arc<dyn TableClient> = Arc::new(CsvTableClient::new(&settings.master));
    let table = settings.table.clone();
    let prepared = BoundedSource::new(settings, client)
        .prepare()
        .await
        .with_context(|| format!("failed to prepare source for table `{table}`"))?;
    tracing::info!(table = %table, fields = ?prepared.produced_type().field_names(), "reading table");

    let output = ParallelSource::new(Arc::new(prepared))
        .run(None)
        .await
        .with_context(|| format!("failed to read table `{table}`"))?;
    Ok(RunSummary::from_output(&table, &output))
}
