//! Fixed-parallelism, single-process execution of a prepared source.

use crate::context::EnumeratorContext;
use crate::enumerator::SplitEnumerator;
use crate::reader::{ReaderStats, SplitBatch};
use crate::source::PreparedSource;
use crate::state::EnumeratorState;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tundra_common::{Error, Result};

const BATCH_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SourceOutput {
    pub batches: Vec<SplitBatch>,
    /// Per subtask, ordered by subtask id.
    pub stats: Vec<ReaderStats>,
    /// Enumerator state at the end of the run.
    pub final_state: EnumeratorState,
}

impl SourceOutput {
    pub fn row_count(&self) -> u64 {
        self.stats.iter().map(|s| s.rows_read).sum()
    }
}

/// Runs `parallelism` reader subtasks against one shared enumerator.
pub struct ParallelSource {
    prepared: Arc<PreparedSource>,
}

impl ParallelSource {
    pub fn new(prepared: Arc<PreparedSource>) -> Self {
        Self { prepared }
    }

    /// Reads the whole source, optionally resuming from a checkpoint.
    pub async fn run(&self, restore_from: Option<EnumeratorState>) -> Result<SourceOutput> {
        let enumerator = match restore_from {
            Some(state) => self.prepared.restore_enumerator(state)?,
            None => self.prepared.create_enumerator(),
        };
        let enumerator = Arc::new(enumerator);
        enumerator.start().await?;

        let parallelism = self.prepared.parallelism();
        let (tx, mut rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let mut tasks = Vec::with_capacity(parallelism);
        for subtask_id in 0..parallelism {
            let (context, inbox) = EnumeratorContext::new(parallelism, subtask_id);
            let reader = self.prepared.create_reader(subtask_id, inbox);
            let enumerator = enumerator.clone();
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                enumerator.add_reader(Arc::new(context)).await?;
                reader.run(&enumerator, tx).await
            }));
        }
        drop(tx);

        let mut batches = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch);
        }

        let mut stats = Vec::with_capacity(parallelism);
        let mut first_error = None;
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(s)) => stats.push(s),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(Error::protocol(format!("reader task failed: {e}")));
                }
            }
        }

        let final_state = enumerator.snapshot_state().await?;
        enumerator.close().await;
        if let Some(e) = first_error {
            return Err(e);
        }

        stats.sort_by_key(|s| s.subtask_id);
        let output = SourceOutput { batches, stats, final_state };
        tracing::info!(
            table = self.prepared.table().name(),
            subtasks = parallelism,
            rows = output.row_count(),
            "source run complete"
        );
        Ok(output)
    }
}
