//! The consuming side of one subtask: receives splits and turns them into row batches.

use crate::context::{ReaderEvent, ReaderInbox, SubtaskId};
use crate::enumerator::SplitEnumerator;
use futures::TryStreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tundra_common::{Error, Result, Row, Split};
use tundra_connector::{ScanRequest, TableClient, TableHandle};

/// Rows of one split, read by one subtask.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitBatch {
    pub subtask_id: SubtaskId,
    pub split_id: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub subtask_id: SubtaskId,
    pub splits_read: Vec<String>,
    pub rows_read: u64,
}

pub struct SourceReader {
    subtask_id: SubtaskId,
    client: Arc<dyn TableClient>,
    table: TableHandle,
    projection: Vec<String>,
    inbox: ReaderInbox,
    pending: VecDeque<Split>,
    no_more_splits: bool,
    stats: ReaderStats,
}

impl SourceReader {
    pub fn new(
        subtask_id: SubtaskId,
        client: Arc<dyn TableClient>,
        table: TableHandle,
        projection: Vec<String>,
        inbox: ReaderInbox,
    ) -> Self {
        Self {
            subtask_id,
            client,
            table,
            projection,
            inbox,
            pending: VecDeque::new(),
            no_more_splits: false,
            stats: ReaderStats { subtask_id, ..Default::default() },
        }
    }

    pub fn subtask_id(&self) -> SubtaskId {
        self.subtask_id
    }

    pub fn add_splits(&mut self, splits: Vec<Split>) {
        tracing::debug!(subtask = self.subtask_id, count = splits.len(), "splits received");
        self.pending.extend(splits);
    }

    pub fn handle_no_more_splits(&mut self) {
        tracing::debug!(subtask = self.subtask_id, "no more splits");
        self.no_more_splits = true;
    }

    fn on_event(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::AddSplits(splits) => self.add_splits(splits),
            ReaderEvent::NoMoreSplits => self.handle_no_more_splits(),
        }
    }

    async fn read_split(&self, split: &Split) -> Result<Vec<Row>> {
        let request = ScanRequest { projection: self.projection.clone(), key_range: Some(split.range.clone()) };
        self.client.scan(&self.table, request).await?.try_collect().await
    }

    /// Reads splits until the enumerator signals there are no more, sending one batch per split.
    ///
    /// The reader must already be registered with `enumerator` (see
    /// [`SplitEnumerator::add_reader`]); work is requested whenever the local queue runs dry.
    pub async fn run(mut self, enumerator: &SplitEnumerator, batches: mpsc::Sender<SplitBatch>) -> Result<ReaderStats> {
        loop {
            while let Some(event) = self.inbox.try_recv() {
                self.on_event(event);
            }

            if let Some(split) = self.pending.pop_front() {
                let rows = self.read_split(&split).await?;
                tracing::debug!(subtask = self.subtask_id, split = %split.split_id, rows = rows.len(), "split read");
                self.stats.rows_read += rows.len() as u64;
                self.stats.splits_read.push(split.split_id.clone());
                let batch = SplitBatch { subtask_id: self.subtask_id, split_id: split.split_id.clone(), rows };
                batches
                    .send(batch)
                    .await
                    .map_err(|_| Error::protocol(format!("batch receiver of subtask {} closed", self.subtask_id)))?;
                enumerator.complete_split(self.subtask_id, &split.split_id).await?;
                continue;
            }

            if self.no_more_splits {
                break;
            }

            enumerator.handle_split_request(self.subtask_id).await?;
            let event = self.inbox.recv().await.ok_or_else(|| {
                Error::protocol(format!("enumerator context of subtask {} dropped", self.subtask_id))
            })?;
            self.on_event(event);
        }

        tracing::info!(
            subtask = self.subtask_id,
            splits = self.stats.splits_read.len(),
            rows = self.stats.rows_read,
            "reader finished"
        );
        Ok(self.stats)
    }
}
