//! In-memory [`TableClient`] used by tests and local runs.

use crate::{RowStream, ScanPlan, ScanRequest, TableClient, TableHandle};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tundra_common::{Error, Result, TableSchema, Value};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Arc<Vec<Vec<Value>>>,
    /// Fails the scan once this many stored rows have been read.
    fail_after: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryTableClient {
    tables: HashMap<String, MemoryTable>,
    scans: AtomicUsize,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rows` (full rows, in schema order) under `name`.
    pub fn with_table(mut self, name: &str, schema: TableSchema, rows: Vec<Vec<Value>>) -> Self {
        self.tables
            .insert(name.to_string(), MemoryTable { schema, rows: Arc::new(rows), fail_after: None });
        self
    }

    /// Makes every scan of `name` fail with a connector error after `rows` rows.
    pub fn with_scan_failure(mut self, name: &str, rows: usize) -> Self {
        if let Some(table) = self.tables.get_mut(name) {
            table.fail_after = Some(rows);
        }
        self
    }

    /// Number of scans started so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TableClient for MemoryTableClient {
    async fn open_table(&self, name: &str) -> Result<TableHandle> {
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| Error::Connector(format!("table `{name}` does not exist")))?;
        Ok(TableHandle::new(name, table.schema.clone()))
    }

    async fn scan(&self, table: &TableHandle, request: ScanRequest) -> Result<RowStream> {
        let stored = self
            .tables
            .get(table.name())
            .ok_or_else(|| Error::Connector(format!("table `{}` does not exist", table.name())))?;
        let plan = ScanPlan::compile(&stored.schema, &request)?;
        self.scans.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(table = table.name(), ?request, "memory scan started");

        let rows = stored.rows.clone();
        let fail_after = stored.fail_after;
        let name = table.name().to_string();
        let stream = stream::iter(0..rows.len()).filter_map(move |i| {
            let item = match fail_after {
                Some(limit) if i >= limit => {
                    Some(Err(Error::Connector(format!("scan of `{name}` aborted at row {i}"))))
                }
                _ => plan.apply(&rows[i]).map(Ok),
            };
            futures::future::ready(item)
        });
        Ok(stream.boxed())
    }
}
