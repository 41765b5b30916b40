//! Source preparation: config validation, connection, boundary discovery and typing.

use crate::boundary::{BoundaryScanner, KeyDomain};
use crate::config::SourceSettings;
use crate::context::{ReaderInbox, SubtaskId};
use crate::enumerator::{SplitEnumerator, SplitPlan};
use crate::partitioner::RangePartitioner;
use crate::reader::SourceReader;
use crate::state::EnumeratorState;
use crate::type_mapping::{DefaultTypeMapper, RowType, TypeMapper};
use std::sync::Arc;
use tundra_common::{Error, Result};
use tundra_connector::{TableClient, TableHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundedness {
    Bounded,
}

/// A table read as a bounded, key-range partitioned source.
pub struct BoundedSource {
    settings: SourceSettings,
    client: Arc<dyn TableClient>,
    mapper: Arc<dyn TypeMapper>,
}

impl BoundedSource {
    pub fn new(settings: SourceSettings, client: Arc<dyn TableClient>) -> Self {
        Self { settings, client, mapper: Arc::new(DefaultTypeMapper) }
    }

    pub fn with_type_mapper(mut self, mapper: Arc<dyn TypeMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn boundedness(&self) -> Boundedness {
        Boundedness::Bounded
    }

    /// Everything that must happen once, before parallel reading starts.
    ///
    /// Any failure aborts preparation as a whole.
    pub async fn prepare(&self) -> Result<PreparedSource> {
        self.settings.validate()?;
        let partitioner = RangePartitioner::new(self.settings.split_count())?;

        let timeout = self.settings.operation_timeout();
        let table = match tokio::time::timeout(timeout, self.client.open_table(&self.settings.table)).await {
            Ok(opened) => opened?,
            Err(_) => return Err(Error::Timeout(timeout)),
        };

        let row_type = RowType::from_columns(self.mapper.as_ref(), table.columns())?;
        let produced_type = row_type.project(&self.settings.columns)?;

        let domain = BoundaryScanner::new(self.client.clone())
            .with_deadline(self.settings.scan_deadline())
            .discover(&table)
            .await?;

        tracing::info!(
            table = table.name(),
            parallelism = self.settings.parallelism,
            split_count = partitioner.split_count(),
            fields = produced_type.len(),
            "source prepared"
        );
        Ok(PreparedSource {
            client: self.client.clone(),
            table,
            domain,
            produced_type,
            projection: self.settings.columns.clone(),
            parallelism: self.settings.parallelism,
            partitioner,
        })
    }
}

/// A source whose key domain and row type are known.
pub struct PreparedSource {
    client: Arc<dyn TableClient>,
    table: TableHandle,
    domain: KeyDomain,
    produced_type: RowType,
    projection: Vec<String>,
    parallelism: usize,
    partitioner: RangePartitioner,
}

impl PreparedSource {
    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    pub fn key_domain(&self) -> &KeyDomain {
        &self.domain
    }

    pub fn produced_type(&self) -> &RowType {
        &self.produced_type
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn create_enumerator(&self) -> SplitEnumerator {
        let plan = SplitPlan {
            table: self.table.name().to_string(),
            domain: self.domain.clone(),
            partitioner: self.partitioner,
        };
        SplitEnumerator::new(self.parallelism, plan)
    }

    pub fn restore_enumerator(&self, state: EnumeratorState) -> Result<SplitEnumerator> {
        SplitEnumerator::restore(self.parallelism, state)
    }

    pub fn create_reader(&self, subtask_id: SubtaskId, inbox: ReaderInbox) -> SourceReader {
        SourceReader::new(subtask_id, self.client.clone(), self.table.clone(), self.projection.clone(), inbox)
    }
}
