//! Connector crate
//!
//! The narrow interfaces a bounded source needs from a data-store client: opening a
//! table, reading its schema, and streaming a projected (optionally key-filtered) scan.

pub mod memory;

use futures::stream::BoxStream;
use std::sync::Arc;
use tundra_common::{ColumnDescriptor, Error, KeyRange, Result, Row, TableSchema, Value};

pub use memory::MemoryTableClient;

/// Stream of rows produced by [`TableClient::scan`].
pub type RowStream = BoxStream<'static, Result<Row>>;

/// An opened table together with its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    name: String,
    schema: TableSchema,
}

impl TableHandle {
    pub fn new(name: impl Into<String>, schema: TableSchema) -> Self {
        Self { name: name.into(), schema }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        self.schema.primary_key_columns()
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        self.schema.columns()
    }
}

/// What to read from a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Columns to return, in order. Empty means every column.
    pub projection: Vec<String>,
    /// Restricts the scan to rows whose key falls inside the range.
    pub key_range: Option<KeyRange>,
}

impl ScanRequest {
    pub fn projected(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { projection: columns.into_iter().map(Into::into).collect(), key_range: None }
    }

    pub fn with_key_range(mut self, range: KeyRange) -> Self {
        self.key_range = Some(range);
        self
    }
}

/// The scan and schema capabilities of a data-store client.
#[async_trait::async_trait]
pub trait TableClient: Send + Sync {
    async fn open_table(&self, name: &str) -> Result<TableHandle>;

    async fn scan(&self, table: &TableHandle, request: ScanRequest) -> Result<RowStream>;
}

/// Compiled form of a [`ScanRequest`] against one schema.
///
/// Connectors that hold full rows in memory use it to project and filter them.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    columns: Arc<[String]>,
    indices: Vec<usize>,
    key_filter: Option<(usize, KeyRange)>,
}

impl ScanPlan {
    pub fn compile(schema: &TableSchema, request: &ScanRequest) -> Result<Self> {
        let position = |name: &str| {
            schema
                .columns()
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| Error::Connector(format!("unknown column `{name}`")))
        };

        let indices = if request.projection.is_empty() {
            (0..schema.columns().len()).collect()
        } else {
            request.projection.iter().map(|name| position(name)).collect::<Result<Vec<_>>>()?
        };
        let columns = indices.iter().map(|&i| schema.columns()[i].name.clone()).collect();
        let key_filter = match &request.key_range {
            Some(range) => Some((position(range.key_column())?, range.clone())),
            None => None,
        };
        Ok(Self { columns, indices, key_filter })
    }

    pub fn columns(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    /// Projects `values` (a full row in schema order), or drops it when the key filter rejects it.
    pub fn apply(&self, values: &[Value]) -> Option<Row> {
        if let Some((index, range)) = &self.key_filter {
            let key = values.get(*index).and_then(Value::as_i64)?;
            if !range.contains(key) {
                return None;
            }
        }
        let projected = self.indices.iter().map(|&i| values.get(i).cloned().unwrap_or(Value::Null));
        Some(Row::new(self.columns.clone(), projected.collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_common::ColumnType;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnDescriptor::new("id", ColumnType::Int32).key(),
            ColumnDescriptor::new("name", ColumnType::String),
        ])
    }

    #[test]
    fn plan_projects_and_filters() {
        let request = ScanRequest::projected(["name"]).with_key_range(KeyRange::new("id", 2, 4).unwrap());
        let plan = ScanPlan::compile(&schema(), &request).unwrap();

        let inside = plan.apply(&[Value::Int32(3), Value::String("c".to_string())]).unwrap();
        assert_eq!(inside.columns(), ["name".to_string()]);
        assert_eq!(inside.values(), [Value::String("c".to_string())]);

        assert!(plan.apply(&[Value::Int32(5), Value::String("e".to_string())]).is_none());
    }

    #[test]
    fn plan_rejects_unknown_columns() {
        let request = ScanRequest::projected(["missing"]);
        assert!(ScanPlan::compile(&schema(), &request).is_err());
    }

    #[test]
    fn empty_key_range_filters_everything() {
        let request = ScanRequest::default().with_key_range(KeyRange::empty("id"));
        let plan = ScanPlan::compile(&schema(), &request).unwrap();
        assert!(plan.apply(&[Value::Int32(0), Value::Null]).is_none());
    }
}
