//! One-time discovery of a table's key domain.

use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tundra_common::{Error, KeyBounds, Result};
use tundra_connector::{ScanRequest, TableClient, TableHandle};

/// Key column plus the min/max observed by a boundary scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDomain {
    pub key_column: String,
    /// `None` when the table had no rows.
    pub bounds: Option<KeyBounds>,
    pub rows_scanned: u64,
}

impl KeyDomain {
    pub fn new(key_column: impl Into<String>, bounds: Option<KeyBounds>) -> Self {
        Self { key_column: key_column.into(), bounds, rows_scanned: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn min(&self) -> Option<i64> {
        self.bounds.map(|b| b.lower())
    }

    pub fn max(&self) -> Option<i64> {
        self.bounds.map(|b| b.upper())
    }
}

pub struct BoundaryScanner {
    client: Arc<dyn TableClient>,
    deadline: Option<Duration>,
}

impl BoundaryScanner {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        Self { client, deadline: None }
    }

    /// Time-boxes the whole scan, not just the connection.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// First primary key column of `table`. It must hold signed integers.
    pub fn key_column(table: &TableHandle) -> Result<String> {
        let keys = table.primary_key_columns();
        let first = keys
            .first()
            .ok_or_else(|| Error::Connector(format!("table `{}` has no primary key", table.name())))?;
        if keys.len() > 1 {
            tracing::warn!(
                table = table.name(),
                key_columns = ?keys,
                "composite primary key, partitioning on the first column only"
            );
        }
        let column = table
            .schema()
            .column(first)
            .ok_or_else(|| Error::Connector(format!("primary key column `{first}` missing from schema")))?;
        if !column.column_type.is_signed_integer() {
            return Err(Error::Connector(format!(
                "primary key column `{first}` has type {}, expected a signed integer",
                column.column_type
            )));
        }
        Ok(first.clone())
    }

    /// Scans the key column of `table` once and returns the observed min/max.
    ///
    /// Any failure is reported as [`Error::Discovery`]; nothing is retried.
    pub async fn discover(&self, table: &TableHandle) -> Result<KeyDomain> {
        let scan = async {
            let key_column = Self::key_column(table)?;
            self.scan_bounds(table, key_column).await
        };
        let domain = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, scan).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(deadline)),
            },
            None => scan.await,
        }
        .map_err(|e| Error::discovery(table.name(), e))?;

        tracing::info!(
            table = table.name(),
            key_column = %domain.key_column,
            min = ?domain.min(),
            max = ?domain.max(),
            rows = domain.rows_scanned,
            "discovered partition boundaries"
        );
        Ok(domain)
    }

    async fn scan_bounds(&self, table: &TableHandle, key_column: String) -> Result<KeyDomain> {
        let request = ScanRequest::projected([key_column.clone()]);
        let mut rows = self.client.scan(table, request).await?;

        let mut bounds: Option<KeyBounds> = None;
        let mut rows_scanned = 0u64;
        while let Some(row) = rows.try_next().await? {
            let key = row.get_i64(&key_column)?;
            bounds = Some(match bounds {
                None => KeyBounds::single(key),
                Some(b) => b.include(key),
            });
            rows_scanned += 1;
        }
        Ok(KeyDomain { key_column, bounds, rows_scanned })
    }
}
