//! Filesystem connector
//!
//! Serves every `<table>.csv` file under a root directory as a table. The header row
//! carries the schema: each cell is `name:type`, optionally suffixed with `:pk` for
//! primary key columns, e.g. `id:int64:pk,name:string,score:double`.

use csv::ReaderBuilder;
use futures::stream::{self, StreamExt};
use std::fs::File;
use std::path::{Path, PathBuf};
use tundra_common::{ColumnDescriptor, ColumnType, Error, Result, TableSchema, Value};
use tundra_connector::{RowStream, ScanPlan, ScanRequest, TableClient, TableHandle};

/// A [`TableClient`] that reads typed CSV files.
#[derive(Debug, Clone)]
pub struct CsvTableClient {
    root: PathBuf,
}

impl CsvTableClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }
}

fn parse_header(header: &csv::StringRecord) -> Result<TableSchema> {
    let mut columns = Vec::with_capacity(header.len());
    for cell in header.iter() {
        let mut parts = cell.split(':').map(str::trim);
        let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(|| {
            Error::Connector(format!("header cell `{cell}` has no column name"))
        })?;
        let column_type = match parts.next() {
            Some(ty) => ty.parse::<ColumnType>()?,
            None => ColumnType::String,
        };
        let mut column = ColumnDescriptor::new(name, column_type);
        match parts.next() {
            Some(marker) if marker.eq_ignore_ascii_case("pk") => column = column.key(),
            Some(marker) => {
                return Err(Error::Connector(format!("unknown column marker `{marker}` in `{cell}`")))
            }
            None => {}
        }
        columns.push(column);
    }
    Ok(TableSchema::new(columns))
}

fn parse_value(raw: &str, column: &ColumnDescriptor) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let invalid =
        |e: &dyn std::fmt::Display| Error::Connector(format!("column `{}`: cannot parse `{raw}`: {e}", column.name));
    let value = match column.column_type {
        ColumnType::Bool => Value::Bool(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Int8 => Value::Int8(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Int16 => Value::Int16(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Int32 => Value::Int32(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Int64 => Value::Int64(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Float => Value::Float(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Double => Value::Double(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::UnixTimeMicros => Value::Timestamp(raw.parse().map_err(|e| invalid(&e))?),
        ColumnType::Binary => Value::Binary(raw.as_bytes().to_vec()),
        ColumnType::Decimal { .. } | ColumnType::String | ColumnType::Other(_) => Value::String(raw.to_string()),
    };
    Ok(value)
}

fn open(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new().has_headers(true).from_reader(file))
}

fn read_schema(path: &Path) -> Result<TableSchema> {
    let mut rdr = open(path)?;
    let header = rdr.headers().map_err(|e| Error::Connector(e.to_string()))?.clone();
    parse_header(&header)
}

fn read_rows(path: &Path, schema: &TableSchema) -> Result<Vec<Vec<Value>>> {
    let mut rdr = open(path)?;
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| Error::Connector(e.to_string()))?;
        let row = record
            .iter()
            .zip(schema.columns())
            .map(|(raw, column)| parse_value(raw, column))
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Connector(format!("file reader task failed: {e}")))?
}

#[async_trait::async_trait]
impl TableClient for CsvTableClient {
    async fn open_table(&self, name: &str) -> Result<TableHandle> {
        let path = self.table_path(name);
        let schema = blocking(move || read_schema(&path)).await?;
        Ok(TableHandle::new(name, schema))
    }

    async fn scan(&self, table: &TableHandle, request: ScanRequest) -> Result<RowStream> {
        let plan = ScanPlan::compile(table.schema(), &request)?;
        let path = self.table_path(table.name());
        let schema = table.schema().clone();
        tracing::debug!(path = %path.display(), ?request, "csv scan started");

        // Files are read whole; rows are parsed eagerly so type errors surface before streaming.
        let rows = blocking(move || read_rows(&path, &schema)).await?;
        let projected: Vec<_> = rows.iter().filter_map(|row| plan.apply(row)).map(Ok).collect();
        Ok(stream::iter(projected).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tundra_common::KeyRange;

    fn write_table(dir_name: &str, table: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{table}.csv")), contents).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_open_table_reads_typed_header() {
        let dir = write_table("tundra_fs_header", "users", "id:int32:pk,name:string,score\n1,foo,x\n");
        let client = CsvTableClient::new(&dir);
        let handle = client.open_table("users").await.unwrap();

        assert_eq!(handle.primary_key_columns(), vec!["id".to_string()]);
        assert_eq!(handle.columns()[0].column_type, ColumnType::Int32);
        assert_eq!(handle.columns()[2].column_type, ColumnType::String);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_scan_with_projection_and_range() {
        let dir = write_table(
            "tundra_fs_scan",
            "users",
            "id:int64:pk,name:string\n1,foo\n2,bar\n3,baz\n4,\n",
        );
        let client = CsvTableClient::new(&dir);
        let handle = client.open_table("users").await.unwrap();

        let request = ScanRequest::projected(["name", "id"]).with_key_range(KeyRange::new("id", 2, 4).unwrap());
        let rows: Vec<_> = client.scan(&handle, request).await.unwrap().try_collect().await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].values(), [Value::String("bar".to_string()), Value::Int64(2)]);
        assert_eq!(rows[2].get("name"), Some(&Value::Null));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_bad_cell_fails_the_scan() {
        let dir = write_table("tundra_fs_bad_cell", "t", "id:int64:pk\n1\nnot-a-number\n");
        let client = CsvTableClient::new(&dir);
        let handle = client.open_table("t").await.unwrap();
        let result = client.scan(&handle, ScanRequest::default()).await;
        assert!(result.is_err());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_table_file_not_found() {
        let client = CsvTableClient::new(std::env::temp_dir().join("tundra_fs_missing"));
        let err = client.open_table("ghost").await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_unknown_marker_is_rejected() {
        let header = csv::StringRecord::from(vec!["id:int64:unique"]);
        assert!(parse_header(&header).is_err());
    }
}
