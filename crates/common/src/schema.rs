use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Column types as reported by the data-store's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    String,
    Binary,
    UnixTimeMicros,
    /// A store type this crate has no name for.
    Other(String),
}

impl ColumnType {
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64)
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let ty = match lower.as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" | "int" => ColumnType::Int32,
            "int64" | "bigint" => ColumnType::Int64,
            "float" => ColumnType::Float,
            "double" => ColumnType::Double,
            "string" => ColumnType::String,
            "binary" => ColumnType::Binary,
            "timestamp" | "unixtime_micros" => ColumnType::UnixTimeMicros,
            "" => return Err(Error::InvalidConfig("empty column type".to_string())),
            other => match other.strip_prefix("decimal(").and_then(|r| r.strip_suffix(')')) {
                Some(args) => {
                    let (precision, scale) = args
                        .split_once(',')
                        .ok_or_else(|| Error::InvalidConfig(format!("malformed decimal type `{s}`")))?;
                    let parse = |v: &str| {
                        v.trim()
                            .parse::<u8>()
                            .map_err(|e| Error::InvalidConfig(format!("malformed decimal type `{s}`: {e}")))
                    };
                    ColumnType::Decimal { precision: parse(precision)?, scale: parse(scale)? }
                }
                None => ColumnType::Other(other.to_string()),
            },
        };
        Ok(ty)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Bool => write!(f, "bool"),
            ColumnType::Int8 => write!(f, "int8"),
            ColumnType::Int16 => write!(f, "int16"),
            ColumnType::Int32 => write!(f, "int32"),
            ColumnType::Int64 => write!(f, "int64"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Binary => write!(f, "binary"),
            ColumnType::UnixTimeMicros => write!(f, "timestamp"),
            ColumnType::Other(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type, nullable: true, primary_key: false }
    }

    /// Marks the column as part of the primary key (key columns are never nullable).
    pub fn key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// Ordered column descriptors of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary key columns, in schema order.
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.columns.iter().filter(|c| c.primary_key).map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_column_types() {
        assert_eq!("INT64".parse::<ColumnType>().unwrap(), ColumnType::Int64);
        assert_eq!(
            "decimal(10, 2)".parse::<ColumnType>().unwrap(),
            ColumnType::Decimal { precision: 10, scale: 2 }
        );
        assert_eq!("geometry".parse::<ColumnType>().unwrap(), ColumnType::Other("geometry".to_string()));
        assert!("".parse::<ColumnType>().is_err());
        assert!("decimal(x,2)".parse::<ColumnType>().is_err());
    }

    #[test]
    fn primary_key_columns_keep_schema_order() {
        let schema = TableSchema::new(vec![
            ColumnDescriptor::new("region", ColumnType::String).key(),
            ColumnDescriptor::new("payload", ColumnType::Binary),
            ColumnDescriptor::new("id", ColumnType::Int64).key(),
        ]);
        assert_eq!(schema.primary_key_columns(), vec!["region".to_string(), "id".to_string()]);
        assert!(!schema.column("id").unwrap().nullable);
    }
}
