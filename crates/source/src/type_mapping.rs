//! Mapping of store column types onto the row type a source produces.

use tundra_common::{ColumnDescriptor, ColumnType, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    String,
    Bytes,
    Timestamp,
}

/// Converts one column descriptor into a [`FieldType`].
pub trait TypeMapper: Send + Sync {
    fn map(&self, column: &ColumnDescriptor) -> Result<FieldType>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeMapper;

impl TypeMapper for DefaultTypeMapper {
    fn map(&self, column: &ColumnDescriptor) -> Result<FieldType> {
        let mapped = match &column.column_type {
            ColumnType::Bool => FieldType::Boolean,
            ColumnType::Int8 => FieldType::TinyInt,
            ColumnType::Int16 => FieldType::SmallInt,
            ColumnType::Int32 => FieldType::Int,
            ColumnType::Int64 => FieldType::BigInt,
            ColumnType::Float => FieldType::Float,
            ColumnType::Double => FieldType::Double,
            ColumnType::Decimal { precision, scale } => {
                FieldType::Decimal { precision: *precision, scale: *scale }
            }
            ColumnType::String => FieldType::String,
            ColumnType::Binary => FieldType::Bytes,
            ColumnType::UnixTimeMicros => FieldType::Timestamp,
            ColumnType::Other(name) => {
                return Err(Error::TypeMapping {
                    column: column.name.clone(),
                    reason: format!("unsupported column type `{name}`"),
                })
            }
        };
        Ok(mapped)
    }
}

/// Field names and types of the rows a source produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowType {
    fields: Vec<(String, FieldType)>,
}

impl RowType {
    /// Maps every column; the first failure aborts.
    pub fn from_columns(mapper: &dyn TypeMapper, columns: &[ColumnDescriptor]) -> Result<Self> {
        let fields = columns
            .iter()
            .map(|c| Ok((c.name.clone(), mapper.map(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Restricts the row type to `columns`, in that order. Empty keeps every field.
    pub fn project(&self, columns: &[String]) -> Result<Self> {
        if columns.is_empty() {
            return Ok(self.clone());
        }
        let fields = columns
            .iter()
            .map(|name| {
                self.field_type(name)
                    .map(|t| (name.clone(), t))
                    .ok_or_else(|| Error::InvalidConfig(format!("projected column `{name}` does not exist")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}
