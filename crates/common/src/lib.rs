//! Common crate
//!
//! Shared data model, types, and error handling for Tundra.
//!
//! # Example
//! ```rust
//! use tundra_common::{KeyRange, Split};
//! let range = KeyRange::new("id", 0, 9).unwrap();
//! let split = Split::new("orders-0", range);
//! assert!(split.range.contains(5));
//! ```

pub mod error;
pub mod row;
pub mod schema;
pub mod split;

pub use error::{Error, Result};
pub use row::{Row, Value};
pub use schema::{ColumnDescriptor, ColumnType, TableSchema};
pub use split::{KeyBounds, KeyRange, Split};
