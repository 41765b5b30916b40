use std::time::Duration;
use thiserror::Error;

/// Unified error type for Tundra crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Required connection/table/column parameters are missing or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The boundary scan could not produce a key domain for `table`.
    #[error("failed to compute partition boundaries for table `{table}`: {source}")]
    Discovery {
        table: String,
        #[source]
        source: Box<Error>,
    },

    #[error("type mapping failed for column `{column}`: {reason}")]
    TypeMapping { column: String, reason: String },

    /// An internal invariant of the split assignment protocol was violated.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("checkpoint state error: {0}")]
    State(String),

    /// Failure reported by the underlying data-store client.
    #[error("connector error: {0}")]
    Connector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps `self` as a discovery failure for `table`.
    pub fn discovery(table: &str, source: Error) -> Self {
        Error::Discovery { table: table.to_string(), source: Box::new(source) }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
