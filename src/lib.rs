//! # Lazyrow - Lazy Record Layer over Embedded SQLite
//!
//! Typed rows with deferred loading, JSON overflow fields, and validated
//! tag sets.
//!
//! Lazyrow provides:
//! - Records addressed by integer identity, loaded on first field access
//! - A closed value union mapped onto SQLite's storage classes
//! - An overflow JSON column for fields a table does not declare
//! - Per-kind tag vocabularies enforced before anything is written
//! - Value-shaped filters (null, IN, LIKE, comparison prefixes)
//! - Busy-database retries with a bounded backoff budget

pub mod decimal;
pub mod value;
pub mod tags;
pub mod kind;
pub mod codec;
pub(crate) mod filter;
pub mod storage;
pub mod record;
pub mod records;
pub mod config;

// Re-exports for convenient access
pub use codec::{Registry, ValueCodec};
pub use config::StoreConfig;
pub use decimal::Decimal;
pub use kind::{FieldType, RecordKind};
pub use record::{FindPolicy, Record, UpdateOptions};
pub use records::RecordList;
pub use storage::{RetryPolicy, Store};
pub use tags::TagSet;
pub use value::Value;

/// Result type alias for lazyrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for lazyrow operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No {table} row with id {id}")]
    RecordNotFound { table: &'static str, id: i64 },

    #[error("No {table} record matches {filter}")]
    NoMatch { table: &'static str, filter: String },

    #[error("More than one {table} record matches {filter}")]
    TooManyRecords { table: &'static str, filter: String },

    #[error("Tags {tags:?} not in the allowed set {allowed:?}")]
    InvalidTag { tags: Vec<String>, allowed: Vec<String> },

    #[error("Update of {table} id {id} wrote no rows")]
    UpdateFailed { table: &'static str, id: i64 },

    #[error("Unknown field {field:?} for {table}")]
    UnknownField { table: &'static str, field: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Database busy after {waited_ms}ms: {sql} {params}")]
    Busy { sql: String, params: String, waited_ms: u64 },

    #[error("Statement failed ({sql} {params}): {source}")]
    Statement { sql: String, params: String, source: rusqlite::Error },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
