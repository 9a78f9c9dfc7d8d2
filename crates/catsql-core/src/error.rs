//! Error types for catsql-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in catsql-core
///
/// Only fatal conditions live here. Tables dropped while filtering and
/// writes that match nothing are reported as data instead, see
/// [`Rejection`](crate::filter::Rejection) and
/// [`Unmatched`](crate::reconcile::Unmatched).
#[derive(Debug, Error)]
pub enum Error {
    /// No usable driver or database for a url
    #[error("cannot connect to '{url}': {message}")]
    Connection { url: String, message: String },

    /// A single-table result was requested but several tables are active
    #[error("more than one table in results: {}", tables.join(", "))]
    AmbiguousTables { tables: Vec<String> },

    /// A single-row result was requested but the query returned more
    #[error("more than one row in results from '{table}' ({count} rows)")]
    AmbiguousRows { table: String, count: usize },

    /// Table not present in the schema catalog
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// Column not present in a table
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Malformed highlighter diff
    #[error("invalid diff at line {line}: {message}")]
    DiffParse { line: usize, message: String },

    /// Database error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for the errors raised when a single table or row was expected
    pub fn is_ambiguity(&self) -> bool {
        matches!(
            self,
            Error::AmbiguousTables { .. } | Error::AmbiguousRows { .. }
        )
    }

    pub(crate) fn connection(url: &str, message: impl Into<String>) -> Self {
        Error::Connection {
            url: url.to_string(),
            message: message.into(),
        }
    }
}
