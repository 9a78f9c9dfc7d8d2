//! catsql-core: filtering and patching relational tables
//!
//! This library provides functionality to:
//! - Connect to a SQLite database or a CSV file and reflect its schema
//! - Filter every table at once, dropping tables a filter does not fit
//! - Compare values with float tolerance where column types call for it
//! - Apply insert/update/delete operations parsed from a highlighter diff
//! - Save and restore filtered views as bookmarks

pub mod bookmark;
pub mod config;
pub mod csv_source;
pub mod diff;
pub mod error;
pub mod expand;
pub mod filter;
pub mod nullify;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod session;
pub mod tolerance;
pub mod value;

pub use bookmark::Bookmark;
pub use config::Settings;
pub use csv_source::CsvSource;
pub use diff::{DiffRow, HighlightDiff};
pub use error::{Error, Result};
pub use filter::{Dropped, FilterEngine, OrderBy, Rejection};
pub use query::{OrderTerm, Predicate, Query, ResultSet, Row};
pub use reconcile::{ChangeOp, OpKind, ReconciliationEngine, ReconciliationResult, Unmatched};
pub use schema::{Column, ColumnKind, SchemaCatalog, Table};
pub use session::Session;
pub use tolerance::{Constraint, Tolerance, DEFAULT_EPSILON};
pub use value::{Value, ValueMap};
