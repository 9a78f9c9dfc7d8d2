//! Database sessions: connecting, reflecting, and finalizing

use crate::config::Settings;
use crate::csv_source::{load_csv, CsvSource};
use crate::error::{Error, Result};
use crate::filter::FilterEngine;
use crate::reconcile::ReconciliationEngine;
use crate::schema::{Column, SchemaCatalog, Table};
use crate::tolerance::Tolerance;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Where a url points
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Memory,
    File(PathBuf),
    Csv(PathBuf),
}

/// One open connection plus the schema reflected from it
///
/// Engines borrow the session; there is no reconnect.
pub struct Session {
    conn: Connection,
    catalog: SchemaCatalog,
    url: String,
    tolerance: Tolerance,
    csv: Option<CsvSource>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("tables", &self.catalog.tables())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect to a database url or a local file
    ///
    /// Accepted forms: `sqlite://` (in memory), `sqlite:///relative.db`,
    /// `sqlite:////absolute.db`, a bare path to a database file, or a bare
    /// path to a `.csv` file. Other schemes have no driver and fail with
    /// [`Error::Connection`].
    pub fn connect(url: &str, settings: &Settings) -> Result<Self> {
        let (target, full_url) = resolve(url, settings.can_create)?;

        let mut csv = None;
        let conn = match &target {
            Target::Memory => Connection::open_in_memory(),
            Target::File(path) => Connection::open(path),
            Target::Csv(_) => Connection::open_in_memory(),
        }
        .map_err(|e| Error::connection(url, e.to_string()))?;

        if let Target::Csv(path) = &target {
            csv = Some(load_csv(&conn, path)?);
        }

        let catalog = SchemaCatalog::reflect(&conn, settings.tables.as_ref())
            .map_err(|e| Error::connection(url, e.to_string()))?;

        tracing::info!(url = %full_url, tables = catalog.len(), "connected");

        Ok(Self {
            conn,
            catalog,
            url: full_url,
            tolerance: settings.tolerance(),
            csv,
        })
    }

    /// Wrap an already-open connection
    pub fn from_connection(conn: Connection, settings: &Settings) -> Result<Self> {
        let catalog = SchemaCatalog::reflect(&conn, settings.tables.as_ref())?;
        let url = conn
            .path()
            .filter(|p| !p.is_empty())
            .map_or_else(|| "sqlite://".to_string(), |p| format!("sqlite:///{p}"));
        Ok(Self {
            conn,
            catalog,
            url,
            tolerance: settings.tolerance(),
            csv: None,
        })
    }

    /// The resolved url (bare paths become `sqlite:///path`)
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Table names, in order
    pub fn tables(&self) -> Vec<&str> {
        self.catalog.tables()
    }

    /// Look up a reflected table
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.catalog.table(name).map(|t| t.as_ref())
    }

    /// Columns of a table, in source order
    pub fn columns(&self, table: &str) -> Result<&[Column]> {
        self.catalog.columns(table)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// The CSV file backing this session, if any
    pub fn csv_source(&self) -> Option<&CsvSource> {
        self.csv.as_ref()
    }

    /// Start a filter over every reflected table
    pub fn query(&self) -> FilterEngine<'_> {
        FilterEngine::new(self)
    }

    /// Start a reconciliation against one table
    pub fn reconcile(&self, table: &str) -> Result<ReconciliationEngine<'_>> {
        ReconciliationEngine::new(self, table)
    }

    /// Persist changes that are not written through the connection
    ///
    /// Only CSV-backed sessions need this; database sessions commit as they go.
    pub fn finalize(&self, changed: bool) -> Result<()> {
        match (&self.csv, changed) {
            (Some(source), true) => source.save(&self.conn),
            _ => Ok(()),
        }
    }
}

fn resolve(url: &str, can_create: bool) -> Result<(Target, String)> {
    if let Some((scheme, rest)) = url.split_once("://") {
        let driver = scheme.split('+').next().unwrap_or(scheme);
        if !driver.eq_ignore_ascii_case("sqlite") {
            return Err(Error::connection(
                url,
                format!("no driver available for scheme '{scheme}'"),
            ));
        }
        if rest.is_empty() {
            return Ok((Target::Memory, url.to_string()));
        }
        let path = rest.strip_prefix('/').ok_or_else(|| {
            Error::connection(url, "expected sqlite:///<path> or sqlite:////<absolute path>")
        })?;
        if path.is_empty() || path == ":memory:" {
            return Ok((Target::Memory, url.to_string()));
        }
        return Ok((Target::File(PathBuf::from(path)), url.to_string()));
    }

    let path = Path::new(url);
    if url.to_ascii_lowercase().ends_with(".csv") {
        if !path.is_file() {
            return Err(Error::connection(url, "CSV file not found"));
        }
        return Ok((Target::Csv(path.to_path_buf()), url.to_string()));
    }

    if path.exists() || can_create {
        return Ok((Target::File(path.to_path_buf()), format!("sqlite:///{url}")));
    }

    Err(Error::connection(
        url,
        "not a recognized database url and no such file",
    ))
}
