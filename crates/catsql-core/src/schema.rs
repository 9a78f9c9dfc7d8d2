//! Schema reflection: tables, columns and their type classification

use crate::error::{Error, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// How a column's declared type feeds equality decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Floating-point numeric; compared within epsilon
    Float,
    /// Integer numeric
    Integer,
    /// Any other concrete declared type; compared exactly
    Text,
    /// No declared type (untyped store)
    Blank,
}

impl ColumnKind {
    /// Classify a declared column type
    ///
    /// Follows SQLite's affinity rules closely enough for equality purposes:
    /// REAL/FLOAT/DOUBLE are floats, anything mentioning INT is an integer.
    pub fn classify(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.is_empty() {
            ColumnKind::Blank
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnKind::Float
        } else if upper.contains("INT") {
            ColumnKind::Integer
        } else {
            ColumnKind::Text
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Float => "float",
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
            ColumnKind::Blank => "blank",
        }
    }
}

/// A column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column index (0-based, source order)
    pub index: usize,
    /// Declared type as reported by the source ("" when untyped)
    pub declared_type: String,
    /// Classification of the declared type
    pub kind: ColumnKind,
    /// Part of the primary key
    pub primary_key: bool,
    /// Declared NOT NULL
    pub not_null: bool,
}

impl Column {
    /// Create a new column, classifying its declared type
    pub fn new(name: impl Into<String>, index: usize, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            index,
            kind: ColumnKind::classify(&declared_type),
            declared_type,
            primary_key: false,
            not_null: false,
        }
    }

    pub fn is_float(&self) -> bool {
        self.kind == ColumnKind::Float
    }

    pub fn is_blank(&self) -> bool {
        self.kind == ColumnKind::Blank
    }
}

/// A reflected table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Column definitions, in source order
    pub columns: Vec<Column>,
    /// Primary-key column names, in key order
    pub primary_key: Vec<String>,
}

impl Table {
    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Column names in source order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Names from `names` that this table lacks
    pub fn missing_columns<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    /// Look up a column, failing with [`Error::UnknownColumn`]
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.find_column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }
}

/// Table metadata for one connection
///
/// Built once when a session is opened and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: BTreeMap<String, Arc<Table>>,
}

impl SchemaCatalog {
    /// Reflect every user table, optionally restricted to `only`
    pub fn reflect(conn: &Connection, only: Option<&BTreeSet<String>>) -> Result<Self> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = BTreeMap::new();
        for name in names {
            if let Some(only) = only {
                if !only.contains(&name) {
                    continue;
                }
            }
            let table = reflect_table(conn, &name)?;
            tables.insert(name, Arc::new(table));
        }

        tracing::debug!(tables = tables.len(), "reflected schema");
        Ok(Self { tables })
    }

    /// Table names, in order
    pub fn tables(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Get the number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Find a table by name
    pub fn find_table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name)
    }

    /// Look up a table, failing with [`Error::UnknownTable`]
    pub fn table(&self, name: &str) -> Result<&Arc<Table>> {
        self.find_table(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Columns of a table, in source order
    pub fn columns(&self, name: &str) -> Result<&[Column]> {
        Ok(&self.table(name)?.columns)
    }

    /// Iterate over all tables in name order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }
}

fn reflect_table(conn: &Connection, name: &str) -> Result<Table> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;

    // (cid, name, type, notnull, dflt_value, pk); pk is the 1-based key position
    let mut key_positions: HashMap<String, i64> = HashMap::new();
    let mut columns = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let col_name: String = row.get(1)?;
        let declared: Option<String> = row.get(2)?;
        let not_null: i64 = row.get(3)?;
        let pk: i64 = row.get(5)?;

        let mut column = Column::new(col_name.clone(), columns.len(), declared.unwrap_or_default());
        column.not_null = not_null != 0;
        if pk > 0 {
            column.primary_key = true;
            key_positions.insert(col_name, pk);
        }
        columns.push(column);
    }

    let mut primary_key: Vec<String> = key_positions.keys().cloned().collect();
    primary_key.sort_by_key(|c| key_positions[c]);

    Ok(Table {
        name: name.to_string(),
        columns,
        primary_key,
    })
}

/// Quote an identifier with double quotes, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
