//! Saved filter views
//!
//! A bookmark records where a view came from and how it was filtered, so
//! the same rows can be shown again later or patched after editing.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::filter::FilterEngine;
use crate::session::Session;
use crate::value::ValueMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A saved view of a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookmark {
    /// Database url
    pub url: String,
    /// Tables to include (all when absent)
    pub table: Option<Vec<String>>,
    /// Columns to show (all when absent)
    pub column: Option<Vec<String>>,
    pub distinct: bool,
    /// Column equality filters; `@file` values expand
    pub context: ValueMap,
    /// Columns left out of the output
    pub hidden_columns: Vec<String>,
    /// Raw SQL conditions
    pub sql: Option<Vec<String>>,
    /// When the bookmark was written
    pub saved_at: Option<DateTime<Utc>>,
}

impl Bookmark {
    /// Create a bookmark for `url`, stamped with the current time
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            saved_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Load a bookmark from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the bookmark to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `base` restricted to the bookmarked tables
    pub fn settings(&self, base: &Settings) -> Settings {
        match &self.table {
            Some(tables) => base.clone().with_tables(tables.iter().cloned()),
            None => base.clone(),
        }
    }

    /// Connect to the bookmarked database
    pub fn open(&self, base: &Settings) -> Result<Session> {
        Session::connect(&self.url, &self.settings(base))
    }

    /// Apply the bookmarked filters to `engine`
    pub fn apply(&self, engine: &mut FilterEngine<'_>) -> Result<()> {
        if let Some(columns) = &self.column {
            engine.select_columns(columns);
        }
        if let Some(sql) = &self.sql {
            engine.where_raw(sql);
        }
        if !self.context.is_empty() {
            engine.where_equals_expanded(&self.context)?;
        }
        if self.distinct {
            engine.distinct();
        }
        Ok(())
    }

    /// True unless `column` is hidden
    pub fn shows(&self, column: &str) -> bool {
        !self.hidden_columns.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmark.json");

        let mut bookmark = Bookmark::new("sqlite:///numbers.db");
        bookmark.table = Some(vec!["sheet".to_string()]);
        bookmark
            .context
            .insert("NAME".to_string(), Value::from("two"));
        bookmark.hidden_columns = vec!["NAME".to_string()];
        bookmark.save(&path).unwrap();

        let loaded = Bookmark::load(&path).unwrap();
        assert_eq!(loaded, bookmark);
        assert!(loaded.saved_at.is_some());
        assert!(!loaded.shows("NAME"));
        assert!(loaded.shows("DIGIT"));
    }

    #[test]
    fn test_missing_fields_default() {
        let bookmark: Bookmark = serde_json::from_str(r#"{"url": "sqlite://"}"#).unwrap();
        assert_eq!(bookmark.url, "sqlite://");
        assert!(bookmark.table.is_none());
        assert!(bookmark.context.is_empty());
        assert!(bookmark.saved_at.is_none());
    }

    #[test]
    fn test_open_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("numbers.sqlite");
        {
            let conn = rusqlite::Connection::open(&db).unwrap();
            conn.execute_batch(
                "CREATE TABLE sheet (NAME TEXT, DIGIT INTEGER);
                 INSERT INTO sheet VALUES ('one', 1), ('two', 2), ('two', 2), ('three', 3);
                 CREATE TABLE other (NAME TEXT);",
            )
            .unwrap();
        }

        let mut bookmark = Bookmark::new(db.to_str().unwrap());
        bookmark.table = Some(vec!["sheet".to_string(), "other".to_string()]);
        bookmark.column = Some(vec!["DIGIT".to_string()]);
        bookmark.sql = Some(vec!["DIGIT >= 2".to_string()]);
        bookmark.distinct = true;

        let session = bookmark.open(&Settings::default()).unwrap();
        assert_eq!(session.tables(), vec!["other", "sheet"]);

        let mut engine = session.query();
        bookmark.apply(&mut engine).unwrap();
        assert_eq!(engine.table_names(), vec!["sheet"]);
        assert_eq!(engine.rows().unwrap().len(), 2);
    }
}
