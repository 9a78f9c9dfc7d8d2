//! Connection and comparison settings

use crate::error::{Error, Result};
use crate::tolerance::{Tolerance, DEFAULT_EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Settings applied when opening a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Slack for float-tolerant equality
    pub epsilon: f64,
    /// Only reflect these tables (all tables when absent)
    pub tables: Option<BTreeSet<String>>,
    /// Allow connecting to a database file that does not exist yet
    pub can_create: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            tables: None,
            can_create: false,
        }
    }
}

impl Settings {
    /// Load settings from JSON; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the settings to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Restrict reflection to the given tables
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"can_create": true}"#).unwrap();
        assert!(settings.can_create);
        assert_eq!(settings.epsilon, DEFAULT_EPSILON);
        assert!(settings.tables.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            epsilon: 0.001,
            ..Settings::default()
        }
        .with_tables(["sheet"]);
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.tolerance(), Tolerance::new(0.001));
        assert!(loaded.tables.unwrap().contains("sheet"));
    }
}
