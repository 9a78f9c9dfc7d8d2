//! CSV files as a data source
//!
//! A CSV file is loaded into an in-memory table so it can be filtered and
//! patched like any other table, then written back if it changed.

use crate::error::{Error, Result};
use crate::schema::quote_ident;
use crate::value::Value;
use rusqlite::{params_from_iter, Connection};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Name of the primary-key column (found in the file or added)
pub const ID_COLUMN: &str = "id";

/// Fallback table name when the file name has no letters
const FALLBACK_TABLE: &str = "_table_";

/// A CSV file loaded into a table
#[derive(Debug, Clone)]
pub struct CsvSource {
    /// Source file path
    pub path: PathBuf,
    /// Table holding the data
    pub table: String,
    /// Header of the file, in order
    pub columns: Vec<String>,
    /// True when the `id` column was added on load
    pub synthetic_id: bool,
}

/// Declared type picked for a CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inferred {
    Text,
    Integer,
    Real,
}

impl Inferred {
    fn sql(self) -> &'static str {
        match self {
            Inferred::Text => "TEXT",
            Inferred::Integer => "INTEGER",
            Inferred::Real => "REAL",
        }
    }
}

/// Derive a table name from a file path: stem, lowercased, letters only
pub fn table_name_for(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();
    let name: String = stem
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();
    if name.is_empty() {
        FALLBACK_TABLE.to_string()
    } else {
        name
    }
}

/// Load a CSV file into a new table on `conn`
pub fn load_csv<P: AsRef<Path>>(conn: &Connection, path: P) -> Result<CsvSource> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(Error::CsvParse {
            path: path.to_path_buf(),
            message: "no columns found in CSV".to_string(),
        });
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        if cells.len() > columns.len() {
            tracing::warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has more cells than columns, truncating"
            );
        }
        cells.resize(columns.len(), String::new());
        rows.push(cells);
    }

    let types: Vec<Inferred> = (0..columns.len()).map(|i| infer_type(&rows, i)).collect();
    let synthetic_id = !columns.iter().any(|c| c == ID_COLUMN);
    let table = table_name_for(path);

    let mut definitions = Vec::new();
    if synthetic_id {
        definitions.push(format!("{} INTEGER PRIMARY KEY", quote_ident(ID_COLUMN)));
    }
    for (name, ty) in columns.iter().zip(&types) {
        let key = if name == ID_COLUMN { " PRIMARY KEY" } else { "" };
        definitions.push(format!("{} {}{}", quote_ident(name), ty.sql(), key));
    }
    conn.execute(
        &format!(
            "CREATE TABLE {} ({})",
            quote_ident(&table),
            definitions.join(", ")
        ),
        [],
    )?;

    let mut insert_columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    if synthetic_id {
        insert_columns.insert(0, quote_ident(ID_COLUMN));
    }
    let placeholders = vec!["?"; insert_columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table),
        insert_columns.join(", "),
        placeholders
    );

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for (idx, cells) in rows.iter().enumerate() {
            let mut values: Vec<Value> = cells
                .iter()
                .zip(&types)
                .map(|(cell, ty)| convert(cell, *ty))
                .collect();
            if synthetic_id {
                values.insert(0, Value::Integer(idx as i64 + 1));
            }
            stmt.execute(params_from_iter(values.iter()))?;
        }
    }
    tx.commit()?;

    tracing::info!(path = %path.display(), table = %table, rows = rows.len(), "loaded CSV");

    Ok(CsvSource {
        path: path.to_path_buf(),
        table,
        columns,
        synthetic_id,
    })
}

impl CsvSource {
    /// Write the table back to the source file
    ///
    /// The previous file is kept as `<file>.bak`. Rows are written in
    /// insertion order; an added `id` column is not written.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        if self.path.exists() {
            let mut backup = self.path.clone().into_os_string();
            backup.push(".bak");
            fs::copy(&self.path, PathBuf::from(backup))?;
        }

        let select = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(&self.table)
        );

        let mut writer = csv::Writer::from_path(&self.path).map_err(|e| Error::Csv {
            path: self.path.clone(),
            source: e,
        })?;
        let csv_err = |e: csv::Error| Error::Csv {
            path: self.path.clone(),
            source: e,
        };
        writer.write_record(&self.columns).map_err(csv_err)?;

        let mut stmt = conn.prepare(&select)?;
        let mut rows = stmt.query([])?;
        let mut written = 0usize;
        while let Some(row) = rows.next()? {
            let record = (0..self.columns.len())
                .map(|i| row.get::<_, Value>(i).map(|v| v.to_string_value()))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            writer.write_record(&record).map_err(csv_err)?;
            written += 1;
        }
        writer.flush()?;

        tracing::info!(path = %self.path.display(), rows = written, "saved CSV");
        Ok(())
    }
}

fn infer_type(rows: &[Vec<String>], idx: usize) -> Inferred {
    let (mut strings, mut ints, mut floats) = (0usize, 0usize, 0usize);
    for row in rows {
        match Value::parse(&row[idx]) {
            Value::Null => {}
            Value::Integer(_) => ints += 1,
            Value::Real(f) if (f.round() - f).abs() > 0.001 => floats += 1,
            Value::Real(_) => ints += 1,
            _ => strings += 1,
        }
    }

    if (ints == 0 && floats == 0) || strings > ints.max(floats) {
        Inferred::Text
    } else if ints > floats {
        Inferred::Integer
    } else {
        Inferred::Real
    }
}

/// Empty cells are NULL whatever the column type
fn convert(cell: &str, ty: Inferred) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if ty == Inferred::Text {
        return Value::Text(cell.to_string());
    }
    match Value::parse(cell) {
        Value::Real(f) if ty == Inferred::Integer && (f.round() - f).abs() < 0.001 => {
            Value::Integer(f.round() as i64)
        }
        Value::Integer(i) if ty == Inferred::Real => Value::Real(i as f64),
        Value::Text(_) => Value::Text(cell.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for(Path::new("/data/My_Numbers2.csv")), "mynumbers");
        assert_eq!(table_name_for(Path::new("sheet.backup.csv")), "sheet");
        assert_eq!(table_name_for(Path::new("2024.csv")), "_table_");
    }

    #[test]
    fn test_infer_type() {
        let data = rows(&[&["1", "1.5", "a", ""], &["2", "2.25", "b", ""], &["3", "x", "4", ""]]);
        assert_eq!(infer_type(&data, 0), Inferred::Integer);
        assert_eq!(infer_type(&data, 1), Inferred::Real);
        assert_eq!(infer_type(&data, 2), Inferred::Text);
        assert_eq!(infer_type(&data, 3), Inferred::Text);
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert("", Inferred::Integer), Value::Null);
        assert_eq!(convert("4.0", Inferred::Integer), Value::Integer(4));
        assert_eq!(convert("4", Inferred::Real), Value::Real(4.0));
        assert_eq!(convert("", Inferred::Text), Value::Null);
        assert_eq!(convert("007", Inferred::Text), Value::from("007"));
        assert_eq!(convert("n/a", Inferred::Real), Value::from("n/a"));
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("numbers.csv");
        fs::write(&path, "NAME,DIGIT\none,1\ntwo,2\nfive,\n").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let source = load_csv(&conn, &path).unwrap();
        assert_eq!(source.table, "numbers");
        assert!(source.synthetic_id);

        let digit: i64 = conn
            .query_row("SELECT DIGIT FROM numbers WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(digit, 2);

        conn.execute("UPDATE numbers SET DIGIT = 22 WHERE NAME = 'two'", [])
            .unwrap();
        source.save(&conn).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert_eq!(saved, "NAME,DIGIT\none,1\ntwo,22\nfive,\n");
        assert!(dir.path().join("numbers.csv.bak").exists());
    }

    #[test]
    fn test_existing_id_column_is_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        fs::write(&path, "id,label\n10,a\n20,b\n").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let source = load_csv(&conn, &path).unwrap();
        assert!(!source.synthetic_id);

        let pk: i64 = conn
            .query_row(
                "SELECT pk FROM pragma_table_info('items') WHERE name = 'id'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(pk, 1);
    }

    #[test]
    fn test_empty_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        assert!(load_csv(&conn, &path).is_err());
    }
}
