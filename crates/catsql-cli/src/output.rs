//! Rendering filter results as text, CSV and JSON

use catsql_core::{nullify, FilterEngine, Result, ResultSet, Row, Value};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;

/// How results are printed
#[derive(Debug, Clone, Copy, Default)]
pub struct Format {
    /// Bare CSV for a single table, no titles
    pub csv: bool,
    /// Row counts instead of rows
    pub count: bool,
    /// Write NULL reversibly as `NULL`
    pub safe_null: bool,
}

/// Print every active table
///
/// In CSV mode exactly one table may be active.
pub fn write_tables<W, F>(out: &mut W, engine: &FilterEngine<'_>, format: Format, visible: F) -> Result<()>
where
    W: Write,
    F: Fn(&str) -> bool,
{
    if format.csv {
        if let Some(set) = engine.result_set()? {
            let columns = visible_indices(&set.columns, &visible);
            writeln!(out, "{}", csv_line(columns.iter().map(|&i| set.columns[i].as_str()))?)?;
            if format.count {
                writeln!(out, "{}", count_label(set.row_count() as u64))?;
            } else {
                write_rows(out, &set, &columns, format.safe_null)?;
            }
        }
        return Ok(());
    }

    if format.count {
        let counts = engine.counts()?;
        for (i, (query, (table, count))) in engine.queries().iter().zip(counts).enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            let columns: Vec<String> = query
                .visible_columns()
                .into_iter()
                .filter(|c| visible(c))
                .collect();
            write_title(out, &table, &columns)?;
            writeln!(out, "{}", count_label(count))?;
        }
        return Ok(());
    }

    for (i, set) in engine.results()?.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        let columns = visible_indices(&set.columns, &visible);
        let names: Vec<String> = columns.iter().map(|&i| set.columns[i].clone()).collect();
        write_title(out, &set.table, &names)?;
        write_rows(out, set, &columns, format.safe_null)?;
    }
    Ok(())
}

/// Save the single active table as `{count, results}` JSON
pub fn write_json<F>(path: &Path, engine: &FilterEngine<'_>, visible: F) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let rows: Vec<Row> = engine.rows()?;
    let results: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let mut map = row.to_json();
            map.retain(|column, _| visible(column));
            serde_json::Value::Object(map)
        })
        .collect();
    let document = serde_json::json!({
        "count": results.len(),
        "results": results,
    });
    fs::write(path, serde_json::to_string_pretty(&document)?)?;
    Ok(())
}

fn write_title<W: Write>(out: &mut W, table: &str, columns: &[String]) -> Result<()> {
    let header = csv_line(columns.iter().map(String::as_str))?;
    writeln!(out, "{table}")?;
    writeln!(out, "{}", "=".repeat(table.chars().count()))?;
    writeln!(out, "{header}")?;
    writeln!(out, "{}", "-".repeat(header.chars().count()))?;
    Ok(())
}

fn write_rows<W: Write>(out: &mut W, set: &ResultSet, columns: &[usize], safe_null: bool) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    for row in &set.rows {
        let record: Vec<Cow<'_, str>> = columns
            .iter()
            .map(|&i| match row.get_index(i) {
                Some(value) => cell_text(value, safe_null),
                None => Cow::Borrowed(""),
            })
            .collect();
        writer
            .write_record(record.iter().map(|c| c.as_bytes()))
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

fn cell_text(value: &Value, safe_null: bool) -> Cow<'_, str> {
    if safe_null {
        nullify::encode(value)
    } else {
        match value {
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string_value()),
        }
    }
}

/// One CSV record rendered without its line terminator
fn csv_line<'a, I>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(std::io::Error::from)?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let line = String::from_utf8_lossy(&bytes);
    Ok(line.trim_end_matches('\n').to_string())
}

fn visible_indices<F: Fn(&str) -> bool>(columns: &[String], visible: &F) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| visible(c))
        .map(|(i, _)| i)
        .collect()
}

fn count_label(count: u64) -> String {
    format!("({} row{})", count, if count == 1 { "" } else { "s" })
}
