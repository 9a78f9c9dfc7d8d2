//! Parser for highlighter-format tabular diffs
//!
//! The first column of every row is an action tag:
//!
//! | tag | meaning |
//! |-----|---------|
//! | `@@` | header, names the columns |
//! | empty | unchanged context row |
//! | `...` | elided rows |
//! | `:` | reordered row |
//! | `+++` | inserted row |
//! | `---` | deleted row |
//! | `->`, `-->`, ... | modified row; changed cells read `old<tag>new` |
//!
//! Schema rows (`!`) describe column changes and are rejected.

use crate::error::{Error, Result};
use crate::nullify;
use crate::reconcile::ChangeOp;
use crate::value::{Value, ValueMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One row of a diff that changes data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRow {
    Insert(Vec<String>),
    Delete(Vec<String>),
    /// Old and new cells of a modified row
    Modify {
        old: Vec<String>,
        new: Vec<String>,
    },
}

/// A parsed diff: column names plus the rows that change data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightDiff {
    pub columns: Vec<String>,
    pub rows: Vec<DiffRow>,
}

impl HighlightDiff {
    /// Parse a diff file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parse diff text from a reader
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut diff = HighlightDiff::default();
        let mut header_seen = false;

        for (idx, result) in csv_reader.records().enumerate() {
            let line = idx + 1;
            let record = result.map_err(|e| Error::DiffParse {
                line,
                message: e.to_string(),
            })?;
            let Some(tag) = record.get(0) else {
                continue;
            };
            let mut cells: Vec<String> = record.iter().skip(1).map(str::to_string).collect();

            if tag == "@@" {
                if header_seen {
                    return Err(parse_error(line, "more than one header row"));
                }
                diff.columns = cells;
                header_seen = true;
                continue;
            }
            if tag.starts_with('!') {
                if cells.iter().all(String::is_empty) {
                    continue;
                }
                return Err(parse_error(line, "schema changes are not supported"));
            }
            if matches!(tag, "" | "..." | ":") {
                continue;
            }
            if !header_seen {
                return Err(parse_error(line, "data row before '@@' header"));
            }

            cells.resize(diff.columns.len(), String::new());
            let row = match tag {
                "+++" => DiffRow::Insert(cells),
                "---" => DiffRow::Delete(cells),
                sep if is_modify_tag(sep) => {
                    let (old, new) = cells
                        .iter()
                        .map(|cell| match cell.split_once(sep) {
                            Some((old, new)) => (old.to_string(), new.to_string()),
                            None => (cell.clone(), cell.clone()),
                        })
                        .unzip();
                    DiffRow::Modify { old, new }
                }
                other => return Err(parse_error(line, format!("unknown action tag '{other}'"))),
            };
            diff.rows.push(row);
        }

        tracing::debug!(columns = diff.columns.len(), rows = diff.rows.len(), "parsed diff");
        Ok(diff)
    }

    /// Convert to change operations
    ///
    /// Rows are located by the `keys` columns, or by every column when no
    /// key column is present in the diff. Empty cells are NULL; with
    /// `safe_null` cells are also decoded with [`nullify::decode`].
    pub fn to_change_ops(&self, keys: &[String], safe_null: bool) -> Vec<ChangeOp> {
        let key_indices: Vec<usize> = keys
            .iter()
            .filter_map(|k| self.columns.iter().position(|c| c == k))
            .collect();
        let locate: Vec<usize> = if key_indices.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            key_indices
        };

        let cell = |text: &str| -> Value {
            if text.is_empty() {
                Value::Null
            } else if safe_null {
                nullify::decode(text)
            } else {
                Value::from(text)
            }
        };
        let pick = |cells: &[String], indices: &[usize]| -> ValueMap {
            indices
                .iter()
                .map(|&i| (self.columns[i].clone(), cell(&cells[i])))
                .collect()
        };

        self.rows
            .iter()
            .filter_map(|row| match row {
                DiffRow::Insert(cells) => Some(ChangeOp::Insert {
                    values: pick(cells, &(0..self.columns.len()).collect::<Vec<_>>()),
                }),
                DiffRow::Delete(cells) => Some(ChangeOp::Delete {
                    conditions: pick(cells, &locate),
                }),
                DiffRow::Modify { old, new } => {
                    let changed: Vec<usize> = (0..self.columns.len())
                        .filter(|&i| old[i] != new[i])
                        .collect();
                    if changed.is_empty() {
                        return None;
                    }
                    Some(ChangeOp::Update {
                        conditions: pick(old, &locate),
                        values: pick(new, &changed),
                    })
                }
            })
            .collect()
    }
}

/// One or more `-` followed by `>`
fn is_modify_tag(tag: &str) -> bool {
    tag.strip_suffix('>')
        .is_some_and(|dashes| !dashes.is_empty() && dashes.chars().all(|c| c == '-'))
}

fn parse_error(line: usize, message: impl Into<String>) -> Error {
    Error::DiffParse {
        line,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET_DIFF: &str = "\
@@,NAME,DIGIT
,one,1
->,two,2->22
...,...,...
+++,six,6
---,five,
";

    fn map(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse() {
        let diff = HighlightDiff::parse(SHEET_DIFF.as_bytes()).unwrap();
        assert_eq!(diff.columns, vec!["NAME", "DIGIT"]);
        assert_eq!(diff.rows.len(), 3);
        assert_eq!(
            diff.rows[0],
            DiffRow::Modify {
                old: vec!["two".to_string(), "2".to_string()],
                new: vec!["two".to_string(), "22".to_string()],
            }
        );
        assert_eq!(
            diff.rows[2],
            DiffRow::Delete(vec!["five".to_string(), String::new()])
        );
    }

    #[test]
    fn test_modify_tag() {
        assert!(is_modify_tag("->"));
        assert!(is_modify_tag("--->"));
        assert!(!is_modify_tag(">"));
        assert!(!is_modify_tag("-+>"));
        assert!(!is_modify_tag("---"));
    }

    #[test]
    fn test_longer_separator_keeps_arrows_in_values() {
        let text = "@@,K,V\n-->,a,x->y-->z\n";
        let diff = HighlightDiff::parse(text.as_bytes()).unwrap();
        assert_eq!(
            diff.rows[0],
            DiffRow::Modify {
                old: vec!["a".to_string(), "x->y".to_string()],
                new: vec!["a".to_string(), "z".to_string()],
            }
        );
    }

    #[test]
    fn test_change_ops_without_keys() {
        let diff = HighlightDiff::parse(SHEET_DIFF.as_bytes()).unwrap();
        let ops = diff.to_change_ops(&[], false);
        assert_eq!(
            ops,
            vec![
                ChangeOp::Update {
                    conditions: map(&[("NAME", Value::from("two")), ("DIGIT", Value::from("2"))]),
                    values: map(&[("DIGIT", Value::from("22"))]),
                },
                ChangeOp::Insert {
                    values: map(&[("NAME", Value::from("six")), ("DIGIT", Value::from("6"))]),
                },
                ChangeOp::Delete {
                    conditions: map(&[("NAME", Value::from("five")), ("DIGIT", Value::Null)]),
                },
            ]
        );
    }

    #[test]
    fn test_change_ops_with_keys() {
        let text = "@@,id,label\n->,3,old->new\n---,4,gone\n";
        let diff = HighlightDiff::parse(text.as_bytes()).unwrap();
        let ops = diff.to_change_ops(&["id".to_string()], false);
        assert_eq!(
            ops[0],
            ChangeOp::Update {
                conditions: map(&[("id", Value::from("3"))]),
                values: map(&[("label", Value::from("new"))]),
            }
        );
        assert_eq!(
            ops[1],
            ChangeOp::Delete {
                conditions: map(&[("id", Value::from("4"))]),
            }
        );
    }

    #[test]
    fn test_safe_null() {
        let text = "@@,K,V\n+++,a,NULL\n+++,b,_NULL\n";
        let diff = HighlightDiff::parse(text.as_bytes()).unwrap();

        let ops = diff.to_change_ops(&[], true);
        assert_eq!(
            ops[0],
            ChangeOp::Insert {
                values: map(&[("K", Value::from("a")), ("V", Value::Null)]),
            }
        );
        assert_eq!(
            ops[1],
            ChangeOp::Insert {
                values: map(&[("K", Value::from("b")), ("V", Value::from("NULL"))]),
            }
        );

        let raw = diff.to_change_ops(&[], false);
        assert_eq!(
            raw[0],
            ChangeOp::Insert {
                values: map(&[("K", Value::from("a")), ("V", Value::from("NULL"))]),
            }
        );
    }

    #[test]
    fn test_schema_row_rejected() {
        let text = "!,,+++\n@@,K,V\n";
        let err = HighlightDiff::parse(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DiffParse { line: 1, .. }));

        let blank = "!,,\n@@,K,V\n+++,a,b\n";
        assert_eq!(HighlightDiff::parse(blank.as_bytes()).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_data_before_header() {
        let err = HighlightDiff::parse("+++,a,b\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_unknown_tag() {
        let err = HighlightDiff::parse("@@,K\n???,a\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::DiffParse { line: 2, .. }));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            HighlightDiff::load("/nonexistent/patch.csv"),
            Err(Error::FileRead { .. })
        ));
    }
}
