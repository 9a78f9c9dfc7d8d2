//! Applying insert/update/delete operations to one table
//!
//! Operations run in the order given, each in its own statement; there is
//! no rollback. An update or delete that matches no row is a skip: it is
//! counted and logged, and processing continues.

use crate::error::Result;
use crate::schema::{quote_ident, Table};
use crate::session::Session;
use crate::value::{Value, ValueMap};
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One change to apply to a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ChangeOp {
    Insert {
        values: ValueMap,
    },
    Update {
        conditions: ValueMap,
        values: ValueMap,
    },
    Delete {
        conditions: ValueMap,
    },
}

impl ChangeOp {
    /// Short name of the operation
    pub fn kind(&self) -> OpKind {
        match self {
            ChangeOp::Insert { .. } => OpKind::Insert,
            ChangeOp::Update { .. } => OpKind::Update,
            ChangeOp::Delete { .. } => OpKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

/// An update or delete that matched no row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unmatched {
    pub kind: OpKind,
    pub conditions: ValueMap,
}

/// Counters for one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationResult {
    /// Rows changed by updates
    pub updates: usize,
    /// Rows inserted
    pub inserts: usize,
    /// Rows removed by deletes
    pub deletes: usize,
    /// Updates and deletes that matched nothing
    pub skips: usize,
    pub unmatched: Vec<Unmatched>,
}

impl ReconciliationResult {
    /// True if any row was written
    pub fn changed(&self) -> bool {
        self.updates + self.inserts + self.deletes > 0
    }
}

/// Applies change operations to one table of a session
pub struct ReconciliationEngine<'a> {
    session: &'a Session,
    table: Arc<Table>,
    result: ReconciliationResult,
}

impl<'a> ReconciliationEngine<'a> {
    /// Target `table`, failing with `UnknownTable` if it was not reflected
    pub fn new(session: &'a Session, table: &str) -> Result<Self> {
        let table = Arc::clone(session.catalog().table(table)?);
        Ok(Self {
            session,
            table,
            result: ReconciliationResult::default(),
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Set `values` on every row matching `conditions`
    pub fn update(&mut self, conditions: &ValueMap, values: &ValueMap) -> Result<usize> {
        self.check_values(values)?;
        let Some((clause, mut params)) = self.where_clause(conditions) else {
            self.skip(OpKind::Update, conditions);
            return Ok(0);
        };
        if values.is_empty() {
            tracing::debug!(table = %self.table.name, "update without values ignored");
            return Ok(0);
        }

        let assignments: Vec<String> = values
            .keys()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut all_params: Vec<Value> = values.values().cloned().collect();
        all_params.append(&mut params);

        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(&self.table.name),
            assignments.join(", "),
            clause
        );
        let affected = self.execute(&sql, &all_params)?;
        if affected == 0 {
            self.skip(OpKind::Update, conditions);
        } else {
            self.result.updates += affected;
        }
        Ok(affected)
    }

    /// Remove every row matching `conditions`
    pub fn delete(&mut self, conditions: &ValueMap) -> Result<usize> {
        let Some((clause, params)) = self.where_clause(conditions) else {
            self.skip(OpKind::Delete, conditions);
            return Ok(0);
        };

        let sql = format!("DELETE FROM {}{}", quote_ident(&self.table.name), clause);
        let affected = self.execute(&sql, &params)?;
        if affected == 0 {
            self.skip(OpKind::Delete, conditions);
        } else {
            self.result.deletes += affected;
        }
        Ok(affected)
    }

    /// Insert one row
    ///
    /// Primary-key columns given a blank value are left out so the database
    /// generates them.
    pub fn insert(&mut self, values: &ValueMap) -> Result<()> {
        self.check_values(values)?;
        let kept: Vec<(&String, &Value)> = values
            .iter()
            .filter(|(column, value)| !(value.is_blank() && self.table.primary_key.contains(*column)))
            .collect();

        let table = quote_ident(&self.table.name);
        let sql = if kept.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let columns: Vec<String> = kept.iter().map(|(c, _)| quote_ident(c)).collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                vec!["?"; kept.len()].join(", ")
            )
        };
        let params: Vec<Value> = kept.into_iter().map(|(_, v)| v.clone()).collect();
        self.execute(&sql, &params)?;
        self.result.inserts += 1;
        Ok(())
    }

    /// Apply one operation
    pub fn apply(&mut self, op: &ChangeOp) -> Result<()> {
        match op {
            ChangeOp::Insert { values } => self.insert(values),
            ChangeOp::Update { conditions, values } => self.update(conditions, values).map(drop),
            ChangeOp::Delete { conditions } => self.delete(conditions).map(drop),
        }
    }

    /// Apply operations in order
    ///
    /// Stops at the first fatal error; earlier operations stay applied.
    pub fn apply_all<'o, I>(&mut self, ops: I) -> Result<()>
    where
        I: IntoIterator<Item = &'o ChangeOp>,
    {
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    /// Counters so far
    pub fn result(&self) -> &ReconciliationResult {
        &self.result
    }

    /// Finish the run and return its counters
    pub fn finish(self) -> ReconciliationResult {
        tracing::info!(
            table = %self.table.name,
            updates = self.result.updates,
            inserts = self.result.inserts,
            deletes = self.result.deletes,
            skips = self.result.skips,
            "reconciled"
        );
        self.result
    }

    fn check_values(&self, values: &ValueMap) -> Result<()> {
        for column in values.keys() {
            self.table.column(column)?;
        }
        Ok(())
    }

    /// Render ` WHERE ...` for `conditions`; `None` if a column is unknown
    fn where_clause(&self, conditions: &ValueMap) -> Option<(String, Vec<Value>)> {
        let tolerance = self.session.tolerance();
        let mut params = Vec::new();
        let mut parts = Vec::with_capacity(conditions.len());
        for (name, value) in conditions {
            let column = self.table.find_column(name)?;
            let constraint = tolerance.constraint(column, value);
            parts.push(constraint.render(&quote_ident(name), &mut params));
        }
        if parts.is_empty() {
            return Some((String::new(), params));
        }
        Some((format!(" WHERE {}", parts.join(" AND ")), params))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        tracing::debug!(table = %self.table.name, %sql, "write");
        Ok(self
            .session
            .connection()
            .execute(sql, params_from_iter(params.iter()))?)
    }

    fn skip(&mut self, kind: OpKind, conditions: &ValueMap) {
        tracing::warn!(
            table = %self.table.name,
            ?kind,
            ?conditions,
            "no rows matched, skipping"
        );
        self.result.skips += 1;
        self.result.unmatched.push(Unmatched {
            kind,
            conditions: conditions.clone(),
        });
    }
}
