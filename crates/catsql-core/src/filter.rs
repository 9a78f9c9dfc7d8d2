//! Multi-table filter composition
//!
//! A [`FilterEngine`] starts with one [`Query`] per reflected table and
//! narrows that set through chained operations. A table that cannot take an
//! operation (missing column, predicate that does not compile against it)
//! leaves the active set; the reason is kept as a [`Rejection`] instead of
//! being raised, so one filter can run over tables with different schemas.

use crate::error::{Error, Result};
use crate::expand::{expand_file, expansion_path};
use crate::query::{OrderTerm, Predicate, Query, ResultSet, Row};
use crate::schema::Table;
use crate::session::Session;
use crate::value::{Value, ValueMap};
use std::sync::Arc;

/// Why a table left the active set
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The table lacks columns the operation names
    SchemaMismatch { missing: Vec<String> },
    /// A predicate failed to parse or execute against the table
    Predicate { message: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::SchemaMismatch { missing } => {
                write!(f, "missing column(s): {}", missing.join(", "))
            }
            Rejection::Predicate { message } => write!(f, "predicate failed: {}", message),
        }
    }
}

/// A table dropped by a narrowing operation
#[derive(Debug, Clone)]
pub struct Dropped {
    pub table: String,
    pub operation: &'static str,
    pub reason: Rejection,
}

/// Requested ordering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// The projection if any, else the primary key, else all columns
    #[default]
    Default,
    /// No ORDER BY at all
    Unordered,
    /// Explicit terms
    Columns(Vec<OrderTerm>),
}

impl OrderBy {
    /// Parse order tokens
    ///
    /// Each token may hold a comma separated list of `<column>[+|-]`. The
    /// token `none` disables ordering; no tokens at all means default order.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut terms = Vec::new();
        for token in tokens {
            for part in token.as_ref().split(',').map(str::trim) {
                if part.is_empty() {
                    continue;
                }
                if part.eq_ignore_ascii_case("none") {
                    return OrderBy::Unordered;
                }
                terms.push(OrderTerm::parse(part));
            }
        }
        if terms.is_empty() {
            OrderBy::Default
        } else {
            OrderBy::Columns(terms)
        }
    }
}

/// The active set of per-table queries
pub struct FilterEngine<'a> {
    session: &'a Session,
    queries: Vec<Query>,
    dropped: Vec<Dropped>,
}

impl<'a> FilterEngine<'a> {
    /// Start with every table in the session's catalog
    pub fn new(session: &'a Session) -> Self {
        let queries = session
            .catalog()
            .iter()
            .map(|table| Query::new(Arc::clone(table)))
            .collect();
        Self {
            session,
            queries,
            dropped: Vec::new(),
        }
    }

    /// Start with a projection already applied
    pub fn with_columns<S: AsRef<str>>(session: &'a Session, columns: &[S]) -> Self {
        let mut engine = Self::new(session);
        engine.select_columns(columns);
        engine
    }

    /// Restrict the projection; tables missing any column are dropped
    pub fn select_columns<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self.narrow("select_columns", |query| {
            require(query.table(), &columns)?;
            query.set_projection(columns.clone());
            Ok(())
        })
    }

    /// Deduplicate result rows
    pub fn distinct(&mut self) -> &mut Self {
        for query in &mut self.queries {
            query.set_distinct();
        }
        self
    }

    /// AND raw SQL conditions onto every table
    ///
    /// Validity is checked by fetching one row; tables where the conditions
    /// do not compile or run are dropped.
    pub fn where_raw<S: AsRef<str>>(&mut self, expressions: &[S]) -> &mut Self {
        let session = self.session;
        self.narrow("where_raw", |query| {
            let mut trial = query.clone();
            for expression in expressions {
                trial.push_predicate(Predicate::Raw(expression.as_ref().to_string()));
            }
            trial.probe(session.connection()).map_err(|e| Rejection::Predicate {
                message: e.to_string(),
            })?;
            *query = trial;
            Ok(())
        })
    }

    /// Match column values with tolerant equality
    pub fn where_equals(&mut self, conditions: &ValueMap) -> &mut Self {
        let wanted: Vec<(String, Wanted)> = conditions
            .iter()
            .map(|(column, value)| (column.clone(), Wanted::One(value.clone())))
            .collect();
        self.apply_wanted("where_equals", &wanted)
    }

    /// Like [`where_equals`](Self::where_equals), expanding `@file` values
    ///
    /// A text value starting with `@` names a JSON file. Every value stored
    /// under a key equal to the column name, at any depth, joins a set and the
    /// column must match one of them.
    /// The file is only read when some active table has the column.
    pub fn where_equals_expanded(&mut self, conditions: &ValueMap) -> Result<&mut Self> {
        let mut wanted = Vec::with_capacity(conditions.len());
        for (column, value) in conditions {
            let used = self
                .queries
                .iter()
                .any(|query| query.table().find_column(column).is_some());
            let entry = match expansion_path(value) {
                Some(path) if used => Wanted::AnyOf(expand_file(path, column)?),
                // every active table lacks the column and is dropped unread
                Some(_) => Wanted::AnyOf(Vec::new()),
                None => Wanted::One(value.clone()),
            };
            wanted.push((column.clone(), entry));
        }
        Ok(self.apply_wanted("where_equals_expanded", &wanted))
    }

    /// Keep rows whose visible columns, joined as text, contain `pattern`
    pub fn grep(&mut self, pattern: &str, case_sensitive: bool) -> &mut Self {
        for query in &mut self.queries {
            let columns = query.visible_columns();
            query.push_predicate(Predicate::Contains {
                columns,
                pattern: pattern.to_string(),
                case_sensitive,
            });
        }
        self
    }

    /// Set the row order; tables missing an ordering column are dropped
    pub fn order(&mut self, order_by: &OrderBy) -> &mut Self {
        match order_by {
            OrderBy::Unordered => {
                for query in &mut self.queries {
                    query.set_order(Vec::new());
                }
                self
            }
            OrderBy::Default => {
                for query in &mut self.queries {
                    let terms = default_order(query);
                    query.set_order(terms);
                }
                self
            }
            OrderBy::Columns(terms) => self.narrow("order", |query| {
                let columns: Vec<String> = terms.iter().map(|t| t.column.clone()).collect();
                require(query.table(), &columns)?;
                query.set_order(terms.clone());
                Ok(())
            }),
        }
    }

    /// Cap the rows returned per table
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        for query in &mut self.queries {
            query.set_limit(limit);
        }
        self
    }

    /// Number of active tables
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Names of the active tables
    pub fn table_names(&self) -> Vec<&str> {
        self.queries.iter().map(Query::table_name).collect()
    }

    /// The active queries
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Tables dropped so far, with the reason
    pub fn rejections(&self) -> &[Dropped] {
        &self.dropped
    }

    /// The single active table's result set, if any table is active
    pub fn result_set(&self) -> Result<Option<ResultSet>> {
        match self.queries.as_slice() {
            [] => Ok(None),
            [query] => Ok(Some(query.fetch(self.session.connection())?)),
            _ => Err(self.ambiguous_tables()),
        }
    }

    /// Rows of the single active table; empty when no table remains
    pub fn rows(&self) -> Result<Vec<Row>> {
        Ok(self
            .result_set()?
            .map(|set| set.rows)
            .unwrap_or_default())
    }

    /// The single row of the single active table
    pub fn row(&self) -> Result<Option<Row>> {
        let Some(mut set) = self.result_set()? else {
            return Ok(None);
        };
        match set.rows.len() {
            0 | 1 => Ok(set.rows.pop()),
            count => Err(Error::AmbiguousRows {
                table: set.table,
                count,
            }),
        }
    }

    /// Result sets of every active table, in table order
    pub fn results(&self) -> Result<Vec<ResultSet>> {
        let conn = self.session.connection();
        self.queries
            .iter()
            .map(|query| query.fetch(conn).map_err(Error::from))
            .collect()
    }

    /// Row count of every active table
    pub fn counts(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.session.connection();
        self.queries
            .iter()
            .map(|query| Ok((query.table_name().to_string(), query.count(conn)?)))
            .collect()
    }

    fn ambiguous_tables(&self) -> Error {
        Error::AmbiguousTables {
            tables: self.table_names().into_iter().map(str::to_string).collect(),
        }
    }

    fn apply_wanted(&mut self, operation: &'static str, wanted: &[(String, Wanted)]) -> &mut Self {
        let tolerance = self.session.tolerance();
        self.narrow(operation, |query| {
            let columns: Vec<String> = wanted.iter().map(|(c, _)| c.clone()).collect();
            require(query.table(), &columns)?;

            let table = query.table();
            let predicates: Vec<Predicate> = wanted
                .iter()
                .filter_map(|(name, entry)| {
                    let column = table.find_column(name)?;
                    Some(match entry {
                        Wanted::One(value) => Predicate::Match {
                            column: name.clone(),
                            constraint: tolerance.constraint(column, value),
                        },
                        Wanted::AnyOf(values) => Predicate::AnyOf {
                            column: name.clone(),
                            constraints: values
                                .iter()
                                .map(|v| tolerance.constraint(column, v))
                                .collect(),
                        },
                    })
                })
                .collect();

            for predicate in predicates {
                query.push_predicate(predicate);
            }
            Ok(())
        })
    }

    /// Run `attempt` on every active query, keeping only those it accepts
    fn narrow<F>(&mut self, operation: &'static str, mut attempt: F) -> &mut Self
    where
        F: FnMut(&mut Query) -> std::result::Result<(), Rejection>,
    {
        for mut query in std::mem::take(&mut self.queries) {
            match attempt(&mut query) {
                Ok(()) => self.queries.push(query),
                Err(reason) => {
                    tracing::debug!(
                        table = query.table_name(),
                        operation,
                        %reason,
                        "dropped table from filter"
                    );
                    self.dropped.push(Dropped {
                        table: query.table_name().to_string(),
                        operation,
                        reason,
                    });
                }
            }
        }
        self
    }
}

/// Requested value(s) for one column
enum Wanted {
    One(Value),
    AnyOf(Vec<Value>),
}

fn require(table: &Table, columns: &[String]) -> std::result::Result<(), Rejection> {
    let missing = table.missing_columns(columns.iter().map(String::as_str));
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Rejection::SchemaMismatch { missing })
    }
}

fn default_order(query: &Query) -> Vec<OrderTerm> {
    if let Some(projection) = query.projection() {
        return projection.iter().map(OrderTerm::asc).collect();
    }
    let table = query.table();
    if !table.primary_key.is_empty() {
        table.primary_key.iter().map(OrderTerm::asc).collect()
    } else {
        table.columns.iter().map(|c| OrderTerm::asc(&c.name)).collect()
    }
}
