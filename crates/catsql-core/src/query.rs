//! Per-table query pipelines and their results

use crate::schema::{quote_ident, Table};
use crate::tolerance::Constraint;
use crate::value::Value;
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;

/// Separator placed between columns when searching a whole row
pub const GREP_SEPARATOR: &str = " // ";

/// A row-selection condition
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Free-form SQL boolean expression
    Raw(String),
    /// One column matched by a tolerant-equality constraint
    Match { column: String, constraint: Constraint },
    /// One column matched by any of several constraints
    AnyOf {
        column: String,
        constraints: Vec<Constraint>,
    },
    /// Substring search across the concatenation of `columns`
    ///
    /// The case-insensitive form is a `LIKE '%pattern%'`, so `_` and `%` in
    /// the pattern are wildcards. The case-sensitive form is a literal
    /// `instr` match.
    Contains {
        columns: Vec<String>,
        pattern: String,
        case_sensitive: bool,
    },
}

impl Predicate {
    fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::Raw(sql) => format!("({sql})"),
            Predicate::Match { column, constraint } => {
                constraint.render(&quote_ident(column), params)
            }
            Predicate::AnyOf {
                column,
                constraints,
            } => {
                if constraints.is_empty() {
                    return "0".to_string();
                }
                let column = quote_ident(column);
                let parts: Vec<String> = constraints
                    .iter()
                    .map(|c| c.render(&column, params))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Predicate::Contains {
                columns,
                pattern,
                case_sensitive,
            } => {
                let concat = if columns.is_empty() {
                    "''".to_string()
                } else {
                    columns
                        .iter()
                        .map(|c| format!("COALESCE(CAST({} AS TEXT), '')", quote_ident(c)))
                        .collect::<Vec<_>>()
                        .join(&format!(" || '{GREP_SEPARATOR}' || "))
                };
                params.push(Value::Text(pattern.clone()));
                if *case_sensitive {
                    format!("instr({concat}, ?) > 0")
                } else {
                    format!("({concat}) LIKE '%' || ? || '%'")
                }
            }
        }
    }
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub descending: bool,
}

impl OrderTerm {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Parse `<column>[+|-]`; no suffix means ascending
    pub fn parse(token: &str) -> Self {
        if let Some(column) = token.strip_suffix('-') {
            Self::desc(column)
        } else if let Some(column) = token.strip_suffix('+') {
            Self::asc(column)
        } else {
            Self::asc(token)
        }
    }
}

/// The selection pipeline for one table
#[derive(Debug, Clone)]
pub struct Query {
    table: Arc<Table>,
    projection: Option<Vec<String>>,
    distinct: bool,
    predicates: Vec<Predicate>,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
}

impl Query {
    /// A query selecting every row and column of `table`
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            projection: None,
            distinct: false,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    /// Columns a reader of this query sees
    pub fn visible_columns(&self) -> Vec<String> {
        match &self.projection {
            Some(columns) => columns.clone(),
            None => self.table.column_names(),
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub(crate) fn set_projection(&mut self, columns: Vec<String>) {
        self.projection = Some(columns);
    }

    pub(crate) fn set_distinct(&mut self) {
        self.distinct = true;
    }

    pub(crate) fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub(crate) fn set_order(&mut self, order: Vec<OrderTerm>) {
        self.order = order;
    }

    /// Repeated limits keep the tightest cap
    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.limit = Some(self.limit.map_or(limit, |l| l.min(limit)));
    }

    /// Render the SELECT statement and its positional parameters
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.render(None, true)
    }

    fn render(&self, limit: Option<u64>, ordered: bool) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        match &self.projection {
            Some(columns) => sql.push_str(
                &columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            None => sql.push('*'),
        }
        sql.push_str(" FROM ");
        sql.push_str(&quote_ident(&self.table.name));

        if !self.predicates.is_empty() {
            let clauses: Vec<String> = self
                .predicates
                .iter()
                .map(|p| p.render(&mut params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if ordered && !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|t| {
                    format!(
                        "{} {}",
                        quote_ident(&t.column),
                        if t.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        let limit = match (self.limit, limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let Some(n) = limit {
            let n = n.min(i64::MAX as u64);
            sql.push_str(&format!(" LIMIT {n}"));
        }

        (sql, params)
    }

    /// Run the query with at most one row, discarding the result
    pub(crate) fn probe(&self, conn: &Connection) -> rusqlite::Result<()> {
        let (sql, params) = self.render(Some(1), true);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        rows.next()?;
        Ok(())
    }

    /// Run the query and collect every row
    pub(crate) fn fetch(&self, conn: &Connection) -> rusqlite::Result<ResultSet> {
        let (sql, params) = self.to_sql();
        tracing::debug!(table = %self.table.name, %sql, "select");

        let mut stmt = conn.prepare(&sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(Row {
                columns: Arc::clone(&columns),
                values,
            });
        }

        Ok(ResultSet {
            table: self.table.name.clone(),
            columns,
            rows,
        })
    }

    /// Count the rows the query would return
    pub(crate) fn count(&self, conn: &Connection) -> rusqlite::Result<u64> {
        let (inner, params) = self.render(None, false);
        let sql = format!("SELECT COUNT(*) FROM ({inner})");
        let count: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Rows read from one table
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Source table
    pub table: String,
    /// Column names, in select order
    pub columns: Arc<[String]>,
    /// Row data
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A row of data, addressable by column name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Get a cell value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Get a cell value by column index
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column name → value pairs, for JSON output
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn sheet() -> Arc<Table> {
        Arc::new(Table {
            name: "sheet".to_string(),
            columns: vec![Column::new("NAME", 0, "TEXT"), Column::new("DIGIT", 1, "INTEGER")],
            primary_key: Vec::new(),
        })
    }

    #[test]
    fn test_order_term_parse() {
        assert_eq!(OrderTerm::parse("X-"), OrderTerm::desc("X"));
        assert_eq!(OrderTerm::parse("X+"), OrderTerm::asc("X"));
        assert_eq!(OrderTerm::parse("X"), OrderTerm::asc("X"));
    }

    #[test]
    fn test_render_plain() {
        let query = Query::new(sheet());
        let (sql, params) = query.to_sql();
        assert_eq!(sql, "SELECT * FROM \"sheet\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_full_pipeline() {
        let mut query = Query::new(sheet());
        query.set_projection(vec!["NAME".to_string()]);
        query.set_distinct();
        query.push_predicate(Predicate::Raw("DIGIT > 2".to_string()));
        query.push_predicate(Predicate::Match {
            column: "NAME".to_string(),
            constraint: Constraint::Exact(Value::from("foUR")),
        });
        query.set_order(vec![OrderTerm::desc("DIGIT")]);
        query.set_limit(10);
        query.set_limit(20);

        let (sql, params) = query.to_sql();
        assert_eq!(
            sql,
            "SELECT DISTINCT \"NAME\" FROM \"sheet\" WHERE (DIGIT > 2) AND \"NAME\" = ? \
             ORDER BY \"DIGIT\" DESC LIMIT 10"
        );
        assert_eq!(params, vec![Value::from("foUR")]);
    }

    #[test]
    fn test_render_contains() {
        let mut query = Query::new(sheet());
        query.push_predicate(Predicate::Contains {
            columns: vec!["NAME".to_string(), "DIGIT".to_string()],
            pattern: "wo".to_string(),
            case_sensitive: false,
        });
        let (sql, params) = query.to_sql();
        assert!(sql.contains("WHERE (COALESCE(CAST(\"NAME\" AS TEXT), '') || ' // ' || "));
        assert!(sql.ends_with(") LIKE '%' || ? || '%'"));
        assert_eq!(params, vec![Value::from("wo")]);
    }

    #[test]
    fn test_render_limit_fits_sqlite_integer() {
        let mut query = Query::new(sheet());
        query.set_limit(u64::MAX);
        let (sql, _) = query.to_sql();
        assert!(sql.ends_with(&format!(" LIMIT {}", i64::MAX)));
    }

    #[test]
    fn test_render_empty_any_of_matches_nothing() {
        let mut query = Query::new(sheet());
        query.push_predicate(Predicate::AnyOf {
            column: "NAME".to_string(),
            constraints: Vec::new(),
        });
        let (sql, _) = query.to_sql();
        assert!(sql.ends_with("WHERE 0"));
    }

    #[test]
    fn test_fetch_and_count() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE sheet (NAME TEXT, DIGIT INTEGER);
             INSERT INTO sheet VALUES ('one', 1), ('two', 2), ('five', NULL);",
        )
        .unwrap();

        let mut query = Query::new(sheet());
        query.set_order(vec![OrderTerm::asc("DIGIT")]);
        let result = query.fetch(&conn).unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.rows[0].get("NAME"), Some(&Value::from("five")));
        assert_eq!(result.rows[0].get("DIGIT"), Some(&Value::Null));
        assert_eq!(result.rows[2].get("DIGIT"), Some(&Value::Integer(2)));
        assert_eq!(query.count(&conn).unwrap(), 3);

        query.set_limit(1);
        assert_eq!(query.fetch(&conn).unwrap().row_count(), 1);
    }
}
