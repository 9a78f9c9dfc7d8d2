//! Type-aware tolerant equality
//!
//! Both the filter engine and the reconciliation engine decide "is this row
//! equal to that value" through [`Tolerance::constraint`], so a row found by a
//! filter is the same row a patch would update.

use crate::schema::Column;
use crate::value::Value;

/// Default slack for float-classified comparisons
pub const DEFAULT_EPSILON: f64 = 1e-5;

/// Epsilon used for float-tolerant equality
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub epsilon: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Tolerance {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Build the constraint that matches `value` in `column`
    ///
    /// - NULL matches with `IS NULL`.
    /// - Float columns match within the open interval (v - epsilon, v + epsilon).
    /// - Untyped columns do the same when the value is a real, or text with a
    ///   decimal point that parses as a number.
    /// - Everything else is exact.
    pub fn constraint(&self, column: &Column, value: &Value) -> Constraint {
        if value.is_null() {
            return Constraint::IsNull;
        }

        let approximate = if column.is_float() {
            value.as_f64()
        } else if column.is_blank() {
            match value {
                Value::Real(f) => Some(*f),
                Value::Text(s) if s.contains('.') => s.trim().parse::<f64>().ok(),
                _ => None,
            }
        } else {
            None
        };

        match approximate {
            Some(v) => Constraint::Within {
                low: v - self.epsilon,
                high: v + self.epsilon,
            },
            None => Constraint::Exact(value.clone()),
        }
    }
}

/// A single-column match condition
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    IsNull,
    Exact(Value),
    /// Open interval
    Within { low: f64, high: f64 },
}

impl Constraint {
    /// Render against an already-quoted column expression, pushing parameters
    pub fn render(&self, column: &str, params: &mut Vec<Value>) -> String {
        match self {
            Constraint::IsNull => format!("{column} IS NULL"),
            Constraint::Exact(value) => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            Constraint::Within { low, high } => {
                params.push(Value::Real(*low));
                params.push(Value::Real(*high));
                format!("({column} > ? AND {column} < ?)")
            }
        }
    }
}
