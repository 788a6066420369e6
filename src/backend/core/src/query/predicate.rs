//! Query predicates over entity rows.
//!
//! A predicate is a plain value tree. The memory repository evaluates it
//! against JSON rows with [`QueryPredicate::matches`]; the Postgres repository
//! compiles it to parameterized SQL.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// A typed literal in a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl ScalarValue {
    /// Compare a JSON value against this literal. `None` when the types do
    /// not line up or the JSON value is null.
    pub fn compare_json(&self, value: &Value) -> Option<Ordering> {
        match self {
            Self::Integer(i) => value
                .as_i64()
                .map(|v| v.cmp(i))
                .or_else(|| value.as_f64().and_then(|v| v.partial_cmp(&(*i as f64)))),
            Self::Text(s) => value.as_str().map(|v| v.cmp(s.as_str())),
            Self::Boolean(b) => value.as_bool().map(|v| v.cmp(b)),
            Self::Timestamp(ts) => value
                .as_str()
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|v| v.with_timezone(&Utc).cmp(ts)),
        }
    }
}

/// Boolean filter over an entity row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryPredicate {
    True,
    False,
    Eq {
        field: &'static str,
        value: ScalarValue,
    },
    In {
        field: &'static str,
        values: Vec<ScalarValue>,
    },
    ContainsInsensitive {
        field: &'static str,
        needle: String,
    },
    Gte {
        field: &'static str,
        value: ScalarValue,
    },
    Lte {
        field: &'static str,
        value: ScalarValue,
    },
    IsNull {
        field: &'static str,
    },
    And {
        clauses: Vec<QueryPredicate>,
    },
    Or {
        clauses: Vec<QueryPredicate>,
    },
}

fn field_value<'a>(row: &'a Value, field: &str) -> Option<&'a Value> {
    row.get(field).filter(|v| !v.is_null())
}

impl QueryPredicate {
    pub fn and(clauses: Vec<QueryPredicate>) -> Self {
        Self::And { clauses }
    }

    pub fn or(clauses: Vec<QueryPredicate>) -> Self {
        Self::Or { clauses }
    }

    /// Evaluate against a JSON object row with SQL-like null semantics:
    /// comparisons against a missing or null field are false.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Eq { field, value } => field_value(row, field)
                .and_then(|v| value.compare_json(v))
                .is_some_and(|o| o == Ordering::Equal),
            Self::In { field, values } => field_value(row, field).is_some_and(|v| {
                values
                    .iter()
                    .any(|value| value.compare_json(v) == Some(Ordering::Equal))
            }),
            Self::ContainsInsensitive { field, needle } => field_value(row, field)
                .and_then(Value::as_str)
                .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase())),
            Self::Gte { field, value } => field_value(row, field)
                .and_then(|v| value.compare_json(v))
                .is_some_and(|o| o != Ordering::Less),
            Self::Lte { field, value } => field_value(row, field)
                .and_then(|v| value.compare_json(v))
                .is_some_and(|o| o != Ordering::Greater),
            Self::IsNull { field } => field_value(row, field).is_none(),
            Self::And { clauses } => clauses.iter().all(|c| c.matches(row)),
            Self::Or { clauses } => clauses.iter().any(|c| c.matches(row)),
        }
    }
}

/// Total order over JSON scalars used for in-memory sorting.
///
/// Nulls sort after every value, matching Postgres `ASC NULLS LAST`.
pub fn compare_json_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
            },
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}
