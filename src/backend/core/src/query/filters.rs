//! Scoped filter building.
//!
//! Turns a scope predicate plus caller-supplied filters into one
//! [`QueryPredicate`]. The scope clause is always the first conjunct and
//! caller filters are only ever AND-ed after it.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::entity::{EntityKind, EntitySchema, FieldType};
use super::predicate::{QueryPredicate, ScalarValue};
use crate::scope::ScopePredicate;

/// Query keys owned by pagination and sorting, never treated as filters.
const RESERVED_KEYS: &[&str] = &["page", "pageSize", "prefetch", "activatePaginated", "sort"];

/// Filters supplied by the caller on a list request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerFilters {
    /// Free-text search across the entity's whitelist.
    pub search: Option<String>,
    /// Lower bound on the entity's date field.
    pub from: Option<String>,
    /// Upper bound on the entity's date field.
    pub to: Option<String>,
    /// Include soft-deleted rows.
    pub include_deleted: bool,
    /// Candidate exact-match filters, keyed by query parameter name.
    pub exact: BTreeMap<String, String>,
}

impl CallerFilters {
    /// Split raw query parameters into filters. Never fails: anything that
    /// is not a known filter key becomes an exact-filter candidate and is
    /// checked against the schema later.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let mut filters = Self::default();
        for (key, value) in params {
            let value = value.trim();
            match key.as_str() {
                k if RESERVED_KEYS.contains(&k) => {}
                "search" if !value.is_empty() => filters.search = Some(value.to_string()),
                "from" if !value.is_empty() => filters.from = Some(value.to_string()),
                "to" if !value.is_empty() => filters.to = Some(value.to_string()),
                "includeDeleted" => filters.include_deleted = parse_bool(value).unwrap_or(false),
                "search" | "from" | "to" => {}
                _ => {
                    filters.exact.insert(key.clone(), value.to_string());
                }
            }
        }
        filters
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_exact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exact.insert(key.into(), value.into());
        self
    }

    pub fn with_range(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.from = from.map(str::to_string);
        self.to = to.map(str::to_string);
        self
    }

    pub fn with_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn coerce(raw: &str, ty: FieldType) -> Option<ScalarValue> {
    match ty {
        FieldType::Integer => raw.parse().ok().map(ScalarValue::Integer),
        FieldType::Text => (!raw.is_empty()).then(|| ScalarValue::Text(raw.to_string())),
        FieldType::Boolean => parse_bool(raw).map(ScalarValue::Boolean),
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A bare date
/// bound covers the whole day on the `to` side.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time).and_utc())
}

/// The membership test a scope predicate imposes on an entity.
///
/// A schema without the field the scope restricts on can never be shown to a
/// restricted caller.
pub fn scope_clause(schema: &EntitySchema, scope: &ScopePredicate) -> QueryPredicate {
    match scope {
        ScopePredicate::Unrestricted => QueryPredicate::True,
        ScopePredicate::Nothing => QueryPredicate::False,
        ScopePredicate::Sedes(ids) => match schema.sede_field {
            Some(field) => QueryPredicate::In {
                field,
                values: ids.iter().map(|id| ScalarValue::Integer(id.0)).collect(),
            },
            None => QueryPredicate::False,
        },
        ScopePredicate::Subsedes(ids) => match schema.subsede_field {
            Some(field) => QueryPredicate::In {
                field,
                values: ids.iter().map(|id| ScalarValue::Integer(id.0)).collect(),
            },
            None => QueryPredicate::False,
        },
    }
}

/// Build the full query predicate for a list request.
pub fn build(kind: EntityKind, scope: &ScopePredicate, filters: &CallerFilters) -> QueryPredicate {
    let schema = kind.schema();
    let mut clauses = vec![scope_clause(schema, scope)];

    if let (Some(field), false) = (schema.soft_delete_field, filters.include_deleted) {
        clauses.push(QueryPredicate::IsNull { field });
    }

    for (key, raw) in &filters.exact {
        let Some(filter) = schema.exact_filter(key) else {
            debug!(entity = %kind, key = %key, "Ignoring unknown filter key");
            continue;
        };
        match coerce(raw, filter.ty) {
            Some(value) => clauses.push(QueryPredicate::Eq {
                field: filter.field,
                value,
            }),
            None => debug!(entity = %kind, key = %key, value = %raw, "Ignoring uncoercible filter value"),
        }
    }

    if let Some(needle) = filters.search.as_deref().filter(|s| !s.is_empty()) {
        clauses.push(QueryPredicate::or(
            schema
                .search_fields
                .iter()
                .map(|field| QueryPredicate::ContainsInsensitive {
                    field,
                    needle: needle.to_string(),
                })
                .collect(),
        ));
    }

    if let Some(field) = schema.date_field {
        let bounds = [
            (filters.from.as_deref(), false),
            (filters.to.as_deref(), true),
        ];
        for (raw, upper) in bounds {
            let Some(raw) = raw else { continue };
            match parse_bound(raw, upper) {
                Some(ts) if upper => clauses.push(QueryPredicate::Lte {
                    field,
                    value: ScalarValue::Timestamp(ts),
                }),
                Some(ts) => clauses.push(QueryPredicate::Gte {
                    field,
                    value: ScalarValue::Timestamp(ts),
                }),
                None => debug!(entity = %kind, value = %raw, "Ignoring unparseable date bound"),
            }
        }
    }

    QueryPredicate::and(clauses)
}
