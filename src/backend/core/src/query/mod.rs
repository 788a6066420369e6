//! Scoped query building.
//!
//! - [`EntityKind`] and its static [`EntitySchema`]
//! - [`QueryPredicate`] trees over [`ScalarValue`]s
//! - [`build`]: scope clause first, caller filters after
//! - [`parse_sort`]: whitelisted, total sort orders

mod entity;
mod filters;
mod predicate;
mod sort;

pub use entity::{EntityKind, EntitySchema, ExactFilter, FieldType};
pub use filters::{build, scope_clause, CallerFilters};
pub use predicate::{compare_json_values, QueryPredicate, ScalarValue};
pub use sort::{parse_sort, SortDirection, SortField};
