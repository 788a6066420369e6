//! In-memory repository.

use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{Repository, Row};
use crate::error::Result;
use crate::query::{compare_json_values, EntityKind, EntitySchema, QueryPredicate, SortDirection, SortField};

/// JSON rows per entity kind.
///
/// Sorting is stable and treats null as the greatest value, so the order
/// matches what Postgres returns for the same `ORDER BY`.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<DashMap<EntityKind, Vec<Row>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: EntityKind, row: Row) {
        self.tables.entry(kind).or_default().push(row);
    }

    pub fn extend(&self, kind: EntityKind, rows: impl IntoIterator<Item = Row>) {
        self.tables.entry(kind).or_default().extend(rows);
    }

    /// Number of stored rows, matching or not.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.tables.get(&kind).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    fn matching(&self, schema: &EntitySchema, predicate: &QueryPredicate) -> Vec<Row> {
        self.tables
            .get(&schema.kind)
            .map(|rows| rows.iter().filter(|r| predicate.matches(r)).cloned().collect())
            .unwrap_or_default()
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[SortField]) -> Ordering {
    for sort in order {
        let ord = compare_json_values(a.get(sort.field), b.get(sort.field));
        let ord = match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn count(&self, schema: &EntitySchema, predicate: &QueryPredicate) -> Result<u64> {
        Ok(self.matching(schema, predicate).len() as u64)
    }

    async fn page(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Row>> {
        let mut rows = self.matching(schema, predicate);
        rows.sort_by(|a, b| compare_rows(a, b, order));

        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }
}
