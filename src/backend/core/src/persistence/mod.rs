//! Persistence collaborator.
//!
//! The core only ever talks to storage through [`Repository`]: a count and a
//! windowed page over a [`QueryPredicate`]. Two backends ship:
//!
//! - [`MemoryRepository`]: JSON rows in a concurrent map, for tests and
//!   local runs
//! - [`PgRepository`]: PostgreSQL via sqlx, with the predicate compiled to
//!   parameterized SQL
//!
//! [`PgGrantStore`], [`PgRoleStore`] and [`PgUnitDirectory`] share the pool of [`Database`].

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::{
    compile_predicate, Database, PgGrantStore, PgRepository, PgRoleStore, PgUnitDirectory, SqlFragment,
    SqlParam,
};

use async_trait::async_trait;

use crate::error::Result;
use crate::query::{EntitySchema, QueryPredicate, SortField};

/// An entity row as returned to callers.
pub type Row = serde_json::Value;

/// Read access to scoped entity tables.
///
/// Implementations must support concurrent calls; the paginator issues the
/// page queries of one request in parallel.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Number of rows matching `predicate`.
    async fn count(&self, schema: &EntitySchema, predicate: &QueryPredicate) -> Result<u64>;

    /// Rows matching `predicate` in `order`, skipping `offset`. `limit = None`
    /// returns everything after the offset.
    async fn page(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Row>>;
}
