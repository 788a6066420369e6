//! Prefetching paginator.
//!
//! Runs one count query, then the requested page and its prefetch window
//! concurrently against the repository. Failures are returned as-is; there is
//! no retry.

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use super::response::{PaginatedResult, PaginationMeta, PrefetchedPage};
use super::window::QueryWindow;
use crate::error::Result;
use crate::observability::metrics;
use crate::persistence::{Repository, Row};
use crate::query::{EntitySchema, QueryPredicate, SortField};

/// Executes predicates against a [`Repository`] and shapes the result.
#[derive(Clone)]
pub struct Paginator {
    repo: Arc<dyn Repository>,
}

impl Paginator {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Fetch a window of rows.
    ///
    /// With `activate_paginated == false` the whole ordered result comes back
    /// as a single page and `window` is ignored.
    #[instrument(skip(self, schema, predicate, order), fields(entity = %schema.kind))]
    pub async fn paginate(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
        window: QueryWindow,
        activate_paginated: bool,
    ) -> Result<PaginatedResult<Row>> {
        let started = Instant::now();
        let result = if activate_paginated {
            self.paged(schema, predicate, order, window).await
        } else {
            self.unpaged(schema, predicate, order).await
        };
        metrics::record_page_query(schema.kind.path(), started.elapsed().as_secs_f64());
        result
    }

    async fn unpaged(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
    ) -> Result<PaginatedResult<Row>> {
        let items = self.repo.page(schema, predicate, order, 0, None).await?;
        debug!(items = items.len(), "Unpaginated fetch");
        Ok(PaginatedResult {
            pagination: PaginationMeta::single_page(items.len() as u64),
            items,
            next_pages: Vec::new(),
        })
    }

    async fn paged(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
        window: QueryWindow,
    ) -> Result<PaginatedResult<Row>> {
        let total_items = self.repo.count(schema, predicate).await?;
        let pagination = PaginationMeta::paged(&window, total_items);

        let pages: Vec<u64> = window.pages_to_fetch(pagination.total_pages).collect();
        debug!(
            total_items,
            total_pages = pagination.total_pages,
            page = window.page,
            fetching = pages.len(),
            "Paginating"
        );

        let fetched = try_join_all(pages.iter().map(|&page| {
            self.repo.page(
                schema,
                predicate,
                order,
                window.offset_of(page),
                Some(window.page_size),
            )
        }))
        .await?;

        let mut fetched = pages.into_iter().zip(fetched);
        let items = match fetched.next() {
            Some((_, rows)) => rows,
            None => Vec::new(),
        };
        let next_pages = fetched
            .map(|(page_number, items)| PrefetchedPage { page_number, items })
            .collect();

        Ok(PaginatedResult {
            pagination,
            items,
            next_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryRepository;
    use crate::query::EntityKind;
    use serde_json::json;

    fn repo_with(n: i64) -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new();
        repo.extend(
            EntityKind::Permits,
            (1..=n).map(|i| json!({"id": i, "sede_id": 1, "subsede_id": 1})),
        );
        Arc::new(repo)
    }

    fn order() -> Vec<SortField> {
        vec![SortField::asc("id")]
    }

    #[tokio::test]
    async fn test_first_page_with_prefetch() {
        let paginator = Paginator::new(repo_with(25));
        let result = paginator
            .paginate(
                EntityKind::Permits.schema(),
                &QueryPredicate::True,
                &order(),
                QueryWindow::new(1, 10, 2),
                true,
            )
            .await
            .unwrap();

        assert_eq!(result.items.len(), 10);
        assert_eq!(result.next_pages.len(), 2);
        assert_eq!(result.next_pages[0].page_number, 2);
        assert_eq!(result.next_pages[1].items.len(), 5);
        assert_eq!(result.pagination.total_pages, 3);
    }

    #[tokio::test]
    async fn test_no_phantom_pages() {
        let paginator = Paginator::new(repo_with(25));
        let result = paginator
            .paginate(
                EntityKind::Permits.schema(),
                &QueryPredicate::True,
                &order(),
                QueryWindow::new(3, 10, 5),
                true,
            )
            .await
            .unwrap();

        assert_eq!(result.items.len(), 5);
        assert!(result.next_pages.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_empty() {
        let paginator = Paginator::new(repo_with(25));
        let result = paginator
            .paginate(
                EntityKind::Permits.schema(),
                &QueryPredicate::True,
                &order(),
                QueryWindow::new(5, 10, 2),
                true,
            )
            .await
            .unwrap();

        assert!(result.items.is_empty());
        assert!(result.next_pages.is_empty());
        assert!(!result.pagination.has_next_page);
        assert!(result.pagination.has_previous_page);
    }

    #[tokio::test]
    async fn test_unpaginated_returns_everything() {
        let paginator = Paginator::new(repo_with(25));
        let result = paginator
            .paginate(
                EntityKind::Permits.schema(),
                &QueryPredicate::True,
                &order(),
                QueryWindow::new(2, 10, 2),
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.items.len(), 25);
        assert!(result.next_pages.is_empty());
        assert_eq!(result.pagination.total_pages, 1);
        assert!(!result.pagination.has_next_page);
    }
}
