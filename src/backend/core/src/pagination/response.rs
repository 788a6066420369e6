//! Paginated response types.
//!
//! This module provides:
//! - [`PaginationMeta`] computed from a window and a total count
//! - [`PrefetchedPage`] for pages materialized ahead of the request
//! - [`PaginatedResult`], the shape every list endpoint returns

use serde::{Deserialize, Serialize};

use super::window::QueryWindow;

// ═══════════════════════════════════════════════════════════════════════════════
// Pagination Meta
// ═══════════════════════════════════════════════════════════════════════════════

/// Page information for a paginated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Total number of matching items.
    pub total_items: u64,
    /// Number of items per page.
    pub items_per_page: u64,
    /// Requested page number (1-indexed), even when past the end.
    pub current_page: u64,
    /// Total number of pages; zero when nothing matches.
    pub total_pages: u64,
    /// Whether there is a next page.
    pub has_next_page: bool,
    /// Whether any page exists before the current one.
    pub has_previous_page: bool,
}

impl PaginationMeta {
    /// Metadata for a windowed request.
    ///
    /// The requested page is reported as-is. `has_previous_page` is true
    /// whenever some page before it exists, which covers out-of-range
    /// requests too.
    pub fn paged(window: &QueryWindow, total_items: u64) -> Self {
        let total_pages = window.total_pages(total_items);
        Self {
            total_items,
            items_per_page: window.page_size,
            current_page: window.page,
            total_pages,
            has_next_page: window.page < total_pages,
            has_previous_page: window.page > 1 && total_pages >= 1,
        }
    }

    /// Metadata for an unpaginated result: one page holding everything.
    pub fn single_page(total_items: u64) -> Self {
        Self {
            total_items,
            items_per_page: total_items,
            current_page: 1,
            total_pages: 1,
            has_next_page: false,
            has_previous_page: false,
        }
    }

    /// Get the next page number if available.
    pub fn next_page(&self) -> Option<u64> {
        self.has_next_page.then(|| self.current_page + 1)
    }

    /// Get the previous page number if available.
    pub fn previous_page(&self) -> Option<u64> {
        self.has_previous_page
            .then(|| (self.current_page - 1).min(self.total_pages))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Paginated Result
// ═══════════════════════════════════════════════════════════════════════════════

/// A page fetched ahead of the requested one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchedPage<T> {
    pub page_number: u64,
    pub items: Vec<T>,
}

/// The requested page, its metadata and any prefetched pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub pagination: PaginationMeta,
    pub items: Vec<T>,
    pub next_pages: Vec<PrefetchedPage<T>>,
}

impl<T> PaginatedResult<T> {
    /// Get the number of items on the requested page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map the items to a different type, prefetched pages included.
    pub fn map<U, F>(self, mut f: F) -> PaginatedResult<U>
    where
        F: FnMut(T) -> U,
    {
        let items = self.items.into_iter().map(&mut f).collect();
        let next_pages = self
            .next_pages
            .into_iter()
            .map(|p| PrefetchedPage {
                page_number: p.page_number,
                items: p.items.into_iter().map(&mut f).collect(),
            })
            .collect();
        PaginatedResult {
            pagination: self.pagination,
            items,
            next_pages,
        }
    }

    /// All items in page order: the requested page, then each prefetched one.
    pub fn into_all_items(self) -> Vec<T> {
        let mut all = self.items;
        for page in self.next_pages {
            all.extend(page.items);
        }
        all
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_first_page() {
        let meta = PaginationMeta::paged(&QueryWindow::new(1, 10, 0), 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next_page);
        assert!(!meta.has_previous_page);
        assert_eq!(meta.next_page(), Some(2));
        assert_eq!(meta.previous_page(), None);
    }

    #[test]
    fn test_meta_last_page() {
        let meta = PaginationMeta::paged(&QueryWindow::new(3, 10, 0), 25);
        assert!(!meta.has_next_page);
        assert!(meta.has_previous_page);
    }

    #[test]
    fn test_meta_out_of_range() {
        let meta = PaginationMeta::paged(&QueryWindow::new(5, 10, 0), 25);
        assert_eq!(meta.current_page, 5);
        assert!(!meta.has_next_page);
        assert!(meta.has_previous_page);
        assert_eq!(meta.previous_page(), Some(3));
    }

    #[test]
    fn test_meta_empty() {
        let meta = PaginationMeta::paged(&QueryWindow::new(1, 10, 0), 0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next_page);
        assert!(!meta.has_previous_page);

        let far = PaginationMeta::paged(&QueryWindow::new(4, 10, 0), 0);
        assert!(!far.has_previous_page);
    }

    #[test]
    fn test_single_page() {
        let meta = PaginationMeta::single_page(42);
        assert_eq!(meta.items_per_page, 42);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next_page);
    }

    #[test]
    fn test_serialized_shape() {
        let result = PaginatedResult {
            pagination: PaginationMeta::paged(&QueryWindow::new(1, 2, 1), 3),
            items: vec![1, 2],
            next_pages: vec![PrefetchedPage { page_number: 2, items: vec![3] }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pagination": {
                    "totalItems": 3, "itemsPerPage": 2, "currentPage": 1,
                    "totalPages": 2, "hasNextPage": true, "hasPreviousPage": false
                },
                "items": [1, 2],
                "nextPages": [{"pageNumber": 2, "items": [3]}]
            })
        );
    }

    #[test]
    fn test_map_and_flatten() {
        let result = PaginatedResult {
            pagination: PaginationMeta::single_page(3),
            items: vec![1, 2],
            next_pages: vec![PrefetchedPage { page_number: 2, items: vec![3] }],
        };
        let mapped = result.map(|i| i * 10);
        assert_eq!(mapped.into_all_items(), vec![10, 20, 30]);
    }
}
