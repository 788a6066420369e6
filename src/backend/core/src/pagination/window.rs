//! Query windows: which page, how large, and how far to prefetch.

use serde::{Deserialize, Serialize};

/// A validated request window.
///
/// `page >= 1`, `page_size` within the configured bounds and `prefetch`
/// no larger than the configured maximum. Built by
/// [`super::PaginationQuery::validate`]; the paginator trusts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryWindow {
    /// Requested page number (1-indexed).
    pub page: u64,
    /// Number of items per page.
    pub page_size: u64,
    /// Pages after `page` to materialize eagerly.
    pub prefetch: u64,
}

impl QueryWindow {
    pub fn new(page: u64, page_size: u64, prefetch: u64) -> Self {
        Self {
            page,
            page_size,
            prefetch,
        }
    }

    /// Get the SQL OFFSET value for `page`.
    pub fn offset(&self) -> u64 {
        self.offset_of(self.page)
    }

    /// Get the SQL OFFSET value for any page under this page size.
    pub fn offset_of(&self, page: u64) -> u64 {
        page.saturating_sub(1) * self.page_size
    }

    /// Total pages for a given item count. Zero items means zero pages.
    pub fn total_pages(&self, total_items: u64) -> u64 {
        total_items.div_ceil(self.page_size)
    }

    /// The requested page plus prefetched pages that actually exist.
    ///
    /// Empty when the requested page is past the end.
    pub fn pages_to_fetch(&self, total_pages: u64) -> std::ops::RangeInclusive<u64> {
        let last = self.page.saturating_add(self.prefetch).min(total_pages);
        self.page..=last
    }
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self::new(1, super::DEFAULT_PAGE_SIZE, 0)
    }
}
