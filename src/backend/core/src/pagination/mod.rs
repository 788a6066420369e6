//! Pagination for scoped entity queries.
//!
//! This module provides:
//! - [`PaginationQuery`]: caller-facing parameters and their validation
//! - [`QueryWindow`]: the validated page/size/prefetch triple
//! - [`Paginator`]: count, fetch and prefetch against a repository
//! - [`PaginatedResult`]: the response shape every list endpoint returns
//!
//! # Usage
//!
//! ```rust,ignore
//! use civica_core::pagination::{PaginationQuery, Paginator};
//!
//! let window = PaginationQuery::new().page(2).prefetch(1).validate(&limits)?;
//! let result = paginator.paginate(schema, &predicate, &order, window, true).await?;
//! ```

mod paginator;
mod query;
mod response;
mod window;

pub use paginator::Paginator;
pub use query::PaginationQuery;
pub use response::{PaginatedResult, PaginationMeta, PrefetchedPage};
pub use window::QueryWindow;

/// Default page size if not specified.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Default cap on prefetched pages.
pub const DEFAULT_MAX_PREFETCH: u64 = 5;

/// Minimum page number (1-indexed).
pub const MIN_PAGE_NUMBER: u64 = 1;
