//! Query parameter parsing for pagination.
//!
//! This module provides:
//! - The caller-facing pagination parameters
//! - Bounds validation against [`PaginationConfig`]
//! - Conversion into a [`QueryWindow`]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::window::QueryWindow;
use crate::config::PaginationConfig;
use crate::error::{CivicaError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Pagination Query
// ═══════════════════════════════════════════════════════════════════════════════

/// Pagination query parameters.
///
/// - `page`: Page number (1-indexed, default: 1)
/// - `pageSize`: Items per page (default from config, max 100)
/// - `prefetch`: Pages after `page` to include (default: 0)
/// - `activatePaginated`: `false` returns the whole result as one page
/// - `sort`: Comma-separated sort fields (e.g. `issued_at:desc,id`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetch: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub activate_paginated: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

fn parse_param<T: FromStr>(params: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            CivicaError::invalid_pagination(format!("'{key}' has an invalid value: {raw}"))
        }),
    }
}

impl PaginationQuery {
    /// Create a new empty pagination query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the pagination keys out of a raw query string map.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            page: parse_param(params, "page")?,
            page_size: parse_param(params, "pageSize")?,
            prefetch: parse_param(params, "prefetch")?,
            activate_paginated: parse_param(params, "activatePaginated")?,
            sort: params
                .get("sort")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn prefetch(mut self, prefetch: u64) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn paginated(mut self, activate: bool) -> Self {
        self.activate_paginated = Some(activate);
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Whether the caller wants a windowed result. Defaults to `true`.
    pub fn is_paginated(&self) -> bool {
        self.activate_paginated.unwrap_or(true)
    }

    /// Validate bounds and produce the window the paginator runs with.
    pub fn validate(&self, limits: &PaginationConfig) -> Result<QueryWindow> {
        let page = self.page.unwrap_or(super::MIN_PAGE_NUMBER);
        if page < super::MIN_PAGE_NUMBER {
            return Err(CivicaError::invalid_pagination("page must be at least 1"));
        }

        let page_size = self.page_size.unwrap_or(limits.default_page_size);
        if page_size == 0 || page_size > limits.max_page_size {
            return Err(CivicaError::invalid_pagination(format!(
                "pageSize must be between 1 and {}",
                limits.max_page_size
            )));
        }

        let prefetch = self.prefetch.unwrap_or(0);
        if prefetch > limits.max_prefetch {
            return Err(CivicaError::invalid_pagination(format!(
                "prefetch cannot exceed {}",
                limits.max_prefetch
            )));
        }

        Ok(QueryWindow::new(page, page_size, prefetch))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
