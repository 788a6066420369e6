//! Entity listing commands.
//!
//! Lists and fetches rows of any administrative entity. Scope is applied by
//! the server; the filters given here can only narrow what comes back.

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const ENTITIES: &[&str] = &["fines", "permits", "patrol-units", "field-agents", "users"];

#[derive(Subcommand)]
pub enum EntityCommands {
    /// List rows visible to the caller
    List {
        /// Entity path (fines, permits, patrol-units, field-agents, users)
        entity: String,

        /// Page number (1-indexed)
        #[arg(short, long)]
        page: Option<u64>,

        /// Rows per page
        #[arg(long)]
        page_size: Option<u64>,

        /// Number of following pages to fetch in the same request
        #[arg(long)]
        prefetch: Option<u64>,

        /// Return every matching row as a single page
        #[arg(long)]
        no_paginate: bool,

        /// Sort order, e.g. `-issued_at` or `amount:desc,folio`
        #[arg(short, long)]
        sort: Option<String>,

        /// Free-text search over the entity's search fields
        #[arg(long)]
        search: Option<String>,

        /// Lower bound on the entity's date field
        #[arg(long)]
        from: Option<String>,

        /// Upper bound on the entity's date field
        #[arg(long)]
        to: Option<String>,

        /// Include soft-deleted rows (needs `<entity>:read_deleted`)
        #[arg(long)]
        include_deleted: bool,

        /// Exact-match filter as `field=value` (repeatable)
        #[arg(short, long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
    },

    /// Fetch one row by id
    Get {
        /// Entity path
        entity: String,

        /// Row id
        id: i64,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationMeta {
    total_items: u64,
    items_per_page: u64,
    current_page: u64,
    total_pages: u64,
    has_next_page: bool,
    has_previous_page: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrefetchedPage {
    page_number: u64,
    items: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginatedResult {
    items: Vec<Value>,
    pagination: PaginationMeta,
    #[serde(default)]
    next_pages: Vec<PrefetchedPage>,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn entity_path(entity: &str) -> Result<String> {
    if !ENTITIES.contains(&entity) {
        bail!(
            "Unknown entity '{}'. Expected one of: {}",
            entity,
            ENTITIES.join(", ")
        );
    }
    Ok(format!("/api/v1/{}", entity))
}

fn parse_filter(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid filter '{}'. Expected FIELD=VALUE", raw),
    }
}

// ── Execute ─────────────────────────────────────────────────────────────────

pub async fn execute(cmd: EntityCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        EntityCommands::List {
            entity,
            page,
            page_size,
            prefetch,
            no_paginate,
            sort,
            search,
            from,
            to,
            include_deleted,
            filters,
        } => {
            let path = entity_path(&entity)?;

            let mut query: Vec<(String, String)> = Vec::new();
            let numeric = [("page", page), ("pageSize", page_size), ("prefetch", prefetch)];
            for (key, value) in numeric {
                if let Some(v) = value {
                    query.push((key.to_string(), v.to_string()));
                }
            }
            if no_paginate {
                query.push(("activatePaginated".into(), "false".into()));
            }
            let text = [("sort", sort), ("search", search), ("from", from), ("to", to)];
            for (key, value) in text {
                if let Some(v) = value {
                    query.push((key.to_string(), v));
                }
            }
            if include_deleted {
                query.push(("includeDeleted".into(), "true".into()));
            }
            for raw in &filters {
                query.push(parse_filter(raw)?);
            }

            let result: PaginatedResult = client.get(&path, &query).await?;

            match format {
                OutputFormat::Table => {
                    output::print_rows(&result.items);
                    let meta = &result.pagination;
                    output::print_info(&format!(
                        "Page {}/{} ({} rows total, {} per page)",
                        meta.current_page, meta.total_pages, meta.total_items, meta.items_per_page
                    ));
                    for next in &result.next_pages {
                        output::print_header(&format!("Page {}", next.page_number));
                        output::print_rows(&next.items);
                    }
                }
                _ => output::print_item(&result, format)?,
            }
        }

        EntityCommands::Get { entity, id } => {
            let path = format!("{}/{}", entity_path(&entity)?, id);
            let row: Value = client.get(&path, &[]).await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("{} #{}", entity, id));
                    if let Some(obj) = row.as_object() {
                        for (key, value) in obj {
                            let shown = match value {
                                Value::String(s) => s.clone(),
                                Value::Null => "-".to_string(),
                                other => other.to_string(),
                            };
                            output::print_detail(key, &shown);
                        }
                    }
                }
                _ => output::print_item(&row, format)?,
            }
        }
    }

    Ok(())
}
