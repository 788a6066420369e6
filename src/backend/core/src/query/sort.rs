//! Sort parameter parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::entity::EntitySchema;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Get the SQL keyword for this direction.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// A schema field plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortField {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(field: &'static str, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn asc(field: &'static str) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: &'static str) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Parse a comma-separated sort string against a schema.
///
/// Accepts `field:asc`, `field:desc`, `-field` and `+field`. Fields that are
/// not sortable for the entity are skipped. Falls back to the schema default,
/// and always ends on the id field so the order is total.
pub fn parse_sort(schema: &EntitySchema, raw: Option<&str>) -> Vec<SortField> {
    let mut fields: Vec<SortField> = Vec::new();

    for part in raw.unwrap_or_default().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (name, direction) = if let Some((name, dir)) = part.split_once(':') {
            let direction = match dir.trim().to_lowercase().as_str() {
                "desc" | "d" | "-1" => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            (name.trim(), direction)
        } else if let Some(stripped) = part.strip_prefix('-') {
            (stripped, SortDirection::Desc)
        } else if let Some(stripped) = part.strip_prefix('+') {
            (stripped, SortDirection::Asc)
        } else {
            (part, SortDirection::Asc)
        };

        match schema.sortable_field(name) {
            Some(field) if !fields.iter().any(|f| f.field == field) => {
                fields.push(SortField::new(field, direction));
            }
            Some(_) => {}
            None => debug!(entity = %schema.kind, field = name, "Ignoring unsortable field"),
        }
    }

    if fields.is_empty() {
        let (field, direction) = schema.default_order;
        fields.push(SortField::new(field, direction));
    }
    if !fields.iter().any(|f| f.field == schema.id_field) {
        fields.push(SortField::asc(schema.id_field));
    }
    fields
}
