//! Entity kinds and their static query schemas.
//!
//! Every field name that ends up in SQL comes from one of these schemas.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::sort::SortDirection;

/// Scalar type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Text,
    Boolean,
}

/// An exact-match filter the caller may use: query key -> column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactFilter {
    pub key: &'static str,
    pub field: &'static str,
    pub ty: FieldType,
}

const fn exact(key: &'static str, field: &'static str, ty: FieldType) -> ExactFilter {
    ExactFilter { key, field, ty }
}

/// Static description of how an entity is scoped, filtered and ordered.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Resource name used in permission strings.
    pub resource: &'static str,
    pub id_field: &'static str,
    pub sede_field: Option<&'static str>,
    pub subsede_field: Option<&'static str>,
    /// Text fields free-text search runs across.
    pub search_fields: &'static [&'static str],
    /// Timestamp field the `from`/`to` range applies to.
    pub date_field: Option<&'static str>,
    pub exact_filters: &'static [ExactFilter],
    /// Deletion timestamp; rows with a value are hidden by default.
    pub soft_delete_field: Option<&'static str>,
    pub sortable: &'static [&'static str],
    pub default_order: (&'static str, SortDirection),
}

impl EntitySchema {
    pub fn exact_filter(&self, key: &str) -> Option<&ExactFilter> {
        self.exact_filters.iter().find(|f| f.key == key)
    }

    pub fn sortable_field(&self, name: &str) -> Option<&'static str> {
        self.sortable.iter().copied().find(|f| *f == name)
    }
}

/// Entity families governed by tenant scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Fines,
    Permits,
    PatrolUnits,
    FieldAgents,
    Users,
}

static FINES: EntitySchema = EntitySchema {
    kind: EntityKind::Fines,
    table: "fines",
    resource: "fines",
    id_field: "id",
    sede_field: Some("sede_id"),
    subsede_field: Some("subsede_id"),
    search_fields: &["folio", "plate", "offender_name"],
    date_field: Some("issued_at"),
    exact_filters: &[
        exact("infractionTypeId", "infraction_type_id", FieldType::Integer),
        exact("agentId", "agent_id", FieldType::Integer),
        exact("status", "status", FieldType::Text),
        exact("paid", "paid", FieldType::Boolean),
    ],
    soft_delete_field: Some("deleted_at"),
    sortable: &["id", "folio", "issued_at", "amount", "status"],
    default_order: ("issued_at", SortDirection::Desc),
};

static PERMITS: EntitySchema = EntitySchema {
    kind: EntityKind::Permits,
    table: "permits",
    resource: "permits",
    id_field: "id",
    sede_field: Some("sede_id"),
    subsede_field: Some("subsede_id"),
    search_fields: &["code", "holder_name", "business_name"],
    date_field: Some("valid_from"),
    exact_filters: &[
        exact("categoryId", "category_id", FieldType::Integer),
        exact("typeId", "permit_type_id", FieldType::Integer),
        exact("active", "active", FieldType::Boolean),
    ],
    soft_delete_field: Some("deleted_at"),
    sortable: &["id", "code", "holder_name", "valid_from", "valid_until"],
    default_order: ("valid_from", SortDirection::Desc),
};

static PATROL_UNITS: EntitySchema = EntitySchema {
    kind: EntityKind::PatrolUnits,
    table: "patrol_units",
    resource: "patrol_units",
    id_field: "id",
    sede_field: Some("sede_id"),
    subsede_field: Some("subsede_id"),
    search_fields: &["unit_number", "plate", "brand"],
    date_field: Some("created_at"),
    exact_filters: &[
        exact("unitTypeId", "unit_type_id", FieldType::Integer),
        exact("active", "active", FieldType::Boolean),
    ],
    soft_delete_field: Some("deleted_at"),
    sortable: &["id", "unit_number", "plate", "created_at"],
    default_order: ("unit_number", SortDirection::Asc),
};

static FIELD_AGENTS: EntitySchema = EntitySchema {
    kind: EntityKind::FieldAgents,
    table: "field_agents",
    resource: "field_agents",
    id_field: "id",
    sede_field: Some("sede_id"),
    subsede_field: Some("subsede_id"),
    search_fields: &["badge_number", "first_name", "last_name", "document_number"],
    date_field: Some("hired_at"),
    exact_filters: &[
        exact("rankId", "rank_id", FieldType::Integer),
        exact("patrolUnitId", "patrol_unit_id", FieldType::Integer),
        exact("active", "active", FieldType::Boolean),
    ],
    soft_delete_field: Some("deleted_at"),
    sortable: &["id", "badge_number", "last_name", "hired_at"],
    default_order: ("last_name", SortDirection::Asc),
};

static USERS: EntitySchema = EntitySchema {
    kind: EntityKind::Users,
    table: "users",
    resource: "users",
    id_field: "id",
    sede_field: Some("sede_id"),
    subsede_field: Some("subsede_id"),
    search_fields: &["username", "email", "full_name"],
    date_field: Some("created_at"),
    exact_filters: &[
        exact("roleId", "role_id", FieldType::Text),
        exact("active", "active", FieldType::Boolean),
    ],
    soft_delete_field: Some("deleted_at"),
    sortable: &["id", "username", "full_name", "created_at"],
    default_order: ("username", SortDirection::Asc),
};

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Fines,
        Self::Permits,
        Self::PatrolUnits,
        Self::FieldAgents,
        Self::Users,
    ];

    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            Self::Fines => &FINES,
            Self::Permits => &PERMITS,
            Self::PatrolUnits => &PATROL_UNITS,
            Self::FieldAgents => &FIELD_AGENTS,
            Self::Users => &USERS,
        }
    }

    /// URL path segment.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Fines => "fines",
            Self::Permits => "permits",
            Self::PatrolUnits => "patrol-units",
            Self::FieldAgents => "field-agents",
            Self::Users => "users",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.path() == path)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
