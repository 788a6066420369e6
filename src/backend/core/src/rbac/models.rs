//! RBAC data models: Permission, PolicyRequirement, Role and role assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::identity::{AccessLevel, RoleLevel, SedeId, SubjectId, SubsedeId};

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A permission represents an action on a resource type.
///
/// Permissions follow the format `resource:action`, for example:
/// - `fines:read`
/// - `grants:create`
/// - `roles:assign`
///
/// Matching is exact. There are no wildcards; super-admins bypass through
/// the evaluator instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parse a permission from a colon-separated string like `"fines:read"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, action) = s.split_once(':')?;
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self::new(resource, action))
    }

    /// Return the canonical string form `"resource:action"`.
    pub fn as_string(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Requirement
// ═══════════════════════════════════════════════════════════════════════════════

/// A capability check declared statically on an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequirement {
    pub permission: Permission,
    /// Only a super-admin can satisfy this requirement.
    #[serde(default)]
    pub is_super: bool,
}

impl PolicyRequirement {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            permission: Permission::new(resource, action),
            is_super: false,
        }
    }

    /// A requirement that only a super-admin satisfies.
    pub fn super_only(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            permission: Permission::new(resource, action),
            is_super: true,
        }
    }
}

impl fmt::Display for PolicyRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_super {
            write!(f, "{} (super-admin only)", self.permission)
        } else {
            write!(f, "{}", self.permission)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named role at a fixed administrative level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub level: RoleLevel,
    /// Global roles are visible in every sede and can only be created by a
    /// super-admin.
    pub is_global: bool,
    /// Owning sede for non-global roles.
    pub sede_id: Option<SedeId>,
    pub permissions: BTreeSet<Permission>,
    /// Built-in roles cannot be modified.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: RoleLevel) -> Self {
        let now = Utc::now();
        Self {
            id: RoleId::new(id),
            name: name.into(),
            level,
            is_global: false,
            sede_id: None,
            permissions: BTreeSet::new(),
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self.sede_id = None;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn with_sede(mut self, sede_id: SedeId) -> Self {
        self.sede_id = Some(sede_id);
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Permission strings in `resource:action` form.
    pub fn permission_strings(&self) -> Vec<String> {
        self.permissions.iter().map(Permission::as_string).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Assignment
// ═══════════════════════════════════════════════════════════════════════════════

/// Binds a subject to a role together with the access scope it operates at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub subject_id: SubjectId,
    pub role_id: RoleId,
    pub level: RoleLevel,
    pub access_level: AccessLevel,
    pub sede_id: Option<SedeId>,
    pub subsede_id: Option<SubsedeId>,
    pub assigned_by: SubjectId,
    pub assigned_at: DateTime<Utc>,
}
