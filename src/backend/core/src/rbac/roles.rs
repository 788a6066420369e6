//! Predefined roles with default permission sets.
//!
//! Civica ships with one built-in role per administrative level:
//!
//! | Role        | Level        | Description                                          |
//! |-------------|--------------|------------------------------------------------------|
//! | super_admin | SUPER_ADMIN  | Tenant-wide administration, bypasses scope           |
//! | estatal     | ESTATAL      | Administers sedes, grants and lower roles            |
//! | municipal   | MUNICIPAL    | Administers a subsede and its operative staff        |
//! | operativo   | OPERATIVO    | Read-only field access                               |

use super::models::{Permission, Role};
use crate::identity::RoleLevel;
use crate::query::EntityKind;

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedRole {
    SuperAdmin,
    Estatal,
    Municipal,
    Operativo,
}

impl PredefinedRole {
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Estatal => "estatal",
            Self::Municipal => "municipal",
            Self::Operativo => "operativo",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Estatal => "Estatal",
            Self::Municipal => "Municipal",
            Self::Operativo => "Operativo",
        }
    }

    pub fn level(&self) -> RoleLevel {
        match self {
            Self::SuperAdmin => RoleLevel::SuperAdmin,
            Self::Estatal => RoleLevel::Estatal,
            Self::Municipal => RoleLevel::Municipal,
            Self::Operativo => RoleLevel::Operativo,
        }
    }

    /// Return the set of permissions for this predefined role.
    pub fn permissions(&self) -> Vec<Permission> {
        let read_all = EntityKind::ALL
            .iter()
            .map(|k| Permission::new(k.schema().resource, "read"));

        match self {
            // Super-admins bypass the evaluator; the explicit set is kept for
            // display and for tokens minted from this template.
            Self::SuperAdmin | Self::Estatal => read_all
                .chain([
                    Permission::new("grants", "read"),
                    Permission::new("grants", "create"),
                    Permission::new("grants", "revoke"),
                    Permission::new("roles", "read"),
                    Permission::new("roles", "create"),
                    Permission::new("roles", "update"),
                    Permission::new("roles", "assign"),
                ])
                .collect(),
            Self::Municipal => read_all
                .chain([
                    Permission::new("grants", "read"),
                    Permission::new("roles", "read"),
                    Permission::new("roles", "create"),
                    Permission::new("roles", "assign"),
                ])
                .collect(),
            Self::Operativo => read_all
                .filter(|p| p.resource != "users")
                .collect(),
        }
    }

    /// Build a global system `Role` from this template.
    pub fn to_role(&self) -> Role {
        Role::new(self.id(), self.name(), self.level())
            .global()
            .system()
            .with_permissions(self.permissions())
    }

    pub fn all() -> Vec<PredefinedRole> {
        vec![Self::SuperAdmin, Self::Estatal, Self::Municipal, Self::Operativo]
    }

    pub fn all_defaults() -> Vec<Role> {
        Self::all().into_iter().map(|r| r.to_role()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operativo_read_only() {
        let role = PredefinedRole::Operativo.to_role();
        assert!(role.has_permission(&Permission::new("fines", "read")));
        assert!(!role.has_permission(&Permission::new("users", "read")));
        assert!(!role.has_permission(&Permission::new("grants", "create")));
        assert!(!role.has_permission(&Permission::new("roles", "assign")));
    }

    #[test]
    fn test_municipal_cannot_grant() {
        let role = PredefinedRole::Municipal.to_role();
        assert!(role.has_permission(&Permission::new("roles", "assign")));
        assert!(!role.has_permission(&Permission::new("grants", "create")));
    }

    #[test]
    fn test_all_defaults() {
        let roles = PredefinedRole::all_defaults();
        assert_eq!(roles.len(), 4);
        assert!(roles.iter().all(|r| r.is_system && r.is_global));
        assert_eq!(roles[0].level, RoleLevel::SuperAdmin);
    }
}
