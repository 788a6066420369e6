//! Role hierarchy: which role levels an actor may create, assign or manage.
//!
//! | actor        | may manage                                  |
//! |--------------|---------------------------------------------|
//! | SUPER_ADMIN  | SUPER_ADMIN, ESTATAL, MUNICIPAL, OPERATIVO  |
//! | ESTATAL      | ESTATAL, MUNICIPAL                          |
//! | MUNICIPAL    | MUNICIPAL, OPERATIVO                        |
//! | OPERATIVO    | nothing                                     |

mod registry;
mod store;
mod units;

pub use registry::{NewRole, RoleAssignmentRequest, RoleRegistry, RoleUpdate};
pub use store::{MemoryRoleStore, RoleStore};
pub use units::{check_unit, MemoryUnitDirectory, UnitDirectory};

use crate::error::{CivicaError, Result};
use crate::identity::{AccessLevel, RoleLevel};

/// Whether an actor at `actor` may manage roles at `target`.
pub fn can_manage(target: RoleLevel, actor: RoleLevel) -> bool {
    use RoleLevel::*;
    match actor {
        SuperAdmin => true,
        Estatal => matches!(target, Estatal | Municipal),
        Municipal => matches!(target, Municipal | Operativo),
        Operativo => false,
    }
}

/// Validate that `actor` may grant a role of level `target`.
///
/// The top level can only be handed out by someone who already holds it,
/// regardless of the table.
pub fn validate_grant_of_level(actor: RoleLevel, target: RoleLevel) -> Result<()> {
    if target.is_top() && !actor.is_top() {
        return Err(CivicaError::hierarchy_violation(actor, target));
    }
    if !can_manage(target, actor) {
        return Err(CivicaError::hierarchy_violation(actor, target));
    }
    Ok(())
}

/// Access levels a principal holding a role of `level` may operate at.
pub fn allowed_access_levels(level: RoleLevel) -> &'static [AccessLevel] {
    match level {
        RoleLevel::SuperAdmin => &[AccessLevel::Tenant],
        RoleLevel::Estatal => &[AccessLevel::Tenant, AccessLevel::Sede],
        RoleLevel::Municipal => &[AccessLevel::Subsede],
        RoleLevel::Operativo => &[AccessLevel::Operativo, AccessLevel::Subsede],
    }
}

/// A role's level and the access scope assigned with it must agree.
pub fn validate_level_scope(role_level: RoleLevel, access_level: AccessLevel) -> Result<()> {
    if allowed_access_levels(role_level).contains(&access_level) {
        Ok(())
    } else {
        Err(CivicaError::level_scope_mismatch(role_level, access_level))
    }
}
