//! Tenant scope resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::grants::GrantTarget;
use crate::identity::{AccessLevel, IdentityContext, SedeId, SubsedeId};
use crate::observability::metrics;

/// Visibility of a caller over organizational units.
///
/// A pure value: the query builder turns it into a filter on the entity's
/// sede or subsede field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum ScopePredicate {
    /// Every row.
    Unrestricted,
    /// Rows whose sede field is in the set.
    Sedes(BTreeSet<SedeId>),
    /// Rows whose subsede field is in the set.
    Subsedes(BTreeSet<SubsedeId>),
    /// No row at all.
    Nothing,
}

impl ScopePredicate {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Whether a unit identified by `sede`/`subsede` falls inside the scope.
    pub fn admits(&self, sede: Option<SedeId>, subsede: Option<SubsedeId>) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Nothing => false,
            Self::Sedes(ids) => sede.is_some_and(|s| ids.contains(&s)),
            Self::Subsedes(ids) => subsede.is_some_and(|s| ids.contains(&s)),
        }
    }

    /// Whether a grant target falls inside the scope.
    pub fn admits_target(&self, target: &GrantTarget) -> bool {
        match *target {
            GrantTarget::Sede { sede_id } => self.admits(Some(sede_id), None),
            GrantTarget::Subsede { sede_id, subsede_id } => {
                self.admits(Some(sede_id), Some(subsede_id))
            }
        }
    }
}

/// Resolve a caller's visibility.
///
/// The super-admin bypass is checked before any level logic. SUBSEDE and
/// OPERATIVO callers with no own subsede and no grants see nothing.
pub fn resolve_scope(
    access_level: AccessLevel,
    own_sede: Option<SedeId>,
    own_subsede: Option<SubsedeId>,
    sede_grants: &[SedeId],
    subsede_grants: &[SubsedeId],
    is_super_admin: bool,
) -> ScopePredicate {
    if is_super_admin {
        return ScopePredicate::Unrestricted;
    }

    match access_level {
        AccessLevel::Tenant => ScopePredicate::Unrestricted,
        AccessLevel::Sede => {
            let ids: BTreeSet<SedeId> = own_sede
                .into_iter()
                .chain(sede_grants.iter().copied())
                .collect();
            if ids.is_empty() {
                ScopePredicate::Nothing
            } else {
                ScopePredicate::Sedes(ids)
            }
        }
        AccessLevel::Subsede | AccessLevel::Operativo => {
            let ids: BTreeSet<SubsedeId> = own_subsede
                .into_iter()
                .chain(subsede_grants.iter().copied())
                .collect();
            if ids.is_empty() {
                ScopePredicate::Nothing
            } else {
                ScopePredicate::Subsedes(ids)
            }
        }
    }
}

/// Resolve the scope of an identity context.
pub fn resolve_for(ctx: &IdentityContext) -> ScopePredicate {
    let scope = resolve_scope(
        ctx.access_level(),
        ctx.sede_id(),
        ctx.subsede_id(),
        ctx.granted_sedes(),
        ctx.granted_subsedes(),
        ctx.is_super_admin(),
    );

    let level = if ctx.is_super_admin() {
        "SUPER_ADMIN"
    } else {
        ctx.access_level().as_str()
    };
    metrics::record_scope_resolution(level);
    debug!(subject = %ctx.subject_id(), level, scope = ?scope, "Scope resolved");

    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsedes(ids: &[i64]) -> ScopePredicate {
        ScopePredicate::Subsedes(ids.iter().map(|i| SubsedeId(*i)).collect())
    }

    #[test]
    fn test_super_admin_checked_first() {
        let scope = resolve_scope(AccessLevel::Subsede, None, None, &[], &[], true);
        assert_eq!(scope, ScopePredicate::Unrestricted);
    }

    #[test]
    fn test_sede_level_unions_grants() {
        let scope = resolve_scope(
            AccessLevel::Sede,
            Some(SedeId(1)),
            None,
            &[SedeId(4), SedeId(1)],
            &[SubsedeId(99)],
            false,
        );
        assert_eq!(
            scope,
            ScopePredicate::Sedes([SedeId(1), SedeId(4)].into_iter().collect())
        );
    }

    #[test]
    fn test_subsede_level_unions_grants() {
        let scope = resolve_scope(
            AccessLevel::Subsede,
            Some(SedeId(1)),
            Some(SubsedeId(7)),
            &[],
            &[SubsedeId(9)],
            false,
        );
        assert_eq!(scope, subsedes(&[7, 9]));
    }

    #[test]
    fn test_subsede_without_anything_fails_closed() {
        let scope = resolve_scope(AccessLevel::Subsede, Some(SedeId(1)), None, &[], &[], false);
        assert_eq!(scope, ScopePredicate::Nothing);
        assert!(!scope.admits(Some(SedeId(1)), Some(SubsedeId(1))));
    }

    #[test]
    fn test_operativo_resolves_like_subsede() {
        let scope = resolve_scope(AccessLevel::Operativo, None, Some(SubsedeId(3)), &[], &[], false);
        assert_eq!(scope, subsedes(&[3]));
        let empty = resolve_scope(AccessLevel::Operativo, None, None, &[], &[], false);
        assert!(empty.is_nothing());
    }

    #[test]
    fn test_tenant_is_unrestricted() {
        let scope = resolve_scope(AccessLevel::Tenant, None, None, &[], &[], false);
        assert!(scope.is_unrestricted());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = resolve_scope(AccessLevel::Subsede, None, Some(SubsedeId(5)), &[], &[SubsedeId(2), SubsedeId(8)], false);
        let b = resolve_scope(AccessLevel::Subsede, None, Some(SubsedeId(5)), &[], &[SubsedeId(8), SubsedeId(2)], false);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_admits_target() {
        let scope = subsedes(&[7]);
        assert!(scope.admits_target(&GrantTarget::Subsede {
            sede_id: SedeId(1),
            subsede_id: SubsedeId(7)
        }));
        assert!(!scope.admits_target(&GrantTarget::Sede { sede_id: SedeId(1) }));

        let sede_scope = ScopePredicate::Sedes([SedeId(1)].into_iter().collect());
        assert!(sede_scope.admits_target(&GrantTarget::Subsede {
            sede_id: SedeId(1),
            subsede_id: SubsedeId(42)
        }));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(subsedes(&[7, 9])).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "subsedes", "ids": [7, 9]}));
        let json = serde_json::to_value(ScopePredicate::Nothing).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "nothing"}));
    }
}
