//! Role registry: role CRUD and role assignment, validated against the
//! hierarchy and the actor's scope before anything is written.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::{MemoryRoleStore, RoleStore};
use super::units::{check_unit, MemoryUnitDirectory, UnitDirectory};
use super::{validate_grant_of_level, validate_level_scope};
use crate::error::{CivicaError, ErrorCode, Result};
use crate::identity::{AccessLevel, IdentityContext, RoleLevel, SedeId, SubjectId, SubsedeId};
use crate::rbac::{Permission, PredefinedRole, Role, RoleAssignment, RoleId};
use crate::scope::{resolve_for, ScopePredicate};

/// Request body for creating a role.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    pub name: String,
    pub level: RoleLevel,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Partial update of a role.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub level: Option<RoleLevel>,
    pub permissions: Option<Vec<String>>,
}

/// Request body for assigning a role to a subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentRequest {
    pub subject_id: SubjectId,
    pub role_id: RoleId,
    pub access_level: AccessLevel,
    pub sede_id: Option<SedeId>,
    pub subsede_id: Option<SubsedeId>,
}

fn parse_permissions(raw: &[String]) -> Result<BTreeSet<Permission>> {
    raw.iter()
        .map(|p| {
            Permission::parse(p).ok_or_else(|| {
                CivicaError::validation(format!("Invalid permission '{}', expected resource:action", p))
            })
        })
        .collect()
}

/// Role CRUD and assignment over a [`RoleStore`], with subsede parents
/// resolved through a [`UnitDirectory`].
#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn RoleStore>,
    units: Arc<dyn UnitDirectory>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn RoleStore>, units: Arc<dyn UnitDirectory>) -> Self {
        Self { store, units }
    }

    /// An in-memory registry seeded with the predefined system roles and an
    /// empty unit directory.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(MemoryRoleStore::with_defaults()),
            Arc::new(MemoryUnitDirectory::new()),
        )
    }

    pub fn with_units(mut self, units: Arc<dyn UnitDirectory>) -> Self {
        self.units = units;
        self
    }

    pub fn units(&self) -> &Arc<dyn UnitDirectory> {
        &self.units
    }

    /// Store any predefined system role the backend is missing. Returns how
    /// many were added.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let mut added = 0;
        for role in PredefinedRole::all_defaults() {
            if self.store.get_role(&role.id).await?.is_none() {
                self.store.insert_role(&role).await?;
                added += 1;
            }
        }
        if added > 0 {
            info!(added, "System roles seeded");
        }
        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    fn visible_to(role: &Role, ctx: &IdentityContext) -> bool {
        if role.is_global || ctx.is_super_admin() {
            return true;
        }
        match role.sede_id {
            Some(sede) => resolve_for(ctx).admits(Some(sede), None) || ctx.sede_id() == Some(sede),
            None => false,
        }
    }

    pub async fn create_role(&self, ctx: &IdentityContext, request: NewRole) -> Result<Role> {
        validate_grant_of_level(ctx.role_level(), request.level)?;

        if request.is_global && !ctx.is_super_admin() {
            return Err(CivicaError::forbidden("Only a super-admin can create global roles"));
        }

        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CivicaError::validation("Role name must not be empty"));
        }
        let permissions = parse_permissions(&request.permissions)?;

        let sede = if request.is_global { None } else { ctx.sede_id() };
        if !request.is_global && sede.is_none() {
            return Err(CivicaError::validation(
                "A non-global role needs an owning sede; the caller has none",
            ));
        }

        let duplicate = self
            .store
            .list_roles()
            .await?
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(&name) && r.sede_id == sede);
        if duplicate {
            return Err(CivicaError::new(
                ErrorCode::DuplicateRecord,
                format!("A role named '{}' already exists", name),
            ));
        }

        let mut role = Role::new(RoleId::generate().0, name, request.level).with_permissions(permissions);
        if request.is_global {
            role = role.global();
        } else if let Some(sede) = sede {
            role = role.with_sede(sede);
        }

        self.store.insert_role(&role).await?;
        info!(
            role_id = %role.id,
            level = %role.level,
            is_global = role.is_global,
            created_by = %ctx.subject_id(),
            "Role created"
        );
        Ok(role)
    }

    pub async fn update_role(&self, ctx: &IdentityContext, id: &RoleId, update: RoleUpdate) -> Result<Role> {
        let not_found = || CivicaError::new(ErrorCode::RoleNotFound, format!("Role not found: {}", id));
        let current = self.get_role(ctx, id).await?.ok_or_else(not_found)?;

        if current.is_system {
            return Err(CivicaError::forbidden("System roles cannot be modified"));
        }
        if current.is_global && !ctx.is_super_admin() {
            return Err(CivicaError::forbidden("Only a super-admin can modify global roles"));
        }
        validate_grant_of_level(ctx.role_level(), current.level)?;
        if let Some(level) = update.level {
            validate_grant_of_level(ctx.role_level(), level)?;
        }
        let permissions = update.permissions.as_deref().map(parse_permissions).transpose()?;

        let mut role = current;
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CivicaError::validation("Role name must not be empty"));
            }
            role.name = name;
        }
        if let Some(level) = update.level {
            role.level = level;
        }
        if let Some(permissions) = permissions {
            role.permissions = permissions;
        }
        role.updated_at = Utc::now();

        if !self.store.update_role(&role).await? {
            return Err(not_found());
        }
        info!(role_id = %role.id, updated_by = %ctx.subject_id(), "Role updated");
        Ok(role)
    }

    /// Look up a role visible to the caller.
    pub async fn get_role(&self, ctx: &IdentityContext, id: &RoleId) -> Result<Option<Role>> {
        Ok(self
            .store
            .get_role(id)
            .await?
            .filter(|r| Self::visible_to(r, ctx)))
    }

    /// Roles visible to the caller, highest level first.
    pub async fn list_roles(&self, ctx: &IdentityContext) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| Self::visible_to(r, ctx))
            .collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Assignments
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the actor may place an assignment at this access level and unit.
    async fn check_assignment_unit(
        &self,
        ctx: &IdentityContext,
        scope: &ScopePredicate,
        access_level: AccessLevel,
        sede: Option<SedeId>,
        subsede: Option<SubsedeId>,
    ) -> Result<()> {
        if matches!(access_level, AccessLevel::Tenant) {
            if ctx.is_super_admin() || matches!(ctx.access_level(), AccessLevel::Tenant) {
                return Ok(());
            }
            return Err(CivicaError::out_of_scope("tenant"));
        }
        check_unit(scope, self.units.as_ref(), sede, subsede).await
    }

    /// Assign a role to a subject.
    ///
    /// Checks run in order: role exists, actor may grant the level, level and
    /// access scope agree, the actor may manage the subject's current
    /// assignment, the target unit lies in the actor's scope. Nothing is
    /// written unless all pass.
    pub async fn assign_role(&self, ctx: &IdentityContext, request: RoleAssignmentRequest) -> Result<RoleAssignment> {
        let role = self.get_role(ctx, &request.role_id).await?.ok_or_else(|| {
            CivicaError::new(ErrorCode::RoleNotFound, format!("Role not found: {}", request.role_id))
        })?;

        validate_grant_of_level(ctx.role_level(), role.level)?;
        validate_level_scope(role.level, request.access_level)?;

        let scope = resolve_for(ctx);
        if let Some(existing) = self.store.assignment_of(&request.subject_id).await? {
            validate_grant_of_level(ctx.role_level(), existing.level)?;
            self.check_assignment_unit(ctx, &scope, existing.access_level, existing.sede_id, existing.subsede_id)
                .await?;
        }
        self.check_assignment_unit(ctx, &scope, request.access_level, request.sede_id, request.subsede_id)
            .await?;

        // A subsede assignment records the sede the directory holds for it.
        let sede_id = match request.subsede_id {
            Some(subsede) => self.units.sede_of(subsede).await?.or(request.sede_id),
            None => request.sede_id,
        };

        let assignment = RoleAssignment {
            subject_id: request.subject_id,
            role_id: role.id.clone(),
            level: role.level,
            access_level: request.access_level,
            sede_id,
            subsede_id: request.subsede_id,
            assigned_by: ctx.subject_id().clone(),
            assigned_at: Utc::now(),
        };

        self.store.put_assignment(&assignment).await?;
        info!(
            subject = %assignment.subject_id,
            role_id = %assignment.role_id,
            level = %assignment.level,
            assigned_by = %assignment.assigned_by,
            "Role assigned"
        );
        Ok(assignment)
    }

    pub async fn assignment_of(&self, subject: &SubjectId) -> Result<Option<RoleAssignment>> {
        self.store.assignment_of(subject).await
    }

    /// Current role level of a subject.
    pub async fn level_of(&self, subject: &SubjectId) -> Result<Option<RoleLevel>> {
        let level = self.store.assignment_of(subject).await?.map(|a| a.level);
        debug!(subject = %subject, level = ?level, "Role level lookup");
        Ok(level)
    }

    /// Record an assignment without validation, for bootstrapping the first
    /// super-admin.
    pub async fn bootstrap_assignment(&self, assignment: RoleAssignment) -> Result<()> {
        self.store.put_assignment(&assignment).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(level: RoleLevel, access: AccessLevel) -> IdentityContext {
        IdentityContext::builder(format!("{}-actor", level.as_str()), "t1")
            .sede(1)
            .subsede(7)
            .access_level(access)
            .role_level(level)
            .super_admin(level == RoleLevel::SuperAdmin)
            .build()
    }

    fn units() -> Arc<dyn UnitDirectory> {
        Arc::new(MemoryUnitDirectory::from_pairs([(7, 1), (8, 1), (20, 2)]))
    }

    fn empty_registry() -> RoleRegistry {
        RoleRegistry::new(Arc::new(MemoryRoleStore::new()), units())
    }

    fn seeded_registry() -> RoleRegistry {
        RoleRegistry::with_defaults().with_units(units())
    }

    fn new_role(name: &str, level: RoleLevel, is_global: bool) -> NewRole {
        NewRole {
            name: name.to_string(),
            level,
            is_global,
            permissions: vec!["fines:read".to_string()],
        }
    }

    fn assignment(subject: &str, role: &str, access: AccessLevel, sede: i64, subsede: Option<i64>) -> RoleAssignmentRequest {
        RoleAssignmentRequest {
            subject_id: SubjectId::new(subject),
            role_id: role.into(),
            access_level: access,
            sede_id: Some(SedeId(sede)),
            subsede_id: subsede.map(SubsedeId),
        }
    }

    #[tokio::test]
    async fn test_municipal_creates_operativo_role_in_own_sede() {
        let registry = seeded_registry();
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let role = registry
            .create_role(&muni, new_role("Inspector", RoleLevel::Operativo, false))
            .await
            .unwrap();
        assert_eq!(role.sede_id, Some(SedeId(1)));
        assert!(role.has_permission(&Permission::new("fines", "read")));
    }

    #[tokio::test]
    async fn test_create_above_own_level_rejected() {
        let registry = empty_registry();
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let err = registry
            .create_role(&muni, new_role("Boss", RoleLevel::Estatal, false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HierarchyViolation);
        assert!(registry.list_roles(&muni).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_super_admin_creates_global_roles() {
        let registry = empty_registry();
        let estatal = ctx(RoleLevel::Estatal, AccessLevel::Sede);
        let err = registry
            .create_role(&estatal, new_role("Auditor", RoleLevel::Municipal, true))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let role = registry
            .create_role(&root, new_role("Auditor", RoleLevel::Municipal, true))
            .await
            .unwrap();
        assert!(role.is_global);
    }

    #[tokio::test]
    async fn test_invalid_permission_rejected() {
        let registry = empty_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let mut request = new_role("Bad", RoleLevel::Operativo, false);
        request.permissions = vec!["nocolon".into()];
        let err = registry.create_role(&root, request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_duplicate_name_in_same_sede() {
        let registry = empty_registry();
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        registry
            .create_role(&muni, new_role("Inspector", RoleLevel::Operativo, false))
            .await
            .unwrap();
        let err = registry
            .create_role(&muni, new_role("inspector", RoleLevel::Operativo, false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn test_update_role_level_checked() {
        let registry = empty_registry();
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let role = registry
            .create_role(&muni, new_role("Inspector", RoleLevel::Operativo, false))
            .await
            .unwrap();

        let err = registry
            .update_role(
                &muni,
                &role.id,
                RoleUpdate {
                    level: Some(RoleLevel::Estatal),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HierarchyViolation);

        let updated = registry
            .update_role(
                &muni,
                &role.id,
                RoleUpdate {
                    name: Some("Senior Inspector".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Senior Inspector");
        assert_eq!(updated.level, RoleLevel::Operativo);

        let stored = registry.get_role(&muni, &role.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Senior Inspector");
    }

    #[tokio::test]
    async fn test_system_roles_immutable() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let err = registry
            .update_role(&root, &RoleId::new("operativo"), RoleUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_seed_defaults_fills_missing_roles_once() {
        let registry = empty_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        assert_eq!(registry.seed_defaults().await.unwrap(), 4);
        assert_eq!(registry.seed_defaults().await.unwrap(), 0);
        assert_eq!(registry.list_roles(&root).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_assign_checks_level_scope_agreement() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let err = registry
            .assign_role(&root, assignment("new-user", "estatal", AccessLevel::Subsede, 1, Some(7)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LevelScopeMismatch);
        assert!(registry.level_of(&SubjectId::new("new-user")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assign_outside_scope_rejected() {
        let registry = seeded_registry();
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let err = registry
            .assign_role(&muni, assignment("agent", "operativo", AccessLevel::Operativo, 1, Some(8)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);

        let ok = registry
            .assign_role(&muni, assignment("agent", "operativo", AccessLevel::Operativo, 1, Some(7)))
            .await
            .unwrap();
        assert_eq!(ok.level, RoleLevel::Operativo);
        assert_eq!(
            registry.level_of(&SubjectId::new("agent")).await.unwrap(),
            Some(RoleLevel::Operativo)
        );
    }

    #[tokio::test]
    async fn test_sede_actor_cannot_assign_into_foreign_subsede() {
        let registry = seeded_registry();
        let estatal = ctx(RoleLevel::Estatal, AccessLevel::Sede);

        // Subsede 20 belongs to sede 2 whatever the request claims.
        let err = registry
            .assign_role(&estatal, assignment("muni", "municipal", AccessLevel::Subsede, 1, Some(20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);

        let unregistered = registry
            .assign_role(&estatal, assignment("muni", "municipal", AccessLevel::Subsede, 1, Some(99)))
            .await
            .unwrap_err();
        assert_eq!(unregistered.code(), ErrorCode::OutOfScope);
        assert!(registry.assignment_of(&SubjectId::new("muni")).await.unwrap().is_none());

        let ok = registry
            .assign_role(&estatal, assignment("muni", "municipal", AccessLevel::Subsede, 1, Some(8)))
            .await
            .unwrap();
        assert_eq!(ok.sede_id, Some(SedeId(1)));
    }

    #[tokio::test]
    async fn test_wrong_parent_sede_is_invalid() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let err = registry
            .assign_role(&root, assignment("muni", "municipal", AccessLevel::Subsede, 1, Some(20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_lower_level_cannot_overwrite_higher_assignment() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        registry
            .assign_role(&root, assignment("boss", "estatal", AccessLevel::Sede, 1, None))
            .await
            .unwrap();

        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let err = registry
            .assign_role(&muni, assignment("boss", "operativo", AccessLevel::Operativo, 1, Some(7)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HierarchyViolation);

        let kept = registry.assignment_of(&SubjectId::new("boss")).await.unwrap().unwrap();
        assert_eq!(kept.level, RoleLevel::Estatal);
        assert_eq!(kept.access_level, AccessLevel::Sede);
    }

    #[tokio::test]
    async fn test_reassign_needs_current_unit_in_scope() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        registry
            .assign_role(&root, assignment("agent", "operativo", AccessLevel::Operativo, 1, Some(8)))
            .await
            .unwrap();

        // Same level, but the agent sits in subsede 8, outside the actor's 7.
        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        let err = registry
            .assign_role(&muni, assignment("agent", "operativo", AccessLevel::Operativo, 1, Some(7)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);
        let kept = registry.assignment_of(&SubjectId::new("agent")).await.unwrap().unwrap();
        assert_eq!(kept.subsede_id, Some(SubsedeId(8)));
    }

    #[tokio::test]
    async fn test_list_roles_scoped() {
        let registry = seeded_registry();
        let root = ctx(RoleLevel::SuperAdmin, AccessLevel::Tenant);
        let other_sede = IdentityContext::builder("m2", "t1")
            .sede(2)
            .subsede(20)
            .access_level(AccessLevel::Subsede)
            .role_level(RoleLevel::Municipal)
            .build();
        registry
            .create_role(&other_sede, new_role("Local", RoleLevel::Operativo, false))
            .await
            .unwrap();

        let muni = ctx(RoleLevel::Municipal, AccessLevel::Subsede);
        assert_eq!(registry.list_roles(&root).await.unwrap().len(), 5);
        let visible = registry.list_roles(&muni).await.unwrap();
        assert_eq!(visible.len(), 4);
        assert_eq!(visible[0].level, RoleLevel::SuperAdmin);
    }
}
