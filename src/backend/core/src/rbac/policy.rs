//! Policy evaluation and the static policy table.
//!
//! The evaluator answers one question: "does this caller satisfy every
//! requirement declared on this operation?" It is a pure function of the
//! requirements and the identity context.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::models::PolicyRequirement;
use crate::error::{CivicaError, Result};
use crate::identity::IdentityContext;
use crate::query::EntityKind;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Every requirement holds.
    Allow,
    /// At least one requirement failed; all failing ones are listed.
    Deny(Vec<PolicyRequirement>),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// Requirements that were not satisfied (empty when allowed).
    pub fn missing(&self) -> &[PolicyRequirement] {
        match self {
            Self::Allow => &[],
            Self::Deny(missing) => missing,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

fn satisfies(requirement: &PolicyRequirement, ctx: &IdentityContext) -> bool {
    if requirement.is_super {
        return ctx.is_super_admin();
    }
    ctx.is_super_admin() || ctx.has_permission(&requirement.permission.as_string())
}

/// Evaluate a conjunctive list of requirements against a caller.
///
/// An empty list allows. Use [`PolicyTable`] to fail closed on operations
/// that declare nothing at all.
pub fn evaluate(required: &[PolicyRequirement], ctx: &IdentityContext) -> PolicyDecision {
    let missing: Vec<PolicyRequirement> = required
        .iter()
        .filter(|r| !satisfies(r, ctx))
        .cloned()
        .collect();

    if missing.is_empty() {
        debug!(
            subject = %ctx.subject_id(),
            requirements = required.len(),
            "Policy allowed"
        );
        PolicyDecision::Allow
    } else {
        debug!(
            subject = %ctx.subject_id(),
            missing = missing.len(),
            "Policy denied"
        );
        PolicyDecision::Deny(missing)
    }
}

/// Convenience: `Ok(())` if allowed, a Forbidden error naming the missing
/// requirements otherwise.
pub fn enforce(required: &[PolicyRequirement], ctx: &IdentityContext) -> Result<()> {
    match evaluate(required, ctx) {
        PolicyDecision::Allow => Ok(()),
        PolicyDecision::Deny(missing) => Err(CivicaError::policy_denied(
            missing.iter().map(|r| r.to_string()).collect(),
        )),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operation Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Every protected operation exposed by the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationId {
    ListEntities(EntityKind),
    GetEntity(EntityKind),
    ListGrants,
    CreateGrant,
    RevokeGrant,
    ListRoles,
    CreateRole,
    UpdateRole,
    AssignRole,
    ReadOwnScope,
}

impl OperationId {
    /// Stable label used in logs and metrics.
    pub fn label(&self) -> String {
        match self {
            Self::ListEntities(kind) => format!("{}.list", kind.path()),
            Self::GetEntity(kind) => format!("{}.get", kind.path()),
            Self::ListGrants => "grants.list".into(),
            Self::CreateGrant => "grants.create".into(),
            Self::RevokeGrant => "grants.revoke".into(),
            Self::ListRoles => "roles.list".into(),
            Self::CreateRole => "roles.create".into(),
            Self::UpdateRole => "roles.update".into(),
            Self::AssignRole => "roles.assign".into(),
            Self::ReadOwnScope => "me.scope".into(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Statically built mapping from operation to its declared requirements.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    entries: HashMap<OperationId, Vec<PolicyRequirement>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the requirements of an operation.
    pub fn declare(mut self, operation: OperationId, requirements: Vec<PolicyRequirement>) -> Self {
        self.entries.insert(operation, requirements);
        self
    }

    /// The table used by the HTTP surface.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for kind in EntityKind::ALL {
            let resource = kind.schema().resource;
            table = table
                .declare(
                    OperationId::ListEntities(kind),
                    vec![PolicyRequirement::new(resource, "read")],
                )
                .declare(
                    OperationId::GetEntity(kind),
                    vec![PolicyRequirement::new(resource, "read")],
                );
        }

        table
            .declare(OperationId::ListGrants, vec![PolicyRequirement::new("grants", "read")])
            .declare(OperationId::CreateGrant, vec![PolicyRequirement::new("grants", "create")])
            .declare(OperationId::RevokeGrant, vec![PolicyRequirement::new("grants", "revoke")])
            .declare(OperationId::ListRoles, vec![PolicyRequirement::new("roles", "read")])
            .declare(OperationId::CreateRole, vec![PolicyRequirement::new("roles", "create")])
            .declare(OperationId::UpdateRole, vec![PolicyRequirement::new("roles", "update")])
            .declare(OperationId::AssignRole, vec![PolicyRequirement::new("roles", "assign")])
            .declare(OperationId::ReadOwnScope, Vec::new())
    }

    pub fn requirements(&self, operation: &OperationId) -> Option<&[PolicyRequirement]> {
        self.entries.get(operation).map(Vec::as_slice)
    }

    /// Evaluate an operation. Undeclared operations are denied.
    pub fn check(&self, operation: &OperationId, ctx: &IdentityContext) -> PolicyDecision {
        match self.requirements(operation) {
            Some(required) => evaluate(required, ctx),
            None => {
                debug!(operation = %operation, "Operation has no declared policy");
                PolicyDecision::Deny(vec![PolicyRequirement::super_only(
                    "operation",
                    operation.label(),
                )])
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn caller(perms: &[&str]) -> IdentityContext {
        IdentityContext::builder("u1", "t1")
            .permissions(perms.iter().copied())
            .build()
    }

    fn super_admin() -> IdentityContext {
        IdentityContext::builder("root", "t1").super_admin(true).build()
    }

    #[test]
    fn test_all_requirements_must_hold() {
        let ctx = caller(&["fines:read"]);
        let required = vec![
            PolicyRequirement::new("fines", "read"),
            PolicyRequirement::new("fines", "export"),
        ];

        let decision = evaluate(&required, &ctx);
        assert!(decision.is_denied());
        assert_eq!(decision.missing().len(), 1);
        assert_eq!(decision.missing()[0].permission.action, "export");
    }

    #[test]
    fn test_all_missing_are_listed() {
        let ctx = caller(&[]);
        let required = vec![
            PolicyRequirement::new("fines", "read"),
            PolicyRequirement::new("permits", "read"),
        ];
        assert_eq!(evaluate(&required, &ctx).missing().len(), 2);
    }

    #[test]
    fn test_super_admin_satisfies_everything() {
        let required = vec![
            PolicyRequirement::new("fines", "read"),
            PolicyRequirement::super_only("tenants", "purge"),
        ];
        assert!(evaluate(&required, &super_admin()).is_allowed());
    }

    #[test]
    fn test_super_only_requires_super_admin_even_with_permission() {
        let ctx = caller(&["tenants:purge"]);
        let required = vec![PolicyRequirement::super_only("tenants", "purge")];
        assert!(evaluate(&required, &ctx).is_denied());
    }

    #[test]
    fn test_empty_requirements_allow() {
        assert!(evaluate(&[], &caller(&[])).is_allowed());
    }

    #[test]
    fn test_enforce_maps_to_policy_denied() {
        let err = enforce(&[PolicyRequirement::new("grants", "create")], &caller(&[])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyDenied);
        assert!(!err.is_retryable());
        assert_eq!(err.details().missing, vec!["grants:create".to_string()]);
    }

    #[test]
    fn test_table_declares_every_entity() {
        let table = PolicyTable::standard();
        for kind in EntityKind::ALL {
            assert!(table.requirements(&OperationId::ListEntities(kind)).is_some());
            assert!(table.requirements(&OperationId::GetEntity(kind)).is_some());
        }
    }

    #[test]
    fn test_undeclared_operation_denied() {
        let table = PolicyTable::new();
        assert!(table.check(&OperationId::CreateGrant, &caller(&["grants:create"])).is_denied());
    }

    #[test]
    fn test_own_scope_open_to_any_caller() {
        let table = PolicyTable::standard();
        assert!(table.check(&OperationId::ReadOwnScope, &caller(&[])).is_allowed());
    }
}
