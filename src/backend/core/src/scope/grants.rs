//! Access grants: explicit out-of-hierarchy visibility exceptions.
//!
//! Grants are never deleted. Revocation flips `active` and records who
//! revoked it and when, so the history stays auditable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::predicate::resolve_for;
use crate::error::{CivicaError, ErrorCode, Result};
use crate::hierarchy::{check_unit, validate_grant_of_level, RoleRegistry};
use crate::identity::{IdentityContext, SedeId, SubjectId, SubsedeId};

// ═══════════════════════════════════════════════════════════════════════════════
// Models
// ═══════════════════════════════════════════════════════════════════════════════

/// The unit a grant opens up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantTarget {
    Sede { sede_id: SedeId },
    Subsede { sede_id: SedeId, subsede_id: SubsedeId },
}

impl GrantTarget {
    pub fn sede_id(&self) -> SedeId {
        match *self {
            Self::Sede { sede_id } | Self::Subsede { sede_id, .. } => sede_id,
        }
    }

    pub fn subsede_id(&self) -> Option<SubsedeId> {
        match *self {
            Self::Sede { .. } => None,
            Self::Subsede { subsede_id, .. } => Some(subsede_id),
        }
    }
}

impl fmt::Display for GrantTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sede { sede_id } => write!(f, "{}", sede_id),
            Self::Subsede { sede_id, subsede_id } => write!(f, "{}/{}", sede_id, subsede_id),
        }
    }
}

/// An explicit visibility exception for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub id: Uuid,
    /// The subject receiving extra visibility.
    pub actor_id: SubjectId,
    pub target: GrantTarget,
    pub active: bool,
    pub granted_by: SubjectId,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<SubjectId>,
}

impl AccessGrant {
    pub fn new(actor_id: SubjectId, target: GrantTarget, granted_by: SubjectId) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            target,
            active: true,
            granted_by,
            created_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        }
    }
}

/// Grant sets split by unit kind, ready for the identity context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSets {
    pub sedes: Vec<SedeId>,
    pub subsedes: Vec<SubsedeId>,
}

impl GrantSets {
    pub fn from_grants(grants: &[AccessGrant]) -> Self {
        let mut sets = Self::default();
        for grant in grants.iter().filter(|g| g.active) {
            match grant.target {
                GrantTarget::Sede { sede_id } => sets.sedes.push(sede_id),
                GrantTarget::Subsede { subsede_id, .. } => sets.subsedes.push(subsede_id),
            }
        }
        sets
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistence for access grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn insert(&self, grant: &AccessGrant) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<AccessGrant>>;

    /// Mark a grant inactive. Returns the updated grant, or `None` if absent.
    async fn deactivate(
        &self,
        id: Uuid,
        revoked_by: &SubjectId,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>>;

    /// Grants currently active for a subject.
    async fn active_for(&self, actor_id: &SubjectId) -> Result<Vec<AccessGrant>>;

    /// Every grant, newest first.
    async fn list(&self, active_only: bool) -> Result<Vec<AccessGrant>>;
}

/// In-memory grant store.
#[derive(Debug, Clone, Default)]
pub struct MemoryGrantStore {
    grants: Arc<DashMap<Uuid, AccessGrant>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn insert(&self, grant: &AccessGrant) -> Result<()> {
        match self.grants.entry(grant.id) {
            Entry::Occupied(_) => Err(CivicaError::new(
                ErrorCode::DuplicateRecord,
                format!("Grant {} already exists", grant.id),
            )),
            Entry::Vacant(slot) => {
                slot.insert(grant.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<AccessGrant>> {
        Ok(self.grants.get(&id).map(|g| g.clone()))
    }

    async fn deactivate(
        &self,
        id: Uuid,
        revoked_by: &SubjectId,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>> {
        Ok(self.grants.get_mut(&id).map(|mut grant| {
            if grant.active {
                grant.active = false;
                grant.revoked_at = Some(revoked_at);
                grant.revoked_by = Some(revoked_by.clone());
            }
            grant.clone()
        }))
    }

    async fn active_for(&self, actor_id: &SubjectId) -> Result<Vec<AccessGrant>> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .iter()
            .filter(|g| g.active && &g.actor_id == actor_id)
            .map(|g| g.clone())
            .collect();
        grants.sort_by_key(|g| g.created_at);
        Ok(grants)
    }

    async fn list(&self, active_only: bool) -> Result<Vec<AccessGrant>> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .iter()
            .filter(|g| !active_only || g.active)
            .map(|g| g.clone())
            .collect();
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Request body for creating a grant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGrant {
    pub actor_id: SubjectId,
    pub target: GrantTarget,
}

/// Grant administration gated by the role hierarchy and the actor's scope.
#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn GrantStore>,
    roles: RoleRegistry,
}

impl GrantService {
    pub fn new(store: Arc<dyn GrantStore>, roles: RoleRegistry) -> Self {
        Self { store, roles }
    }

    pub fn store(&self) -> &Arc<dyn GrantStore> {
        &self.store
    }

    /// Current grant sets for a subject, read from the store on every call.
    pub async fn grant_sets(&self, subject: &SubjectId) -> Result<GrantSets> {
        let grants = self.store.active_for(subject).await?;
        Ok(GrantSets::from_grants(&grants))
    }

    async fn authorize(&self, ctx: &IdentityContext, grantee: &SubjectId, target: &GrantTarget) -> Result<()> {
        let grantee_level = self.roles.level_of(grantee).await?.ok_or_else(|| {
            CivicaError::new(
                ErrorCode::RoleNotFound,
                format!("Subject {} has no role assignment", grantee),
            )
        })?;
        validate_grant_of_level(ctx.role_level(), grantee_level)?;

        check_unit(
            &resolve_for(ctx),
            self.roles.units().as_ref(),
            Some(target.sede_id()),
            target.subsede_id(),
        )
        .await
    }

    /// Create a grant. Nothing is written when validation fails.
    pub async fn create(&self, ctx: &IdentityContext, request: NewGrant) -> Result<AccessGrant> {
        self.authorize(ctx, &request.actor_id, &request.target).await?;

        let grant = AccessGrant::new(request.actor_id, request.target, ctx.subject_id().clone());
        self.store.insert(&grant).await?;

        info!(
            grant_id = %grant.id,
            actor = %grant.actor_id,
            target = %grant.target,
            granted_by = %grant.granted_by,
            "Access grant created"
        );
        Ok(grant)
    }

    /// Revoke a grant by deactivating it. Revoking an inactive grant is a no-op.
    pub async fn revoke(&self, ctx: &IdentityContext, id: Uuid) -> Result<AccessGrant> {
        let grant = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CivicaError::new(ErrorCode::GrantNotFound, format!("Grant not found: {}", id)))?;

        if !resolve_for(ctx).admits_target(&grant.target) {
            return Err(CivicaError::new(ErrorCode::GrantNotFound, format!("Grant not found: {}", id)));
        }
        self.authorize(ctx, &grant.actor_id, &grant.target).await?;

        if !grant.active {
            debug!(grant_id = %id, "Grant already inactive");
            return Ok(grant);
        }

        let revoked = self
            .store
            .deactivate(id, ctx.subject_id(), Utc::now())
            .await?
            .ok_or_else(|| CivicaError::new(ErrorCode::GrantNotFound, format!("Grant not found: {}", id)))?;

        info!(grant_id = %id, revoked_by = %ctx.subject_id(), "Access grant revoked");
        Ok(revoked)
    }

    /// Grants whose target is visible to the caller.
    pub async fn list(&self, ctx: &IdentityContext, active_only: bool) -> Result<Vec<AccessGrant>> {
        let scope = resolve_for(ctx);
        Ok(self
            .store
            .list(active_only)
            .await?
            .into_iter()
            .filter(|g| scope.admits_target(&g.target))
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
