//! Caller identity: typed identifiers, access and role levels, and the
//! per-request [`IdentityContext`].
//!
//! The context is assembled once by the authentication layer from the bearer
//! token claims plus the grants that are active at request time. Nothing
//! downstream mutates it or re-derives levels from role names.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::CivicaError;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed subject (principal) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Strongly-typed tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a sede (top-level organizational unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SedeId(pub i64);

impl fmt::Display for SedeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sede:{}", self.0)
    }
}

/// Identifier of a subsede (municipal unit nested under a sede).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsedeId(pub i64);

impl fmt::Display for SubsedeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subsede:{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Levels
// ═══════════════════════════════════════════════════════════════════════════════

/// Granularity at which a caller's visibility is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Tenant,
    Sede,
    Subsede,
    Operativo,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "TENANT",
            Self::Sede => "SEDE",
            Self::Subsede => "SUBSEDE",
            Self::Operativo => "OPERATIVO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Self::Tenant, Self::Sede, Self::Subsede, Self::Operativo]
            .into_iter()
            .find(|level| level.as_str() == s)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative level of a role.
///
/// Variants are declared lowest first so the derived `Ord` is the hierarchy:
/// `Operativo < Municipal < Estatal < SuperAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleLevel {
    Operativo,
    Municipal,
    Estatal,
    SuperAdmin,
}

impl RoleLevel {
    pub const ALL: [RoleLevel; 4] = [
        Self::SuperAdmin,
        Self::Estatal,
        Self::Municipal,
        Self::Operativo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Estatal => "ESTATAL",
            Self::Municipal => "MUNICIPAL",
            Self::Operativo => "OPERATIVO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }

    /// The top of the hierarchy.
    pub fn is_top(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Fully resolved identity of the caller for one request.
///
/// Fields are private; construct through [`IdentityContext::builder`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    subject_id: SubjectId,
    tenant_id: TenantId,
    sede_id: Option<SedeId>,
    subsede_id: Option<SubsedeId>,
    access_level: AccessLevel,
    role_level: RoleLevel,
    roles: BTreeSet<String>,
    permissions: HashSet<String>,
    granted_sedes: Vec<SedeId>,
    granted_subsedes: Vec<SubsedeId>,
    is_super_admin: bool,
}

impl IdentityContext {
    pub fn builder(subject_id: impl Into<SubjectId>, tenant_id: impl Into<String>) -> IdentityContextBuilder {
        IdentityContextBuilder::new(subject_id.into(), TenantId::new(tenant_id))
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn sede_id(&self) -> Option<SedeId> {
        self.sede_id
    }

    pub fn subsede_id(&self) -> Option<SubsedeId> {
        self.subsede_id
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn role_level(&self) -> RoleLevel {
        self.role_level
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn permissions(&self) -> &HashSet<String> {
        &self.permissions
    }

    pub fn granted_sedes(&self) -> &[SedeId] {
        &self.granted_sedes
    }

    pub fn granted_subsedes(&self) -> &[SubsedeId] {
        &self.granted_subsedes
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }

    /// Exact membership test on `resource:action`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Builder for [`IdentityContext`].
#[derive(Debug, Clone)]
pub struct IdentityContextBuilder {
    ctx: IdentityContext,
}

impl IdentityContextBuilder {
    fn new(subject_id: SubjectId, tenant_id: TenantId) -> Self {
        Self {
            ctx: IdentityContext {
                subject_id,
                tenant_id,
                sede_id: None,
                subsede_id: None,
                access_level: AccessLevel::Operativo,
                role_level: RoleLevel::Operativo,
                roles: BTreeSet::new(),
                permissions: HashSet::new(),
                granted_sedes: Vec::new(),
                granted_subsedes: Vec::new(),
                is_super_admin: false,
            },
        }
    }

    pub fn sede(mut self, sede_id: i64) -> Self {
        self.ctx.sede_id = Some(SedeId(sede_id));
        self
    }

    pub fn subsede(mut self, subsede_id: i64) -> Self {
        self.ctx.subsede_id = Some(SubsedeId(subsede_id));
        self
    }

    pub fn sede_opt(mut self, sede_id: Option<SedeId>) -> Self {
        self.ctx.sede_id = sede_id;
        self
    }

    pub fn subsede_opt(mut self, subsede_id: Option<SubsedeId>) -> Self {
        self.ctx.subsede_id = subsede_id;
        self
    }

    pub fn access_level(mut self, level: AccessLevel) -> Self {
        self.ctx.access_level = level;
        self
    }

    pub fn role_level(mut self, level: RoleLevel) -> Self {
        self.ctx.role_level = level;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.ctx.roles.insert(role.into());
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.ctx.permissions.insert(permission.into());
        self
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx
            .permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn granted_sedes(mut self, sedes: impl IntoIterator<Item = SedeId>) -> Self {
        self.ctx.granted_sedes.extend(sedes);
        self
    }

    pub fn granted_subsedes(mut self, subsedes: impl IntoIterator<Item = SubsedeId>) -> Self {
        self.ctx.granted_subsedes.extend(subsedes);
        self
    }

    pub fn super_admin(mut self, is_super_admin: bool) -> Self {
        self.ctx.is_super_admin = is_super_admin;
        self
    }

    pub fn build(self) -> IdentityContext {
        self.ctx
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdentityContext
where
    S: Send + Sync,
{
    type Rejection = CivicaError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .ok_or_else(|| CivicaError::unauthorized("Authentication credentials are required"))
    }
}
