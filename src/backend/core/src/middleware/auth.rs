//! Authentication middleware.
//!
//! Features:
//! - HS256 bearer token validation with issuer and leeway
//! - Identity claims carrying resolved access and role levels
//! - Current access grants loaded from the grant store on every request
//! - [`IdentityContext`] injection for the policy layer and handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use civica_core::middleware::{AuthLayer, Authenticator};
//!
//! let authenticator = Arc::new(Authenticator::new(&config.auth));
//! let app = Router::new()
//!     .route("/api/v1/fines", get(list_fines))
//!     .layer(AuthLayer::new(authenticator, grant_store));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::future::BoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{CivicaError, Result};
use crate::identity::{AccessLevel, IdentityContext, RoleLevel, SedeId, SubsedeId};
use crate::scope::{GrantSets, GrantStore};

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// Bearer token claims.
///
/// Levels are resolved by the identity provider when the token is issued.
/// Grants are deliberately absent: they are read fresh on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    /// Subject (principal ID)
    pub sub: String,

    pub tenant_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sede_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsede_id: Option<i64>,

    pub access_level: AccessLevel,

    pub role_level: RoleLevel,

    #[serde(default)]
    pub roles: Vec<String>,

    /// `resource:action` strings
    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default)]
    pub is_super_admin: bool,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer
    pub iss: String,
}

impl IdentityClaims {
    /// Claims for an operative-level subject. Timestamps and issuer are set
    /// by [`Authenticator::generate_token`].
    pub fn new(subject: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            sub: subject.into(),
            tenant_id: tenant.into(),
            sede_id: None,
            subsede_id: None,
            access_level: AccessLevel::Operativo,
            role_level: RoleLevel::Operativo,
            roles: Vec::new(),
            permissions: Vec::new(),
            is_super_admin: false,
            iat: 0,
            exp: 0,
            iss: String::new(),
        }
    }

    pub fn with_sede(mut self, sede_id: i64) -> Self {
        self.sede_id = Some(sede_id);
        self
    }

    pub fn with_subsede(mut self, subsede_id: i64) -> Self {
        self.subsede_id = Some(subsede_id);
        self
    }

    pub fn with_levels(mut self, access_level: AccessLevel, role_level: RoleLevel) -> Self {
        self.access_level = access_level;
        self.role_level = role_level;
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    /// Build the request's identity context from these claims and the
    /// subject's current grants.
    pub fn into_context(self, grants: GrantSets) -> IdentityContext {
        IdentityContext::builder(self.sub, self.tenant_id)
            .sede_opt(self.sede_id.map(SedeId))
            .subsede_opt(self.subsede_id.map(SubsedeId))
            .access_level(self.access_level)
            .role_level(self.role_level)
            .roles(self.roles)
            .permissions(self.permissions)
            .granted_sedes(grants.sedes)
            .granted_subsedes(grants.subsedes)
            .super_admin(self.is_super_admin)
            .build()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates and issues HS256 bearer tokens.
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    token_ttl_secs: i64,
}

impl Authenticator {
    /// Create a new authenticator.
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.set_issuer(&[&config.issuer]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer.clone(),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Extract the bearer token from headers.
    fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Validate a token and return its claims.
    pub fn decode(&self, token: &str) -> Result<IdentityClaims> {
        let data = decode::<IdentityClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Token validation failed: {}", e);
                CivicaError::from(e)
            })?;
        Ok(data.claims)
    }

    /// Authenticate request headers.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<IdentityClaims> {
        let token = Self::extract_bearer(headers)
            .ok_or_else(|| CivicaError::unauthorized("Authentication credentials are required"))?;
        self.decode(token)
    }

    /// Sign claims, stamping issuer, issue time and expiry.
    pub fn generate_token(&self, claims: &IdentityClaims) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = IdentityClaims {
            iat: now,
            exp: now + self.token_ttl_secs,
            iss: self.issuer.clone(),
            ..claims.clone()
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            CivicaError::internal(format!("Failed to generate token: {}", e))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
    grants: Arc<dyn GrantStore>,
}

impl AuthLayer {
    /// Create a new auth layer.
    pub fn new(authenticator: Arc<Authenticator>, grants: Arc<dyn GrantStore>) -> Self {
        Self {
            authenticator,
            grants,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
            grants: self.grants.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
    grants: Arc<dyn GrantStore>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let grants = self.grants.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let claims = match authenticator.authenticate(request.headers()) {
                Ok(claims) => claims,
                Err(e) => return Ok(e.into_response()),
            };

            let subject = crate::identity::SubjectId::new(claims.sub.clone());
            let grant_sets = match grants.active_for(&subject).await {
                Ok(active) => GrantSets::from_grants(&active),
                Err(e) => return Ok(e.into_response()),
            };

            let ctx = claims.into_context(grant_sets);
            debug!(
                subject = %ctx.subject_id(),
                access_level = %ctx.access_level(),
                role_level = %ctx.role_level(),
                "Request authenticated"
            );

            request.extensions_mut().insert(ctx);
            inner.call(request).await
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
