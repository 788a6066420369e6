//! HTTP surface for Civica Core.
//!
//! Every protected route sits behind two layers:
//!
//! 1. [`AuthLayer`]: decodes the bearer token and builds the request's
//!    [`IdentityContext`](crate::identity::IdentityContext) with the caller's
//!    current access grants.
//! 2. [`RequirePolicyLayer`](crate::rbac::RequirePolicyLayer): evaluates the
//!    operation's declared requirements before the handler runs.
//!
//! `/health` and `/metrics` are unauthenticated.

mod handlers;
pub mod routes;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{Config, PaginationConfig};
use crate::hierarchy::RoleRegistry;
use crate::middleware::{AuthLayer, Authenticator};
use crate::persistence::Repository;
use crate::rbac::PolicyTable;
use crate::scope::{GrantService, GrantStore};
use crate::service::EntityService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub entities: EntityService,
    pub grants: GrantService,
    pub roles: RoleRegistry,
    pub policies: Arc<PolicyTable>,
    pub authenticator: Arc<Authenticator>,
    pub pagination: PaginationConfig,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the services over a repository, a grant store and a role
    /// registry. The grant service shares the registry.
    pub fn new(
        repository: Arc<dyn Repository>,
        grant_store: Arc<dyn GrantStore>,
        roles: RoleRegistry,
        config: &Config,
    ) -> Self {
        Self {
            entities: EntityService::new(repository),
            grants: GrantService::new(grant_store, roles.clone()),
            roles,
            policies: Arc::new(PolicyTable::standard()),
            authenticator: Arc::new(Authenticator::new(&config.auth)),
            pagination: config.pagination.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the API router.
///
/// - `/health` and `/metrics` (unauthenticated)
/// - `/api/v1/...` behind authentication and per-route policy
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth = AuthLayer::new(state.authenticator.clone(), state.grants.store().clone());

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(
            routes::V1_PREFIX,
            routes::v1_router(state.policies.clone()).route_layer(auth),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}
