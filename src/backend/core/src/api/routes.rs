//! V1 API routes.

use axum::{
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::convert::Infallible;
use std::sync::Arc;

use super::{handlers, AppState};
use crate::query::EntityKind;
use crate::rbac::{OperationId, PolicyTable, RequirePolicyLayer};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

fn policy(table: &Arc<PolicyTable>, operation: OperationId) -> RequirePolicyLayer {
    RequirePolicyLayer::new(table.clone(), operation)
}

/// Build the V1 API router. Every route carries its operation's policy.
///
/// # Endpoints
///
/// ## Scoped entities
/// (`fines`, `permits`, `patrol-units`, `field-agents`, `users`)
/// - `GET /api/v1/{entity}` - List with filters, sort, pagination and prefetch
/// - `GET /api/v1/{entity}/:id` - Get one row
///
/// ## Access grants
/// - `GET /api/v1/grants` - List grants visible to the caller
/// - `POST /api/v1/grants` - Create a grant
/// - `DELETE /api/v1/grants/:id` - Revoke (deactivate) a grant
///
/// ## Roles
/// - `GET /api/v1/roles` - List visible roles
/// - `GET /api/v1/roles/:id` - Get a role
/// - `POST /api/v1/roles` - Create a role
/// - `PUT /api/v1/roles/:id` - Update a role
/// - `POST /api/v1/roles/assignments` - Assign a role to a subject
///
/// ## Caller
/// - `GET /api/v1/me/scope` - Explain the caller's resolved scope
pub fn v1_router(table: Arc<PolicyTable>) -> Router<AppState> {
    let mut router = Router::new();

    for kind in EntityKind::ALL {
        router = router
            .route(
                &format!("/{}", kind.path()),
                get(handlers::list_entities)
                    .layer::<_, Infallible>(Extension(kind))
                    .layer(policy(&table, OperationId::ListEntities(kind))),
            )
            .route(
                &format!("/{}/:id", kind.path()),
                get(handlers::get_entity)
                    .layer::<_, Infallible>(Extension(kind))
                    .layer(policy(&table, OperationId::GetEntity(kind))),
            );
    }

    router
        // Grants
        .route(
            "/grants",
            get(handlers::list_grants).layer(policy(&table, OperationId::ListGrants)),
        )
        .route(
            "/grants",
            post(handlers::create_grant).layer(policy(&table, OperationId::CreateGrant)),
        )
        .route(
            "/grants/:id",
            delete(handlers::revoke_grant).layer(policy(&table, OperationId::RevokeGrant)),
        )
        // Roles
        .route(
            "/roles",
            get(handlers::list_roles).layer(policy(&table, OperationId::ListRoles)),
        )
        .route(
            "/roles",
            post(handlers::create_role).layer(policy(&table, OperationId::CreateRole)),
        )
        .route(
            "/roles/assignments",
            post(handlers::assign_role).layer(policy(&table, OperationId::AssignRole)),
        )
        .route(
            "/roles/:id",
            get(handlers::get_role).layer(policy(&table, OperationId::ListRoles)),
        )
        .route(
            "/roles/:id",
            put(handlers::update_role).layer(policy(&table, OperationId::UpdateRole)),
        )
        // Caller
        .route(
            "/me/scope",
            get(handlers::my_scope).layer(policy(&table, OperationId::ReadOwnScope)),
        )
}
