//! API request handlers with proper error propagation.
//!
//! All handlers return `Result<impl IntoResponse, CivicaError>` so that errors
//! are converted to the error envelope and HTTP status by the
//! `IntoResponse` implementation on `CivicaError`. Policy has already been
//! checked by the route's layer when a handler runs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::error::{CivicaError, ErrorCode};
use crate::hierarchy::{NewRole, RoleAssignmentRequest, RoleUpdate};
use crate::identity::IdentityContext;
use crate::pagination::PaginationQuery;
use crate::query::{CallerFilters, EntityKind};
use crate::rbac::RoleId;
use crate::scope::NewGrant;
use crate::service::ScopeExplanation;

// ═══════════════════════════════════════════════════════════════════════════════
// Health and Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scoped Entities
// ═══════════════════════════════════════════════════════════════════════════════

/// `GET /{entity}`: pagination keys and filters share the query string.
pub async fn list_entities(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
    ctx: IdentityContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, CivicaError> {
    let pagination = PaginationQuery::from_params(&params)?;
    let window = pagination.validate(&state.pagination)?;
    let filters = CallerFilters::from_query(&params);

    let result = state
        .entities
        .list(
            &ctx,
            kind,
            filters,
            pagination.sort.as_deref(),
            window,
            pagination.is_paginated(),
        )
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

pub async fn get_entity(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
    ctx: IdentityContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, CivicaError> {
    let row = state.entities.get(&ctx, kind, id).await?;
    Ok(Json(ApiResponse::success(row)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Grants
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrantListQuery {
    /// Defaults to `true`.
    pub active_only: Option<bool>,
}

pub async fn list_grants(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Query(query): Query<GrantListQuery>,
) -> Result<impl IntoResponse, CivicaError> {
    let grants = state
        .grants
        .list(&ctx, query.active_only.unwrap_or(true))
        .await?;
    Ok(Json(ApiResponse::success(grants)))
}

pub async fn create_grant(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Json(request): Json<NewGrant>,
) -> Result<impl IntoResponse, CivicaError> {
    let grant = state.grants.create(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(grant))))
}

pub async fn revoke_grant(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CivicaError> {
    let grant = state.grants.revoke(&ctx, id).await?;
    Ok(Json(ApiResponse::success(grant)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_roles(
    State(state): State<AppState>,
    ctx: IdentityContext,
) -> Result<impl IntoResponse, CivicaError> {
    Ok(Json(ApiResponse::success(state.roles.list_roles(&ctx).await?)))
}

pub async fn get_role(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CivicaError> {
    let role = state
        .roles
        .get_role(&ctx, &RoleId::new(id.as_str()))
        .await?
        .ok_or_else(|| CivicaError::new(ErrorCode::RoleNotFound, format!("Role not found: {}", id)))?;
    Ok(Json(ApiResponse::success(role)))
}

pub async fn create_role(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Json(request): Json<NewRole>,
) -> Result<impl IntoResponse, CivicaError> {
    let role = state.roles.create_role(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(role))))
}

pub async fn update_role(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Path(id): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, CivicaError> {
    let role = state.roles.update_role(&ctx, &RoleId::new(id), update).await?;
    Ok(Json(ApiResponse::success(role)))
}

pub async fn assign_role(
    State(state): State<AppState>,
    ctx: IdentityContext,
    Json(request): Json<RoleAssignmentRequest>,
) -> Result<impl IntoResponse, CivicaError> {
    let assignment = state.roles.assign_role(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(assignment))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Caller
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn my_scope(ctx: IdentityContext) -> impl IntoResponse {
    Json(ApiResponse::success(ScopeExplanation::for_context(&ctx)))
}
