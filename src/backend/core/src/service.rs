//! Scoped entity service.
//!
//! The single path from a caller to an entity table: resolve scope, build the
//! predicate with the scope clause first, then paginate. Nothing in the crate
//! reads an entity table any other way.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{CivicaError, Result};
use crate::identity::{AccessLevel, IdentityContext, RoleLevel, SedeId, SubjectId, SubsedeId};
use crate::pagination::{PaginatedResult, Paginator, QueryWindow};
use crate::persistence::{Repository, Row};
use crate::query::{build, parse_sort, scope_clause, CallerFilters, EntityKind, QueryPredicate, ScalarValue, SortField};
use crate::scope::{resolve_for, ScopePredicate};

/// Action that lets a caller include soft-deleted rows.
pub const READ_DELETED_ACTION: &str = "read_deleted";

/// What the caller can see and why. Returned by `GET /me/scope`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeExplanation {
    pub subject_id: SubjectId,
    pub access_level: AccessLevel,
    pub role_level: RoleLevel,
    pub is_super_admin: bool,
    pub sede_id: Option<SedeId>,
    pub subsede_id: Option<SubsedeId>,
    pub granted_sedes: Vec<SedeId>,
    pub granted_subsedes: Vec<SubsedeId>,
    pub scope: ScopePredicate,
}

impl ScopeExplanation {
    pub fn for_context(ctx: &IdentityContext) -> Self {
        Self {
            subject_id: ctx.subject_id().clone(),
            access_level: ctx.access_level(),
            role_level: ctx.role_level(),
            is_super_admin: ctx.is_super_admin(),
            sede_id: ctx.sede_id(),
            subsede_id: ctx.subsede_id(),
            granted_sedes: ctx.granted_sedes().to_vec(),
            granted_subsedes: ctx.granted_subsedes().to_vec(),
            scope: resolve_for(ctx),
        }
    }
}

/// Reads and write checks over scoped entities.
#[derive(Clone)]
pub struct EntityService {
    paginator: Paginator,
}

impl EntityService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            paginator: Paginator::new(repo),
        }
    }

    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// List rows of `kind` visible to the caller.
    #[instrument(skip(self, ctx, filters), fields(subject = %ctx.subject_id(), entity = %kind))]
    pub async fn list(
        &self,
        ctx: &IdentityContext,
        kind: EntityKind,
        mut filters: CallerFilters,
        sort: Option<&str>,
        window: QueryWindow,
        activate_paginated: bool,
    ) -> Result<PaginatedResult<Row>> {
        let schema = kind.schema();

        if filters.include_deleted && !may_read_deleted(ctx, schema.resource) {
            debug!("Caller may not include deleted rows; ignoring includeDeleted");
            filters.include_deleted = false;
        }

        let scope = resolve_for(ctx);
        let predicate = build(kind, &scope, &filters);
        let order: Vec<SortField> = parse_sort(schema, sort);

        self.paginator
            .paginate(schema, &predicate, &order, window, activate_paginated)
            .await
    }

    /// Fetch one row by id.
    ///
    /// A row outside the caller's scope is reported exactly like a missing
    /// row.
    #[instrument(skip(self, ctx), fields(subject = %ctx.subject_id(), entity = %kind))]
    pub async fn get(&self, ctx: &IdentityContext, kind: EntityKind, id: i64) -> Result<Row> {
        let schema = kind.schema();
        let scope = resolve_for(ctx);

        let mut clauses = vec![
            scope_clause(schema, &scope),
            QueryPredicate::Eq {
                field: schema.id_field,
                value: ScalarValue::Integer(id),
            },
        ];
        if let Some(field) = schema.soft_delete_field {
            clauses.push(QueryPredicate::IsNull { field });
        }
        let predicate = QueryPredicate::and(clauses);

        let mut rows = self
            .paginator
            .repository()
            .page(schema, &predicate, &[SortField::asc(schema.id_field)], 0, Some(1))
            .await?;

        rows.pop()
            .ok_or_else(|| CivicaError::not_found(schema.resource, id.to_string()))
    }

    /// Check that a write targeting `sede`/`subsede` stays inside the
    /// caller's scope.
    pub fn authorize_write(
        &self,
        ctx: &IdentityContext,
        kind: EntityKind,
        sede: Option<SedeId>,
        subsede: Option<SubsedeId>,
    ) -> Result<()> {
        let scope = resolve_for(ctx);
        if scope.admits(sede, subsede) {
            return Ok(());
        }

        let target = match (sede, subsede) {
            (Some(s), Some(ss)) => format!("{} {}/{}", kind, s, ss),
            (Some(s), None) => format!("{} {}", kind, s),
            (None, Some(ss)) => format!("{} {}", kind, ss),
            (None, None) => format!("{} without a unit", kind),
        };
        Err(CivicaError::out_of_scope(target))
    }
}

fn may_read_deleted(ctx: &IdentityContext, resource: &str) -> bool {
    ctx.is_super_admin() || ctx.has_permission(&format!("{}:{}", resource, READ_DELETED_ACTION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::persistence::MemoryRepository;
    use serde_json::json;

    fn service() -> EntityService {
        let repo = MemoryRepository::new();
        repo.extend(
            EntityKind::Fines,
            vec![
                json!({"id": 1, "sede_id": 1, "subsede_id": 7, "issued_at": "2024-01-01T00:00:00Z"}),
                json!({"id": 2, "sede_id": 1, "subsede_id": 8, "issued_at": "2024-01-02T00:00:00Z"}),
                json!({"id": 3, "sede_id": 1, "subsede_id": 7, "issued_at": "2024-01-03T00:00:00Z",
                       "deleted_at": "2024-02-01T00:00:00Z"}),
            ],
        );
        EntityService::new(Arc::new(repo))
    }

    fn subsede_caller(subsede: i64) -> IdentityContext {
        IdentityContext::builder("agent", "t1")
            .sede(1)
            .subsede(subsede)
            .access_level(AccessLevel::Subsede)
            .permission("fines:read")
            .build()
    }

    #[tokio::test]
    async fn test_get_outside_scope_is_not_found() {
        let svc = service();
        let ctx = subsede_caller(7);

        assert!(svc.get(&ctx, EntityKind::Fines, 1).await.is_ok());

        let hidden = svc.get(&ctx, EntityKind::Fines, 2).await.unwrap_err();
        let missing = svc.get(&ctx, EntityKind::Fines, 99).await.unwrap_err();
        assert_eq!(hidden.code(), ErrorCode::RecordNotFound);
        assert_eq!(hidden.code(), missing.code());
        assert_eq!(hidden.http_status(), missing.http_status());
    }

    #[tokio::test]
    async fn test_list_hides_deleted_without_permission() {
        let svc = service();
        let ctx = subsede_caller(7);
        let filters = CallerFilters::default().with_deleted(true);

        let result = svc
            .list(&ctx, EntityKind::Fines, filters.clone(), None, QueryWindow::default(), true)
            .await
            .unwrap();
        assert_eq!(result.pagination.total_items, 1);

        let admin = IdentityContext::builder("admin", "t1")
            .sede(1)
            .subsede(7)
            .access_level(AccessLevel::Subsede)
            .permissions(["fines:read", "fines:read_deleted"])
            .build();
        let result = svc
            .list(&admin, EntityKind::Fines, filters, None, QueryWindow::default(), true)
            .await
            .unwrap();
        assert_eq!(result.pagination.total_items, 2);
    }

    #[test]
    fn test_authorize_write() {
        let svc = service();
        let ctx = subsede_caller(7);

        assert!(svc
            .authorize_write(&ctx, EntityKind::Fines, Some(SedeId(1)), Some(SubsedeId(7)))
            .is_ok());

        let err = svc
            .authorize_write(&ctx, EntityKind::Fines, Some(SedeId(1)), Some(SubsedeId(8)))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_scope_explanation() {
        let ctx = IdentityContext::builder("agent", "t1")
            .subsede(7)
            .access_level(AccessLevel::Subsede)
            .granted_subsedes([SubsedeId(9)])
            .build();
        let explained = ScopeExplanation::for_context(&ctx);
        assert_eq!(
            explained.scope,
            ScopePredicate::Subsedes([SubsedeId(7), SubsedeId(9)].into_iter().collect())
        );
        let json = serde_json::to_value(&explained).unwrap();
        assert_eq!(json["accessLevel"], "SUBSEDE");
        assert_eq!(json["grantedSubsedes"], json!([9]));
    }
}
