#![allow(clippy::result_large_err)]
//! # Civica Core
//!
//! Scoped authorization and pagination for a multi-tenant municipal services
//! administration backend.
//!
//! ## Architecture
//!
//! - **Identity**: per-request identity context with typed access and role levels
//! - **RBAC**: pure policy evaluator, static policy table and a tower layer enforcing it
//! - **Hierarchy**: which role levels an actor may create, assign or manage
//! - **Scope**: resolves the sedes and subsedes a caller may see, widened by access grants
//! - **Query**: entity schemas and the filter builder that puts scope first
//! - **Pagination**: validated query windows and a prefetching paginator
//! - **Persistence**: repository trait with Postgres and in-memory backends
//! - **Observability**: structured logging, optional OTLP tracing and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod identity;
pub mod middleware;
pub mod observability;
pub mod pagination;
pub mod persistence;
pub mod query;
pub mod rbac;
pub mod scope;
pub mod service;

pub use error::{CivicaError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{CivicaError, ErrorCode, Result};
    pub use crate::hierarchy::{can_manage, validate_grant_of_level, validate_level_scope, RoleRegistry};
    pub use crate::identity::{AccessLevel, IdentityContext, RoleLevel, SedeId, SubjectId, SubsedeId, TenantId};
    pub use crate::pagination::{PaginatedResult, PaginationMeta, PaginationQuery, Paginator, QueryWindow};
    pub use crate::persistence::{MemoryRepository, Repository, Row};
    pub use crate::query::{build, CallerFilters, EntityKind, QueryPredicate};
    pub use crate::rbac::{evaluate, OperationId, PolicyDecision, PolicyRequirement, PolicyTable};
    pub use crate::scope::{resolve_for, resolve_scope, AccessGrant, GrantTarget, ScopePredicate};
    pub use crate::service::EntityService;
}
