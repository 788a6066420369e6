//! Role-based access control: the policy evaluator and its dispatch layer.
//!
//! This module provides:
//! - **Models**: Permission, PolicyRequirement, Role and RoleAssignment
//! - **Policy Evaluator**: conjunctive, pure allow/deny over an identity context
//! - **Policy Table**: requirements declared statically per operation
//! - **Authorization Layer**: tower layer enforcing the table on each route
//! - **Predefined Roles**: one template per administrative level
//!
//! # Usage
//!
//! ```rust,ignore
//! use civica_core::rbac::{evaluate, PolicyRequirement, PolicyTable, OperationId};
//!
//! let decision = evaluate(&[PolicyRequirement::new("fines", "read")], &ctx);
//!
//! let table = PolicyTable::standard();
//! let allowed = table.check(&OperationId::CreateGrant, &ctx).is_allowed();
//! ```

pub mod middleware;
pub mod models;
pub mod policy;
pub mod roles;

pub use middleware::{RequirePolicyLayer, RequirePolicyService};
pub use models::{Permission, PolicyRequirement, Role, RoleAssignment, RoleId};
pub use policy::{enforce, evaluate, OperationId, PolicyDecision, PolicyTable};
pub use roles::PredefinedRole;
