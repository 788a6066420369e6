//! Tenant scope: what organizational units a caller can see, and the
//! explicit grants that widen it.

mod grants;
mod predicate;

pub use grants::{
    AccessGrant, GrantService, GrantSets, GrantStore, GrantTarget, MemoryGrantStore, NewGrant,
};
pub use predicate::{resolve_for, resolve_scope, ScopePredicate};
