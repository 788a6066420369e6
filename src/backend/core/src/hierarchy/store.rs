//! Persistence for roles and role assignments.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{CivicaError, ErrorCode, Result};
use crate::identity::SubjectId;
use crate::rbac::{PredefinedRole, Role, RoleAssignment, RoleId};

/// Role and assignment storage behind [`RoleRegistry`](super::RoleRegistry).
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Store a new role. Fails with `DuplicateRecord` if the id is taken.
    async fn insert_role(&self, role: &Role) -> Result<()>;

    /// Replace an existing role. Returns `false` if no role has that id.
    async fn update_role(&self, role: &Role) -> Result<bool>;

    async fn assignment_of(&self, subject: &SubjectId) -> Result<Option<RoleAssignment>>;

    /// Store a subject's assignment, replacing the previous one.
    async fn put_assignment(&self, assignment: &RoleAssignment) -> Result<()>;
}

/// In-memory role store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoleStore {
    roles: Arc<DashMap<RoleId, Role>>,
    assignments: Arc<DashMap<SubjectId, RoleAssignment>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the predefined system roles.
    pub fn with_defaults() -> Self {
        let store = Self::new();
        for role in PredefinedRole::all_defaults() {
            store.roles.insert(role.id.clone(), role);
        }
        store
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        Ok(self.roles.get(id).map(|r| r.clone()))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.iter().map(|r| r.clone()).collect())
    }

    async fn insert_role(&self, role: &Role) -> Result<()> {
        match self.roles.entry(role.id.clone()) {
            Entry::Occupied(_) => Err(CivicaError::new(
                ErrorCode::DuplicateRecord,
                format!("Role {} already exists", role.id),
            )),
            Entry::Vacant(slot) => {
                slot.insert(role.clone());
                Ok(())
            }
        }
    }

    async fn update_role(&self, role: &Role) -> Result<bool> {
        Ok(match self.roles.get_mut(&role.id) {
            Some(mut current) => {
                *current = role.clone();
                true
            }
            None => false,
        })
    }

    async fn assignment_of(&self, subject: &SubjectId) -> Result<Option<RoleAssignment>> {
        Ok(self.assignments.get(subject).map(|a| a.clone()))
    }

    async fn put_assignment(&self, assignment: &RoleAssignment) -> Result<()> {
        self.assignments
            .insert(assignment.subject_id.clone(), assignment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RoleLevel;

    #[tokio::test]
    async fn test_memory_store_roles() {
        let store = MemoryRoleStore::with_defaults();
        assert_eq!(store.list_roles().await.unwrap().len(), 4);

        let mut role = Role::new("r-1", "Inspector", RoleLevel::Operativo);
        store.insert_role(&role).await.unwrap();
        let err = store.insert_role(&role).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);

        role.name = "Senior Inspector".into();
        assert!(store.update_role(&role).await.unwrap());
        let stored = store.get_role(&role.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Senior Inspector");

        let missing = Role::new("r-2", "Ghost", RoleLevel::Operativo);
        assert!(!store.update_role(&missing).await.unwrap());
        assert!(store.get_role(&missing.id).await.unwrap().is_none());
    }
}
