//! Organizational units: which sede each subsede belongs to.
//!
//! Grant targets and role assignments name a subsede together with its
//! sede. Only the subsede id is trusted; the parent sede always comes from
//! the directory.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CivicaError, Result};
use crate::identity::{SedeId, SubsedeId};
use crate::scope::ScopePredicate;

/// Authoritative subsede to sede mapping.
#[async_trait]
pub trait UnitDirectory: Send + Sync {
    /// Parent sede of a subsede, or `None` if the subsede is not registered.
    async fn sede_of(&self, subsede: SubsedeId) -> Result<Option<SedeId>>;

    /// Register a subsede under a sede, replacing any earlier parent.
    async fn register(&self, subsede: SubsedeId, sede: SedeId) -> Result<()>;
}

/// In-memory unit directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryUnitDirectory {
    parents: Arc<DashMap<SubsedeId, SedeId>>,
}

impl MemoryUnitDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory holding `(subsede, sede)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let directory = Self::new();
        for (subsede, sede) in pairs {
            directory.parents.insert(SubsedeId(subsede), SedeId(sede));
        }
        directory
    }
}

#[async_trait]
impl UnitDirectory for MemoryUnitDirectory {
    async fn sede_of(&self, subsede: SubsedeId) -> Result<Option<SedeId>> {
        Ok(self.parents.get(&subsede).map(|s| *s))
    }

    async fn register(&self, subsede: SubsedeId, sede: SedeId) -> Result<()> {
        self.parents.insert(subsede, sede);
        Ok(())
    }
}

/// Check that a unit lies inside `scope`.
///
/// A subsede is placed under the sede the directory records for it, not the
/// one the caller names. Under a sede scope an unregistered subsede is out of
/// scope. A named sede that disagrees with the directory is a validation
/// error.
pub async fn check_unit(
    scope: &ScopePredicate,
    units: &dyn UnitDirectory,
    sede: Option<SedeId>,
    subsede: Option<SubsedeId>,
) -> Result<()> {
    let Some(subsede) = subsede else {
        return match sede {
            Some(sede) if scope.admits(Some(sede), None) => Ok(()),
            Some(sede) => Err(CivicaError::out_of_scope(sede)),
            None if scope.is_unrestricted() => Ok(()),
            None => Err(CivicaError::out_of_scope("no unit")),
        };
    };

    let parent = units.sede_of(subsede).await?;
    debug!(subsede = %subsede, parent = ?parent, claimed = ?sede, "Unit lookup");

    let admitted = match (scope, parent) {
        (ScopePredicate::Sedes(_), None) => false,
        _ => scope.admits(parent.or(sede), Some(subsede)),
    };
    if !admitted {
        return Err(CivicaError::out_of_scope(subsede));
    }

    match (parent, sede) {
        (Some(parent), Some(claimed)) if parent != claimed => Err(CivicaError::validation(format!(
            "{} belongs to {}, not {}",
            subsede, parent, claimed
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn sedes(ids: &[i64]) -> ScopePredicate {
        ScopePredicate::Sedes(ids.iter().map(|i| SedeId(*i)).collect())
    }

    fn directory() -> MemoryUnitDirectory {
        MemoryUnitDirectory::from_pairs([(7, 1), (9, 1), (20, 2)])
    }

    #[tokio::test]
    async fn test_parent_comes_from_directory() {
        let units = directory();
        let err = check_unit(&sedes(&[1]), &units, Some(SedeId(1)), Some(SubsedeId(20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);

        assert!(check_unit(&sedes(&[1]), &units, Some(SedeId(1)), Some(SubsedeId(9)))
            .await
            .is_ok());
        assert!(check_unit(&sedes(&[1]), &units, None, Some(SubsedeId(7)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_subsede_under_sede_scope() {
        let units = directory();
        let err = check_unit(&sedes(&[1]), &units, Some(SedeId(1)), Some(SubsedeId(99)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfScope);

        // Subsede scopes compare the subsede id itself.
        let own = ScopePredicate::Subsedes([SubsedeId(99)].into_iter().collect());
        assert!(check_unit(&own, &units, Some(SedeId(1)), Some(SubsedeId(99)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mismatched_parent_rejected() {
        let units = directory();
        let err = check_unit(
            &ScopePredicate::Unrestricted,
            &units,
            Some(SedeId(1)),
            Some(SubsedeId(20)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_sede_only_units() {
        let units = MemoryUnitDirectory::new();
        assert!(check_unit(&sedes(&[1]), &units, Some(SedeId(1)), None).await.is_ok());
        assert_eq!(
            check_unit(&sedes(&[1]), &units, Some(SedeId(2)), None)
                .await
                .unwrap_err()
                .code(),
            ErrorCode::OutOfScope
        );
        assert!(check_unit(&ScopePredicate::Unrestricted, &units, None, None).await.is_ok());
        assert!(check_unit(&ScopePredicate::Nothing, &units, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_register_replaces_parent() {
        let units = MemoryUnitDirectory::new();
        units.register(SubsedeId(7), SedeId(1)).await.unwrap();
        units.register(SubsedeId(7), SedeId(3)).await.unwrap();
        assert_eq!(units.sede_of(SubsedeId(7)).await.unwrap(), Some(SedeId(3)));
        assert_eq!(units.sede_of(SubsedeId(8)).await.unwrap(), None);
    }
}
