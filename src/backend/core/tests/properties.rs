//! Exhaustive property checks over small input domains.
//!
//! Tests cover:
//! - Policy evaluation against every subset of a permission universe
//! - The full role management table
//! - Scope monotonicity under grant and revoke
//! - Pagination consistency and completeness

use std::collections::BTreeSet;
use std::sync::Arc;

use civica_core::hierarchy::{can_manage, validate_grant_of_level};
use civica_core::identity::{AccessLevel, IdentityContext, RoleLevel, SedeId, SubsedeId};
use civica_core::pagination::{Paginator, QueryWindow};
use civica_core::persistence::{MemoryRepository, Repository, Row};
use civica_core::query::{build, CallerFilters, EntityKind, QueryPredicate, SortField};
use civica_core::rbac::{evaluate, PolicyRequirement};
use civica_core::scope::{resolve_scope, ScopePredicate};
use serde_json::json;

const PERMISSIONS: [&str; 4] = ["fines:read", "fines:update", "grants:create", "roles:assign"];

fn subsets<T: Copy>(items: &[T]) -> Vec<Vec<T>> {
    (0..(1u32 << items.len()))
        .map(|mask| {
            items
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, item)| *item)
                .collect()
        })
        .collect()
}

fn requirement(permission: &str) -> PolicyRequirement {
    let (resource, action) = permission.split_once(':').unwrap_or((permission, ""));
    PolicyRequirement::new(resource, action)
}

// ============================================================================
// Policy Evaluator
// ============================================================================

#[test]
fn evaluate_allows_iff_every_requirement_is_held_or_super_admin() {
    for held in subsets(&PERMISSIONS) {
        for required in subsets(&PERMISSIONS) {
            for super_admin in [false, true] {
                let ctx = IdentityContext::builder("s", "t1")
                    .permissions(held.iter().copied())
                    .super_admin(super_admin)
                    .build();
                let reqs: Vec<PolicyRequirement> = required.iter().map(|p| requirement(p)).collect();

                let expected = super_admin || required.iter().all(|p| held.contains(p));
                let decision = evaluate(&reqs, &ctx);
                assert_eq!(
                    decision.is_allowed(),
                    expected,
                    "held={held:?} required={required:?} super_admin={super_admin}"
                );

                if !expected {
                    let missing: BTreeSet<String> =
                        decision.missing().iter().map(|r| r.to_string()).collect();
                    let want: BTreeSet<String> = required
                        .iter()
                        .filter(|p| !held.contains(p))
                        .map(|p| p.to_string())
                        .collect();
                    assert_eq!(missing, want);
                }
            }
        }
    }
}

#[test]
fn super_only_requirement_needs_super_admin_even_with_permission() {
    let req = [PolicyRequirement::super_only("tenants", "purge")];
    let holder = IdentityContext::builder("s", "t1").permission("tenants:purge").build();
    let root = IdentityContext::builder("r", "t1").super_admin(true).build();

    assert!(evaluate(&req, &holder).is_denied());
    assert!(evaluate(&req, &root).is_allowed());
}

// ============================================================================
// Role Hierarchy
// ============================================================================

#[test]
fn can_manage_matches_the_table_for_all_pairs() {
    use RoleLevel::*;
    let levels = [SuperAdmin, Estatal, Municipal, Operativo];
    let table: [(RoleLevel, &[RoleLevel]); 4] = [
        (SuperAdmin, &[SuperAdmin, Estatal, Municipal, Operativo]),
        (Estatal, &[Estatal, Municipal]),
        (Municipal, &[Municipal, Operativo]),
        (Operativo, &[]),
    ];

    let mut checked = 0;
    for (actor, manageable) in table {
        for target in levels {
            assert_eq!(
                can_manage(target, actor),
                manageable.contains(&target),
                "actor={actor:?} target={target:?}"
            );
            checked += 1;
        }
    }
    assert_eq!(checked, 16);

    assert!(!can_manage(SuperAdmin, Estatal));
    assert!(!can_manage(Operativo, Operativo));
}

#[test]
fn only_the_top_level_grants_the_top_level() {
    for actor in [RoleLevel::Estatal, RoleLevel::Municipal, RoleLevel::Operativo] {
        let err = validate_grant_of_level(actor, RoleLevel::SuperAdmin).unwrap_err();
        assert!(err.is_forbidden());
    }
    assert!(validate_grant_of_level(RoleLevel::SuperAdmin, RoleLevel::SuperAdmin).is_ok());
}

// ============================================================================
// Scope Monotonicity
// ============================================================================

/// One fine per (sede, subsede) pair.
fn unit_rows() -> Vec<Row> {
    let mut rows = Vec::new();
    let mut id = 0;
    for sede in 1..=3i64 {
        for subsede in 1..=4i64 {
            id += 1;
            rows.push(json!({"id": id, "sede_id": sede, "subsede_id": sede * 10 + subsede}));
        }
    }
    rows
}

fn visible(scope: &ScopePredicate) -> BTreeSet<i64> {
    let predicate = build(EntityKind::Fines, scope, &CallerFilters::default());
    unit_rows()
        .iter()
        .filter(|row| predicate.matches(row))
        .filter_map(|row| row["id"].as_i64())
        .collect()
}

#[test]
fn subsede_grants_only_ever_add_rows() {
    let pool: Vec<SubsedeId> = [11, 12, 23, 34, 99].map(SubsedeId).to_vec();
    let own = Some(SubsedeId(21));

    for grants in subsets(&pool) {
        let base = visible(&resolve_scope(AccessLevel::Subsede, Some(SedeId(2)), own, &[], &grants, false));
        let own_only = visible(&resolve_scope(AccessLevel::Subsede, Some(SedeId(2)), own, &[], &[], false));
        assert!(own_only.is_subset(&base));

        for extra in &pool {
            let mut widened = grants.clone();
            widened.push(*extra);
            let after = visible(&resolve_scope(AccessLevel::Subsede, Some(SedeId(2)), own, &[], &widened, false));
            assert!(base.is_subset(&after), "grant {extra} removed rows");
            assert!(own_only.is_subset(&after));
        }
    }
}

#[test]
fn sede_grants_only_ever_add_rows() {
    let pool: Vec<SedeId> = [1, 3, 7].map(SedeId).to_vec();

    for grants in subsets(&pool) {
        let with = visible(&resolve_scope(AccessLevel::Sede, Some(SedeId(2)), None, &grants, &[], false));
        let own_only = visible(&resolve_scope(AccessLevel::Sede, Some(SedeId(2)), None, &[], &[], false));
        assert!(own_only.is_subset(&with));

        // Revoking any single grant never adds rows.
        for i in 0..grants.len() {
            let mut revoked = grants.clone();
            revoked.remove(i);
            let after = visible(&resolve_scope(AccessLevel::Sede, Some(SedeId(2)), None, &revoked, &[], false));
            assert!(after.is_subset(&with));
            assert!(own_only.is_subset(&after));
        }
    }
}

#[test]
fn scope_resolution_is_deterministic() {
    let a = resolve_scope(
        AccessLevel::Subsede,
        None,
        Some(SubsedeId(7)),
        &[],
        &[SubsedeId(9), SubsedeId(3), SubsedeId(9)],
        false,
    );
    let b = resolve_scope(
        AccessLevel::Subsede,
        None,
        Some(SubsedeId(7)),
        &[],
        &[SubsedeId(3), SubsedeId(9)],
        false,
    );
    assert_eq!(a, b);
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

// ============================================================================
// Pagination
// ============================================================================

fn paginator_over(n: i64) -> Paginator {
    let repo = MemoryRepository::new();
    repo.extend(
        EntityKind::Permits,
        (1..=n).map(|id| json!({"id": id, "code": format!("P-{}", id % 7), "sede_id": 1})),
    );
    Paginator::new(Arc::new(repo))
}

fn order() -> Vec<SortField> {
    vec![SortField::asc("code"), SortField::asc("id")]
}

#[tokio::test]
async fn first_page_is_a_prefix_of_the_unpaginated_result() {
    let paginator = paginator_over(37);
    let schema = EntityKind::Permits.schema();

    let full = paginator
        .paginate(schema, &QueryPredicate::True, &order(), QueryWindow::default(), false)
        .await
        .unwrap();
    assert_eq!(full.items.len(), 37);
    assert!(!full.pagination.has_next_page);

    for page_size in [1, 5, 10, 37, 100] {
        let first = paginator
            .paginate(schema, &QueryPredicate::True, &order(), QueryWindow::new(1, page_size, 0), true)
            .await
            .unwrap();
        let take = (page_size as usize).min(full.items.len());
        assert_eq!(first.items, full.items[..take].to_vec());
    }
}

#[tokio::test]
async fn concatenated_pages_reproduce_the_full_result() {
    let paginator = paginator_over(37);
    let schema = EntityKind::Permits.schema();
    let full = paginator
        .paginate(schema, &QueryPredicate::True, &order(), QueryWindow::default(), false)
        .await
        .unwrap()
        .items;

    for page_size in [1u64, 4, 10, 36, 37, 50] {
        let total_pages = paginator
            .paginate(schema, &QueryPredicate::True, &order(), QueryWindow::new(1, page_size, 0), true)
            .await
            .unwrap()
            .pagination
            .total_pages;

        let mut concatenated = Vec::new();
        for page in 1..=total_pages {
            let result = paginator
                .paginate(schema, &QueryPredicate::True, &order(), QueryWindow::new(page, page_size, 0), true)
                .await
                .unwrap();
            concatenated.extend(result.items);
        }
        assert_eq!(concatenated, full, "page_size={page_size}");

        // The same rows come back through a single prefetch window.
        let windowed = paginator
            .paginate(
                schema,
                &QueryPredicate::True,
                &order(),
                QueryWindow::new(1, page_size, total_pages),
                true,
            )
            .await
            .unwrap();
        assert!(windowed.next_pages.len() as u64 <= total_pages.saturating_sub(1));
        assert_eq!(windowed.into_all_items(), full);
    }
}

#[tokio::test]
async fn repository_count_matches_unpaginated_length() {
    let repo = MemoryRepository::new();
    repo.extend(EntityKind::Permits, (1..=12).map(|id| json!({"id": id, "sede_id": id % 3})));
    let scope = ScopePredicate::Sedes([SedeId(1), SedeId(2)].into_iter().collect());
    let predicate = build(EntityKind::Permits, &scope, &CallerFilters::default());

    let schema = EntityKind::Permits.schema();
    let count = repo.count(schema, &predicate).await.unwrap();
    let rows = repo.page(schema, &predicate, &order(), 0, None).await.unwrap();
    assert_eq!(count, rows.len() as u64);
    assert_eq!(count, 8);
}
