//! PostgreSQL backend.
//!
//! Predicates compile to SQL with `$N` placeholders. Identifiers come only
//! from the static entity schemas and are quoted; every caller-supplied value
//! is bound as a parameter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{Repository, Row};
use crate::config::DatabaseConfig;
use crate::error::{CivicaError, ErrorCode, Result};
use crate::hierarchy::{RoleStore, UnitDirectory};
use crate::identity::{AccessLevel, RoleLevel, SedeId, SubjectId, SubsedeId};
use crate::query::{EntitySchema, QueryPredicate, ScalarValue, SortField};
use crate::rbac::{Permission, Role, RoleAssignment, RoleId};
use crate::scope::{AccessGrant, GrantStore, GrantTarget};

// ═══════════════════════════════════════════════════════════════════════════════
// Connection
// ═══════════════════════════════════════════════════════════════════════════════

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CivicaError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQL Compilation
// ═══════════════════════════════════════════════════════════════════════════════

/// A SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&ScalarValue> for SqlParam {
    fn from(value: &ScalarValue) -> Self {
        match value {
            ScalarValue::Integer(i) => Self::Integer(*i),
            ScalarValue::Text(s) => Self::Text(s.clone()),
            ScalarValue::Boolean(b) => Self::Bool(*b),
            ScalarValue::Timestamp(ts) => Self::Timestamp(*ts),
        }
    }
}

/// A SQL fragment with associated parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// The SQL string with $N placeholders.
    pub sql: String,
    /// The parameter values, in placeholder order.
    pub params: Vec<SqlParam>,
}

fn column(field: &str) -> String {
    format!("t.\"{}\"", field.replace('"', "\"\""))
}

/// Escape `LIKE` wildcards so the needle matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

struct Compiler {
    params: Vec<SqlParam>,
    offset: usize,
}

impl Compiler {
    fn placeholder(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.offset + self.params.len())
    }

    fn compile(&mut self, predicate: &QueryPredicate) -> String {
        match predicate {
            QueryPredicate::True => "TRUE".to_string(),
            QueryPredicate::False => "FALSE".to_string(),
            QueryPredicate::Eq { field, value } => {
                format!("{} = {}", column(field), self.placeholder(value.into()))
            }
            QueryPredicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            QueryPredicate::In { field, values } => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| self.placeholder(v.into())).collect();
                format!("{} IN ({})", column(field), placeholders.join(", "))
            }
            QueryPredicate::ContainsInsensitive { field, needle } => format!(
                "{} ILIKE {} ESCAPE '\\'",
                column(field),
                self.placeholder(SqlParam::Text(like_pattern(needle)))
            ),
            QueryPredicate::Gte { field, value } => {
                format!("{} >= {}", column(field), self.placeholder(value.into()))
            }
            QueryPredicate::Lte { field, value } => {
                format!("{} <= {}", column(field), self.placeholder(value.into()))
            }
            QueryPredicate::IsNull { field } => format!("{} IS NULL", column(field)),
            QueryPredicate::And { clauses } => self.join(clauses, " AND ", "TRUE"),
            QueryPredicate::Or { clauses } => self.join(clauses, " OR ", "FALSE"),
        }
    }

    fn join(&mut self, clauses: &[QueryPredicate], op: &str, empty: &str) -> String {
        if clauses.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = clauses
            .iter()
            .map(|c| format!("({})", self.compile(c)))
            .collect();
        parts.join(op)
    }
}

/// Compile a predicate to a WHERE-clause body. Placeholders start after
/// `param_offset`.
pub fn compile_predicate(predicate: &QueryPredicate, param_offset: usize) -> SqlFragment {
    let mut compiler = Compiler {
        params: Vec::new(),
        offset: param_offset,
    };
    let sql = compiler.compile(predicate);
    SqlFragment {
        sql,
        params: compiler.params,
    }
}

fn order_clause(order: &[SortField]) -> String {
    if order.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = order
        .iter()
        .map(|s| format!("{} {}", column(s.field), s.direction.sql_keyword()))
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

fn bind_all<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &'q [SqlParam],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.as_str()),
            SqlParam::Integer(i) => query.bind(*i),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Repository
// ═══════════════════════════════════════════════════════════════════════════════

/// Entity rows from PostgreSQL, returned as `to_jsonb` of the table row.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn count(&self, schema: &EntitySchema, predicate: &QueryPredicate) -> Result<u64> {
        let filter = compile_predicate(predicate, 0);
        let sql = format!(
            "SELECT COUNT(*) FROM \"{}\" t WHERE {}",
            schema.table, filter.sql
        );
        debug!(sql = %sql, params = filter.params.len(), "Count query");

        let count: i64 = bind_all(sqlx::query_scalar(&sql), &filter.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn page(
        &self,
        schema: &EntitySchema,
        predicate: &QueryPredicate,
        order: &[SortField],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Row>> {
        let filter = compile_predicate(predicate, 0);
        let mut sql = format!(
            "SELECT to_jsonb(t) FROM \"{}\" t WHERE {}{}",
            schema.table,
            filter.sql,
            order_clause(order)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql.push_str(&format!(" OFFSET {}", offset));
        debug!(sql = %sql, params = filter.params.len(), "Page query");

        let rows: Vec<Row> = bind_all(sqlx::query_scalar(&sql), &filter.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grant Store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(sqlx::FromRow)]
struct GrantRow {
    id: Uuid,
    actor_id: String,
    sede_id: i64,
    subsede_id: Option<i64>,
    active: bool,
    granted_by: String,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
}

impl From<GrantRow> for AccessGrant {
    fn from(row: GrantRow) -> Self {
        let target = match row.subsede_id {
            Some(subsede_id) => GrantTarget::Subsede {
                sede_id: SedeId(row.sede_id),
                subsede_id: SubsedeId(subsede_id),
            },
            None => GrantTarget::Sede {
                sede_id: SedeId(row.sede_id),
            },
        };
        AccessGrant {
            id: row.id,
            actor_id: SubjectId(row.actor_id),
            target,
            active: row.active,
            granted_by: SubjectId(row.granted_by),
            created_at: row.created_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by.map(SubjectId),
        }
    }
}

const GRANT_COLUMNS: &str =
    "id, actor_id, sede_id, subsede_id, active, granted_by, created_at, revoked_at, revoked_by";

/// Access grants in the `access_grants` table. Rows are never deleted.
#[derive(Clone)]
pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn insert(&self, grant: &AccessGrant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_grants (id, actor_id, sede_id, subsede_id, active, granted_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(grant.id)
        .bind(grant.actor_id.as_str())
        .bind(grant.target.sede_id().0)
        .bind(grant.target.subsede_id().map(|s| s.0))
        .bind(grant.active)
        .bind(grant.granted_by.as_str())
        .bind(grant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AccessGrant>> {
        let sql = format!("SELECT {GRANT_COLUMNS} FROM access_grants WHERE id = $1");
        let row: Option<GrantRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AccessGrant::from))
    }

    async fn deactivate(
        &self,
        id: Uuid,
        revoked_by: &SubjectId,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>> {
        sqlx::query(
            r#"
            UPDATE access_grants
            SET active = FALSE, revoked_at = $2, revoked_by = $3
            WHERE id = $1 AND active
            "#,
        )
        .bind(id)
        .bind(revoked_at)
        .bind(revoked_by.as_str())
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    async fn active_for(&self, actor_id: &SubjectId) -> Result<Vec<AccessGrant>> {
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants WHERE actor_id = $1 AND active ORDER BY created_at"
        );
        let rows: Vec<GrantRow> = sqlx::query_as(&sql)
            .bind(actor_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AccessGrant::from).collect())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<AccessGrant>> {
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants WHERE active OR NOT $1 ORDER BY created_at DESC"
        );
        let rows: Vec<GrantRow> = sqlx::query_as(&sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AccessGrant::from).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

fn corrupt(table: &str, detail: String) -> CivicaError {
    CivicaError::with_internal(
        ErrorCode::DeserializationError,
        format!("Stored {} row could not be read", table),
        detail,
    )
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: String,
    name: String,
    level: String,
    is_global: bool,
    sede_id: Option<i64>,
    permissions: Vec<String>,
    is_system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRow> for Role {
    type Error = CivicaError;

    fn try_from(row: RoleRow) -> Result<Self> {
        let level = RoleLevel::parse(&row.level)
            .ok_or_else(|| corrupt("roles", format!("role {} has level '{}'", row.id, row.level)))?;
        let permissions = row
            .permissions
            .iter()
            .map(|p| {
                Permission::parse(p)
                    .ok_or_else(|| corrupt("roles", format!("role {} has permission '{}'", row.id, p)))
            })
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(Role {
            id: RoleId(row.id),
            name: row.name,
            level,
            is_global: row.is_global,
            sede_id: row.sede_id.map(SedeId),
            permissions,
            is_system: row.is_system,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    subject_id: String,
    role_id: String,
    level: String,
    access_level: String,
    sede_id: Option<i64>,
    subsede_id: Option<i64>,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for RoleAssignment {
    type Error = CivicaError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        let level = RoleLevel::parse(&row.level).ok_or_else(|| {
            corrupt("role_assignments", format!("{} has level '{}'", row.subject_id, row.level))
        })?;
        let access_level = AccessLevel::parse(&row.access_level).ok_or_else(|| {
            corrupt(
                "role_assignments",
                format!("{} has access level '{}'", row.subject_id, row.access_level),
            )
        })?;
        Ok(RoleAssignment {
            subject_id: SubjectId(row.subject_id),
            role_id: RoleId(row.role_id),
            level,
            access_level,
            sede_id: row.sede_id.map(SedeId),
            subsede_id: row.subsede_id.map(SubsedeId),
            assigned_by: SubjectId(row.assigned_by),
            assigned_at: row.assigned_at,
        })
    }
}

const ROLE_COLUMNS: &str =
    "id, name, level, is_global, sede_id, permissions, is_system, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str =
    "subject_id, role_id, level, access_level, sede_id, subsede_id, assigned_by, assigned_at";

/// Roles in `roles` and one assignment per subject in `role_assignments`.
#[derive(Clone)]
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row: Option<RoleRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Role::try_from).transpose()
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY created_at");
        let rows: Vec<RoleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Role::try_from).collect()
    }

    async fn insert_role(&self, role: &Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, level, is_global, sede_id, permissions, is_system, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(role.id.as_str())
        .bind(&role.name)
        .bind(role.level.as_str())
        .bind(role.is_global)
        .bind(role.sede_id.map(|s| s.0))
        .bind(role.permission_strings())
        .bind(role.is_system)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_role(&self, role: &Role) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, level = $3, permissions = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(role.id.as_str())
        .bind(&role.name)
        .bind(role.level.as_str())
        .bind(role.permission_strings())
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn assignment_of(&self, subject: &SubjectId) -> Result<Option<RoleAssignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments WHERE subject_id = $1");
        let row: Option<AssignmentRow> = sqlx::query_as(&sql)
            .bind(subject.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RoleAssignment::try_from).transpose()
    }

    async fn put_assignment(&self, assignment: &RoleAssignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments
                (subject_id, role_id, level, access_level, sede_id, subsede_id, assigned_by, assigned_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (subject_id) DO UPDATE SET
                role_id = EXCLUDED.role_id,
                level = EXCLUDED.level,
                access_level = EXCLUDED.access_level,
                sede_id = EXCLUDED.sede_id,
                subsede_id = EXCLUDED.subsede_id,
                assigned_by = EXCLUDED.assigned_by,
                assigned_at = EXCLUDED.assigned_at
            "#,
        )
        .bind(assignment.subject_id.as_str())
        .bind(assignment.role_id.as_str())
        .bind(assignment.level.as_str())
        .bind(assignment.access_level.as_str())
        .bind(assignment.sede_id.map(|s| s.0))
        .bind(assignment.subsede_id.map(|s| s.0))
        .bind(assignment.assigned_by.as_str())
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await?;

        debug!(subject = %assignment.subject_id, "Role assignment stored");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Units
// ═══════════════════════════════════════════════════════════════════════════════

/// Subsede parents in the `subsedes` table.
#[derive(Clone)]
pub struct PgUnitDirectory {
    pool: PgPool,
}

impl PgUnitDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl UnitDirectory for PgUnitDirectory {
    async fn sede_of(&self, subsede: SubsedeId) -> Result<Option<SedeId>> {
        let sede: Option<i64> = sqlx::query_scalar("SELECT sede_id FROM subsedes WHERE id = $1")
            .bind(subsede.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sede.map(SedeId))
    }

    async fn register(&self, subsede: SubsedeId, sede: SedeId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subsedes (id, sede_id) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET sede_id = EXCLUDED.sede_id
            "#,
        )
        .bind(subsede.0)
        .bind(sede.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build, CallerFilters, EntityKind};
    use crate::scope::ScopePredicate;

    #[test]
    fn test_compile_scoped_predicate() {
        let scope = ScopePredicate::Subsedes([SubsedeId(7), SubsedeId(9)].into_iter().collect());
        let pred = build(
            EntityKind::Fines,
            &scope,
            &CallerFilters::default().with_exact("status", "open"),
        );
        let frag = compile_predicate(&pred, 0);

        assert_eq!(
            frag.sql,
            "(t.\"subsede_id\" IN ($1, $2)) AND (t.\"deleted_at\" IS NULL) AND (t.\"status\" = $3)"
        );
        assert_eq!(
            frag.params,
            vec![
                SqlParam::Integer(7),
                SqlParam::Integer(9),
                SqlParam::Text("open".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_sets_compile_closed() {
        let frag = compile_predicate(
            &QueryPredicate::In { field: "subsede_id", values: vec![] },
            0,
        );
        assert_eq!(frag.sql, "FALSE");
        assert_eq!(compile_predicate(&QueryPredicate::or(vec![]), 0).sql, "FALSE");
        assert_eq!(compile_predicate(&QueryPredicate::and(vec![]), 0).sql, "TRUE");
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let frag = compile_predicate(
            &QueryPredicate::ContainsInsensitive {
                field: "folio",
                needle: "50%_a\\b".to_string(),
            },
            2,
        );
        assert_eq!(frag.sql, "t.\"folio\" ILIKE $3 ESCAPE '\\'");
        assert_eq!(frag.params, vec![SqlParam::Text("%50\\%\\_a\\\\b%".to_string())]);
    }

    #[test]
    fn test_order_clause() {
        let order = [SortField::desc("issued_at"), SortField::asc("id")];
        assert_eq!(
            order_clause(&order),
            " ORDER BY t.\"issued_at\" DESC, t.\"id\" ASC"
        );
        assert_eq!(order_clause(&[]), "");
    }

    fn role_row(level: &str, permissions: &[&str]) -> RoleRow {
        let now = Utc::now();
        RoleRow {
            id: "r-1".into(),
            name: "Inspector".into(),
            level: level.into(),
            is_global: false,
            sede_id: Some(1),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_rows_decode() {
        let role = Role::try_from(role_row("MUNICIPAL", &["fines:read", "grants:create"])).unwrap();
        assert_eq!(role.level, RoleLevel::Municipal);
        assert_eq!(role.sede_id, Some(SedeId(1)));
        assert!(role.has_permission(&Permission::new("grants", "create")));

        let err = Role::try_from(role_row("MAYOR", &[])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeserializationError);
        let err = Role::try_from(role_row("OPERATIVO", &["fines"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeserializationError);
    }

    #[test]
    fn test_assignment_rows_decode() {
        let row = AssignmentRow {
            subject_id: "agent".into(),
            role_id: "operativo".into(),
            level: "OPERATIVO".into(),
            access_level: "SUBSEDE".into(),
            sede_id: Some(1),
            subsede_id: Some(7),
            assigned_by: "root".into(),
            assigned_at: Utc::now(),
        };
        let assignment = RoleAssignment::try_from(row).unwrap();
        assert_eq!(assignment.access_level, AccessLevel::Subsede);
        assert_eq!(assignment.subsede_id, Some(SubsedeId(7)));
    }
}
