//! Role management commands.
//!
//! Provides list, show, create, update, and assign operations for roles.

use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    SuperAdmin,
    Estatal,
    Municipal,
    Operativo,
}

#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Tenant,
    Sede,
    Subsede,
    Operativo,
}

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List roles
    List,

    /// Show one role
    Show {
        /// Role ID
        role_id: String,
    },

    /// Create a role
    Create {
        /// Role name
        #[arg(short, long)]
        name: String,

        /// Administrative level
        #[arg(short, long, value_enum)]
        level: Level,

        /// Make the role available in every sede (super-admin only)
        #[arg(long)]
        global: bool,

        /// Permission in `resource:action` form (repeatable)
        #[arg(short, long = "permission")]
        permissions: Vec<String>,
    },

    /// Update a role
    Update {
        /// Role ID
        role_id: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New level
        #[arg(short, long, value_enum)]
        level: Option<Level>,

        /// Replacement permission set (repeatable)
        #[arg(short, long = "permission")]
        permissions: Vec<String>,
    },

    /// Assign a role to a subject
    Assign {
        /// Subject receiving the role
        #[arg(long)]
        subject: String,

        /// Role ID
        #[arg(long)]
        role: String,

        /// Access level of the assignment
        #[arg(long, value_enum)]
        access_level: AccessLevel,

        /// Sede id
        #[arg(long)]
        sede: Option<i64>,

        /// Subsede id
        #[arg(long)]
        subsede: Option<i64>,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Permission {
    resource: String,
    action: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Role {
    id: String,
    name: String,
    level: Level,
    is_global: bool,
    sede_id: Option<i64>,
    permissions: Vec<Permission>,
    is_system: bool,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewRole {
    name: String,
    level: Level,
    is_global: bool,
    permissions: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentRequest {
    subject_id: String,
    role_id: String,
    access_level: AccessLevel,
    sede_id: Option<i64>,
    subsede_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignment {
    subject_id: String,
    role_id: String,
    level: Level,
    access_level: AccessLevel,
    sede_id: Option<i64>,
    subsede_id: Option<i64>,
    assigned_by: String,
    assigned_at: String,
}

#[derive(Tabled, Serialize)]
struct RoleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Permissions")]
    permissions: usize,
    #[tabled(rename = "System")]
    system: String,
}

impl From<&Role> for RoleRow {
    fn from(r: &Role) -> Self {
        let scope = match (r.is_global, r.sede_id) {
            (true, _) => "global".to_string(),
            (false, Some(sede)) => format!("sede {}", sede),
            (false, None) => "-".to_string(),
        };
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            level: format!("{:?}", r.level),
            scope,
            permissions: r.permissions.len(),
            system: if r.is_system { "yes".into() } else { "no".into() },
        }
    }
}

fn check_permissions(permissions: &[String]) -> Result<()> {
    for p in permissions {
        match p.split_once(':') {
            Some((resource, action)) if !resource.is_empty() && !action.is_empty() => {}
            _ => bail!("Invalid permission '{}'. Expected resource:action", p),
        }
    }
    Ok(())
}

fn print_role(role: &Role) {
    output::print_header(&format!("Role: {}", role.name));
    output::print_detail("ID", &role.id);
    output::print_detail("Level", &format!("{:?}", role.level));
    output::print_detail("Global", &role.is_global.to_string());
    if let Some(sede) = role.sede_id {
        output::print_detail("Sede", &sede.to_string());
    }
    output::print_detail("System", &role.is_system.to_string());
    output::print_detail("Updated", &role.updated_at);
    for p in &role.permissions {
        output::print_detail("Permission", &format!("{}:{}", p.resource, p.action));
    }
}

// ── Execute ─────────────────────────────────────────────────────────────────

pub async fn execute(cmd: RoleCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        RoleCommands::List => {
            let roles: Vec<Role> = client.get("/api/v1/roles", &[]).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<RoleRow> = roles.iter().map(RoleRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&roles, format)?,
            }
        }

        RoleCommands::Show { role_id } => {
            let role: Role = client.get(&format!("/api/v1/roles/{}", role_id), &[]).await?;
            match format {
                OutputFormat::Table => print_role(&role),
                _ => output::print_item(&role, format)?,
            }
        }

        RoleCommands::Create {
            name,
            level,
            global,
            permissions,
        } => {
            check_permissions(&permissions)?;
            let req = NewRole {
                name,
                level,
                is_global: global,
                permissions,
            };
            let role: Role = client.post("/api/v1/roles", &req).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Role '{}' created", role.name));
                    output::print_detail("ID", &role.id);
                }
                _ => output::print_item(&role, format)?,
            }
        }

        RoleCommands::Update {
            role_id,
            name,
            level,
            permissions,
        } => {
            check_permissions(&permissions)?;
            let req = RoleUpdate {
                name,
                level,
                permissions: (!permissions.is_empty()).then_some(permissions),
            };
            let role: Role = client
                .put(&format!("/api/v1/roles/{}", role_id), &req)
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Role '{}' updated", role.id));
                    print_role(&role);
                }
                _ => output::print_item(&role, format)?,
            }
        }

        RoleCommands::Assign {
            subject,
            role,
            access_level,
            sede,
            subsede,
        } => {
            let req = AssignmentRequest {
                subject_id: subject,
                role_id: role,
                access_level,
                sede_id: sede,
                subsede_id: subsede,
            };
            let assignment: RoleAssignment =
                client.post("/api/v1/roles/assignments", &req).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!(
                        "Assigned role '{}' to {}",
                        assignment.role_id, assignment.subject_id
                    ));
                    output::print_detail("Access Level", &format!("{:?}", assignment.access_level));
                    output::print_detail("Assigned By", &assignment.assigned_by);
                }
                _ => output::print_item(&assignment, format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_wire_names() {
        assert_eq!(serde_json::to_value(Level::SuperAdmin).unwrap(), "SUPER_ADMIN");
        assert_eq!(serde_json::to_value(AccessLevel::Subsede).unwrap(), "SUBSEDE");
    }

    #[test]
    fn test_check_permissions() {
        assert!(check_permissions(&["fines:read".into(), "grants:create".into()]).is_ok());
        assert!(check_permissions(&["fines".into()]).is_err());
        assert!(check_permissions(&[":read".into()]).is_err());
    }

    #[test]
    fn test_update_omits_unset_fields() {
        let body = serde_json::to_value(RoleUpdate {
            name: Some("Supervisor".into()),
            level: None,
            permissions: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"name": "Supervisor"}));
    }
}
