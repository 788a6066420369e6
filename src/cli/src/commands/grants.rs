//! Access grant commands.
//!
//! Provides list, create and revoke operations for explicit sede and subsede
//! visibility grants.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum GrantCommands {
    /// List grants
    List {
        /// Include revoked grants
        #[arg(short, long)]
        all: bool,
    },

    /// Grant a subject visibility over a sede or one of its subsedes
    Create {
        /// Subject receiving the grant
        #[arg(long)]
        actor: String,

        /// Sede id
        #[arg(long)]
        sede: i64,

        /// Subsede id; omit to grant the whole sede
        #[arg(long)]
        subsede: Option<i64>,
    },

    /// Revoke a grant
    Revoke {
        /// Grant ID
        grant_id: Uuid,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GrantTarget {
    Sede { sede_id: i64 },
    Subsede { sede_id: i64, subsede_id: i64 },
}

impl GrantTarget {
    fn new(sede_id: i64, subsede_id: Option<i64>) -> Self {
        match subsede_id {
            Some(subsede_id) => Self::Subsede { sede_id, subsede_id },
            None => Self::Sede { sede_id },
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Sede { sede_id } => format!("sede {}", sede_id),
            Self::Subsede { sede_id, subsede_id } => {
                format!("subsede {} (sede {})", subsede_id, sede_id)
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewGrant {
    actor_id: String,
    target: GrantTarget,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessGrant {
    id: Uuid,
    actor_id: String,
    target: GrantTarget,
    active: bool,
    granted_by: String,
    created_at: String,
    revoked_at: Option<String>,
    revoked_by: Option<String>,
}

#[derive(Tabled, Serialize)]
struct GrantRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Granted By")]
    granted_by: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&AccessGrant> for GrantRow {
    fn from(g: &AccessGrant) -> Self {
        Self {
            id: g.id.to_string()[..8].to_string(),
            actor: g.actor_id.clone(),
            target: g.target.describe(),
            active: if g.active { "yes".into() } else { "no".into() },
            granted_by: g.granted_by.clone(),
            created: g.created_at.clone(),
        }
    }
}

// ── Execute ─────────────────────────────────────────────────────────────────

pub async fn execute(cmd: GrantCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        GrantCommands::List { all } => {
            let query = vec![("activeOnly".to_string(), (!all).to_string())];
            let grants: Vec<AccessGrant> = client.get("/api/v1/grants", &query).await?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<GrantRow> = grants.iter().map(GrantRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&grants, format)?,
            }
        }

        GrantCommands::Create { actor, sede, subsede } => {
            let req = NewGrant {
                actor_id: actor,
                target: GrantTarget::new(sede, subsede),
            };
            let grant: AccessGrant = client.post("/api/v1/grants", &req).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!(
                        "Granted {} access to {}",
                        grant.actor_id,
                        grant.target.describe()
                    ));
                    output::print_detail("Grant ID", &grant.id.to_string());
                }
                _ => output::print_item(&grant, format)?,
            }
        }

        GrantCommands::Revoke { grant_id } => {
            let path = format!("/api/v1/grants/{}", grant_id);
            let grant: AccessGrant = client.delete(&path).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Grant {} revoked", grant_id));
                    if let Some(by) = &grant.revoked_by {
                        output::print_detail("Revoked By", by);
                    }
                }
                _ => output::print_item(&grant, format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_wire_shape() {
        let sede = serde_json::to_value(GrantTarget::new(3, None)).unwrap();
        assert_eq!(sede, serde_json::json!({"type": "sede", "sede_id": 3}));

        let subsede = serde_json::to_value(GrantTarget::new(3, Some(31))).unwrap();
        assert_eq!(
            subsede,
            serde_json::json!({"type": "subsede", "sede_id": 3, "subsede_id": 31})
        );
    }
}
