//! Shows how the server resolves the caller's visibility.

use anyhow::Result;
use serde_json::Value;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

fn join_ids(value: Option<&Value>) -> String {
    let ids: Vec<String> = value
        .and_then(|v| v.as_array())
        .map(|ids| ids.iter().map(|id| id.to_string()).collect())
        .unwrap_or_default();
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let explanation: Value = client.get("/api/v1/me/scope", &[]).await?;

    match format {
        OutputFormat::Table => {
            let field = |key: &str| {
                explanation
                    .get(key)
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        Value::Null => "-".to_string(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "-".to_string())
            };

            output::print_header("Caller Scope");
            output::print_detail("Subject", &field("subjectId"));
            output::print_detail("Access Level", &field("accessLevel"));
            output::print_detail("Role Level", &field("roleLevel"));
            output::print_detail("Super Admin", &field("isSuperAdmin"));
            output::print_detail("Sede", &field("sedeId"));
            output::print_detail("Subsede", &field("subsedeId"));
            output::print_detail("Granted Sedes", &join_ids(explanation.get("grantedSedes")));
            output::print_detail(
                "Granted Subsedes",
                &join_ids(explanation.get("grantedSubsedes")),
            );

            let scope = explanation.get("scope");
            let kind = scope
                .and_then(|s| s.get("kind"))
                .and_then(|k| k.as_str())
                .unwrap_or("unknown");
            let ids = join_ids(scope.and_then(|s| s.get("ids")));
            output::print_detail("Visible", &format!("{} [{}]", kind, ids));
        }
        _ => output::print_item(&explanation, format)?,
    }

    Ok(())
}
