//! Health check command.
//!
//! Queries the unauthenticated `/health` endpoint.

use anyhow::{bail, Result};
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Exit non-zero when the server is not healthy
    #[arg(long)]
    strict: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    match format {
        OutputFormat::Table => {
            output::print_header("System Health");
            output::print_detail("Status", &status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }

            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if status == "healthy" {
                output::print_success("Server is healthy");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    if args.strict && status != "healthy" {
        bail!("server reported status '{}'", status);
    }

    Ok(())
}
