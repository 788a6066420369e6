//! Civica CLI - Command-line interface for the Civica administration backend.
//!
//! Provides commands for entity listing, access grants, roles, caller scope,
//! health, and configuration management.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, entities, grants, health, roles, scope};
use output::OutputFormat;

/// Civica - Municipal Administration Backend CLI
#[derive(Parser)]
#[command(
    name = "civica",
    author = "Civica Team",
    version = "0.1.0",
    about = "Civica - Multi-tenant administration backend",
    long_about = "CLI tool for browsing scoped administrative records and managing roles and access grants.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "CIVICA_API_URL")]
    api_url: Option<String>,

    /// Bearer token for authenticated endpoints
    #[arg(long, global = true, env = "CIVICA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse administrative entities
    #[command(subcommand)]
    Entities(entities::EntityCommands),

    /// Access grant management
    #[command(subcommand)]
    Grants(grants::GrantCommands),

    /// Role management
    #[command(subcommand)]
    Roles(roles::RoleCommands),

    /// Show the caller's resolved visibility scope
    Scope,

    /// Check system health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(config::load_api_url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let token = cli.token.clone().or_else(config::load_token);

    let client = client::ApiClient::new(&api_url, token)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Entities(cmd) => entities::execute(cmd, &client, format).await,
        Commands::Grants(cmd) => grants::execute(cmd, &client, format).await,
        Commands::Roles(cmd) => roles::execute(cmd, &client, format).await,
        Commands::Scope => scope::execute(&client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        let unauthorized = e
            .downcast_ref::<client::ClientError>()
            .is_some_and(client::ClientError::is_auth);
        if unauthorized {
            output::print_info("Set a token with `civica config set token <jwt>` or CIVICA_TOKEN");
        }
        std::process::exit(1);
    }

    Ok(())
}
