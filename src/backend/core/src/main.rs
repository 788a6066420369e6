//! Civica Server - Main entry point
//!
//! Serves scoped municipal records behind the policy, hierarchy and scope
//! layers of `civica_core`.

use std::net::SocketAddr;
use std::sync::Arc;

use civica_core::{
    api::{self, AppState},
    config::Config,
    hierarchy::{MemoryRoleStore, MemoryUnitDirectory, RoleRegistry},
    identity::{SedeId, SubsedeId},
    observability::{self, metrics},
    persistence::{Database, MemoryRepository, PgGrantStore, PgRepository, PgRoleStore, PgUnitDirectory, Repository},
    scope::{GrantStore, MemoryGrantStore},
};

/// Optional path to a TOML configuration file.
const CONFIG_PATH_VAR: &str = "CIVICA_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let loaded = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    // Initialize observability
    observability::init("civica-server", &config.observability)?;
    let prometheus = metrics::install_prometheus()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Civica Server");

    if config.auth.uses_default_secret() {
        tracing::warn!("auth.jwt_secret is the built-in development secret; set CIVICA__AUTH__JWT_SECRET");
    }

    // Storage backend
    let (repository, grant_store, roles): (Arc<dyn Repository>, Arc<dyn GrantStore>, RoleRegistry) =
        match config.database.url.as_deref() {
            Some(url) => {
                let db = Database::connect(url, &config.database).await?;
                tracing::info!("Connected to database");
                if config.database.run_migrations {
                    db.migrate().await?;
                    tracing::info!("Database migrations applied");
                }
                let roles = RoleRegistry::new(
                    Arc::new(PgRoleStore::new(&db)),
                    Arc::new(PgUnitDirectory::new(&db)),
                );
                (Arc::new(PgRepository::new(&db)), Arc::new(PgGrantStore::new(&db)), roles)
            }
            None => {
                tracing::warn!("No database url configured; using the in-memory backend");
                let roles = RoleRegistry::new(
                    Arc::new(MemoryRoleStore::new()),
                    Arc::new(MemoryUnitDirectory::new()),
                );
                (
                    Arc::new(MemoryRepository::new()),
                    Arc::new(MemoryGrantStore::new()),
                    roles,
                )
            }
        };

    roles.seed_defaults().await?;
    for unit in &config.units {
        roles
            .units()
            .register(SubsedeId(unit.subsede_id), SedeId(unit.sede_id))
            .await?;
    }
    tracing::info!(units = config.units.len(), "Unit directory loaded from configuration");

    let state = AppState::new(repository, grant_store, roles, &config).with_metrics(prometheus);

    // Build router
    let app = api::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
