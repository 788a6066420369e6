//! Configuration management.

use serde::Deserialize;

/// Environment variable prefix, e.g. `CIVICA__SERVER__PORT`.
const ENV_PREFIX: &str = "CIVICA";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// Pagination bounds
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Subsedes registered in the unit directory at startup
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the server runs on the
    /// in-memory backend.
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Apply embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 shared secret for bearer tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Clock skew tolerance in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    /// Lifetime of tokens issued by [`crate::middleware::Authenticator::generate_token`]
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            issuer: default_issuer(),
            leeway_secs: default_leeway(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl AuthConfig {
    /// Whether the secret is still the development default.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == default_jwt_secret()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the caller gives none
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Largest page size accepted
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// Largest prefetch window accepted
    #[serde(default = "default_max_prefetch")]
    pub max_prefetch: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_prefetch: default_max_prefetch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

/// One `[[units]]` entry: a subsede and the sede it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnitConfig {
    pub subsede_id: i64,
    pub sede_id: i64,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_run_migrations() -> bool { true }
fn default_jwt_secret() -> String { "civica-dev-secret".to_string() }
fn default_issuer() -> String { "civica".to_string() }
fn default_leeway() -> u64 { 30 }
fn default_token_ttl() -> i64 { 3600 }
fn default_page_size() -> u64 { crate::pagination::DEFAULT_PAGE_SIZE }
fn default_max_page_size() -> u64 { crate::pagination::MAX_PAGE_SIZE }
fn default_max_prefetch() -> u64 { crate::pagination::DEFAULT_MAX_PREFETCH }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with the environment layered on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the rest of the crate cannot honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.pagination;
        if p.max_page_size == 0 || p.max_page_size > crate::pagination::MAX_PAGE_SIZE {
            anyhow::bail!(
                "pagination.max_page_size must be within 1..={}",
                crate::pagination::MAX_PAGE_SIZE
            );
        }
        if p.default_page_size == 0 || p.default_page_size > p.max_page_size {
            anyhow::bail!("pagination.default_page_size must be within 1..=max_page_size");
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret must not be empty");
        }
        let mut seen = std::collections::HashMap::new();
        for unit in &self.units {
            if let Some(sede) = seen.insert(unit.subsede_id, unit.sede_id) {
                if sede != unit.sede_id {
                    anyhow::bail!(
                        "units: subsede {} is listed under sedes {} and {}",
                        unit.subsede_id,
                        sede,
                        unit.sede_id
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.pagination.max_page_size, 100);
        assert_eq!(cfg.pagination.max_prefetch, 5);
        assert!(cfg.auth.uses_default_secret());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9090\n\n[pagination]\ndefault_page_size = 10\nmax_prefetch = 3\n\n[auth]\njwt_secret = \"s3cret\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.pagination.default_page_size, 10);
        assert_eq!(cfg.pagination.max_prefetch, 3);
        assert_eq!(cfg.pagination.max_page_size, 100);
        assert!(!cfg.auth.uses_default_secret());
    }

    #[test]
    fn test_units_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[[units]]\nsubsede_id = 7\nsede_id = 1\n\n[[units]]\nsubsede_id = 20\nsede_id = 2"
        )
        .unwrap();

        let cfg = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            cfg.units,
            vec![
                UnitConfig { subsede_id: 7, sede_id: 1 },
                UnitConfig { subsede_id: 20, sede_id: 2 },
            ]
        );
    }

    #[test]
    fn test_validate_rejects_conflicting_units() {
        let cfg = Config {
            units: vec![
                UnitConfig { subsede_id: 7, sede_id: 1 },
                UnitConfig { subsede_id: 7, sede_id: 2 },
            ],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_pages() {
        let mut cfg = Config::default();
        cfg.pagination.max_page_size = 500;
        assert!(cfg.validate().is_err());
    }
}
