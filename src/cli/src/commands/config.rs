//! Local CLI settings.
//!
//! Values live in `~/.civica/config.toml` under a flat `[values]` table.
//! Flags and environment variables take precedence over stored values.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

/// Keys the CLI reads back.
const KNOWN_KEYS: &[&str] = &["api-url", "token"];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Store a value
    Set {
        /// Setting name (`api-url` or `token`)
        key: String,
        /// Value to store
        value: String,
    },

    /// Print one stored value
    Get {
        /// Setting name
        key: String,
    },

    /// Print every stored value (the token is masked)
    Show,

    /// Delete the settings file
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".civica").join("config.toml"))
    }

    /// Read the settings file; a missing file is an empty config.
    fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("{} is not valid TOML", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Stored values with secrets masked.
    fn displayed(&self) -> BTreeMap<&str, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), display_value(k, v)))
            .collect()
    }
}

fn stored(key: &str) -> Option<String> {
    CliConfig::load().ok()?.values.get(key).cloned()
}

/// Stored `api-url`, if any.
pub fn load_api_url() -> Option<String> {
    stored("api-url")
}

/// Stored bearer `token`, if any.
pub fn load_token() -> Option<String> {
    stored("token")
}

fn display_value(key: &str, value: &str) -> String {
    if key != "token" {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0..=4 => "****".to_string(),
        n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
    }
}

fn check_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!("Unknown setting '{}'. Known settings: {}", key, KNOWN_KEYS.join(", "));
    }
    Ok(())
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            check_key(&key)?;
            let mut cfg = CliConfig::load()?;
            let shown = display_value(&key, &value);
            cfg.values.insert(key.clone(), value);
            cfg.save()?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, shown)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": shown }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = CliConfig::load()?;
            let Some(value) = cfg.values.get(&key) else {
                bail!("'{}' is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Show => {
            let cfg = CliConfig::load()?;
            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in cfg.displayed() {
                        output::print_detail(k, &v);
                    }
                }
                _ => output::print_item(&cfg.displayed(), format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This deletes all stored settings. Re-run with --force to confirm.");
                return Ok(());
            }
            let path = CliConfig::path()?;
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
            output::print_success("Configuration reset");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_masked() {
        assert_eq!(display_value("token", "eyJhbGciOi.abcd1234"), "****1234");
        assert_eq!(display_value("token", "abc"), "****");
        assert_eq!(display_value("api-url", "http://x"), "http://x");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(check_key("api-url").is_ok());
        assert!(check_key("token").is_ok());
        assert!(check_key("api_url").is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let mut cfg = CliConfig::default();
        cfg.values.insert("api-url".into(), "http://civica:8080".into());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.values.get("api-url").map(String::as_str), Some("http://civica:8080"));
    }
}
