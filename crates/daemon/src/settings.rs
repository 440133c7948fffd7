// Daemon settings: layered configuration sources
//
// Precedence (low to high): built-in defaults, optional TOML file,
// OPSYNC_* environment variables.

use anyhow::{Context, Result};
use opsync_core::ManagerConfig;
use serde::Deserialize;

const DEFAULT_SYNC_ENDPOINT: &str = "http://localhost:8080/sync";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// SQLite path for the snapshot store; `~` expands to the home dir
    pub db_path: Option<String>,
    /// Remote sync endpoint the HTTP executor ships operations to
    pub sync_endpoint: String,
    /// Engine configuration, validated by the manager at construction
    pub manager: ManagerConfig,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            sync_endpoint: DEFAULT_SYNC_ENDPOINT.to_string(),
            manager: ManagerConfig::default(),
        }
    }
}

impl DaemonSettings {
    /// Load settings from the optional config file plus environment
    /// overrides (OPSYNC_SYNC_ENDPOINT, OPSYNC_MANAGER__QUEUE__MAX_QUEUE_SIZE, ...)
    pub fn load(config_path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("OPSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to assemble configuration sources")?;

        settings
            .try_deserialize::<DaemonSettings>()
            .context("invalid configuration")
    }

    /// Resolved database path, defaulting to the platform data directory
    pub fn resolved_db_path(&self) -> Result<String> {
        match &self.db_path {
            Some(path) => Ok(shellexpand::tilde(path).into_owned()),
            None => {
                let dirs = directories::ProjectDirs::from("", "", "opsync")
                    .context("no home directory available for the default db path")?;
                let dir = dirs.data_dir();
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create data dir {}", dir.display()))?;
                Ok(dir.join("state.db").to_string_lossy().into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_manager_config() {
        let settings = DaemonSettings::default();
        assert!(settings.manager.validate().is_ok());
        assert_eq!(settings.sync_endpoint, DEFAULT_SYNC_ENDPOINT);
    }

    #[test]
    fn test_tilde_expansion() {
        let settings = DaemonSettings {
            db_path: Some("~/opsync/state.db".to_string()),
            ..DaemonSettings::default()
        };
        let resolved = settings.resolved_db_path().unwrap();
        assert!(!resolved.starts_with('~'));
    }
}
