use crate::error::{MigrationError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Process-wide configuration for the migration engine. Modeled as an
/// explicit value passed through the engine constructor — never a
/// `static`/`OnceLock` global — per the source's "local DBS base URL" and
/// verbose-flag singletons.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL at which this instance serves its own `/blocks`,
    /// `/blockparents`, `/datasetparents`, `/blockdump` routes — the
    /// `localhost` branch of the remote catalog client.
    pub local_base_url: String,
    /// Number of FAILED->IN_PROGRESS retries before a maintenance routine
    /// promotes a row to TERM_FAILED.
    pub retry_ceiling: u32,
    /// Default processor deadline when a submit/process call omits one.
    pub default_timeout_secs: u64,
    /// Path to the embedded database file.
    pub database_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_base_url: "http://127.0.0.1:8000".to_string(),
            retry_ceiling: 3,
            default_timeout_secs: 30,
            database_path: "dbs.db".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load layered configuration: defaults, then an optional YAML file,
    /// then environment variables, in increasing precedence.
    pub fn load(yaml_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = yaml_path {
            if path.exists() {
                let content = fs::read_to_string(path).map_err(|e| {
                    MigrationError::Config(format!(
                        "failed to read engine config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                config = serde_yaml::from_str(&content).map_err(|e| {
                    MigrationError::Config(format!(
                        "failed to parse engine config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            }
        }

        if let Ok(url) = std::env::var("DBS_LOCAL_BASE_URL") {
            config.local_base_url = url;
        }
        if let Ok(v) = std::env::var("DBS_RETRY_CEILING") {
            config.retry_ceiling = v
                .parse()
                .map_err(|e| MigrationError::Config(format!("invalid DBS_RETRY_CEILING '{}': {}", v, e)))?;
        }
        if let Ok(v) = std::env::var("DBS_DEFAULT_TIMEOUT_SECS") {
            config.default_timeout_secs = v.parse().map_err(|e| {
                MigrationError::Config(format!("invalid DBS_DEFAULT_TIMEOUT_SECS '{}': {}", v, e))
            })?;
        }
        if let Ok(path) = std::env::var("DBS_DATABASE_PATH") {
            config.database_path = path;
        }

        Ok(config)
    }
}
