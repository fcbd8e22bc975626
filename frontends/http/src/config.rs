use dbs_migrate::EngineConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Service-level configuration: the listen address plus the engine's own
/// layered configuration, loaded from (in increasing precedence) defaults,
/// an optional YAML file, then environment variables — the same pattern
/// `EngineConfig::load` uses, generalized with a listen address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(yaml_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = yaml_path {
            if path.exists() {
                let content = fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("failed to read server config {}: {}", path.display(), e)
                })?;
                config = serde_yaml::from_str(&content).map_err(|e| {
                    anyhow::anyhow!("failed to parse server config {}: {}", path.display(), e)
                })?;
            }
        }

        // Layer the engine's own env-var overrides on top of whatever the
        // YAML file set, mirroring `EngineConfig::load`'s precedence.
        config.engine = EngineConfig::load(yaml_path).map_err(|e| anyhow::anyhow!(e))?;

        if let Ok(addr) = std::env::var("DBS_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        Ok(config)
    }
}
