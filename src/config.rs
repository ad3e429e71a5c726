use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::protocol::DEFAULT_PORT;

pub const DEFAULT_CONFIG_FILE: &str = "relayc.toml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Who this client is once registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    pub timeout_secs: u64,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub key_store_path: Option<PathBuf>,
    pub identity: Option<Identity>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: DEFAULT_PORT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            private_key_path: PathBuf::from("relayc_private.pem"),
            public_key_path: PathBuf::from("relayc_public.pem"),
            key_store_path: Some(PathBuf::from("relayc_keys.bin")),
            identity: None,
        }
    }
}

impl ClientConfig {
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)?;
            let config: ClientConfig = toml::from_str(&content)
                .with_context(|| format!("invalid config file {}", config_file))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            tracing::info!("Wrote default configuration to {}", config_file);
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Apply a `host:port` override
    pub fn set_server(&mut self, addr: &str) -> Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("server address '{}' is not host:port", addr))?;
        self.server_port = port
            .parse()
            .with_context(|| format!("invalid port in '{}'", addr))?;
        self.server_host = host.to_string();
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
