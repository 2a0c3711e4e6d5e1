//! `attune.toml` in the data directory. Every key is optional.
//!
//! ```toml
//! [gateway]
//! timeout_secs = 30
//!
//! [[gateway.providers]]
//! name = "openrouter"
//! base_url = "https://openrouter.ai/api/v1"
//! model = "anthropic/claude-3.5-haiku"
//! api_key_env = "OPENROUTER_API_KEY"
//! max_tokens = 800
//!
//! [sessions]
//! capacity = 256
//! ttl_secs = 3600
//!
//! [engine]
//! history_limit = 50
//! dormancy_decay = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "attune.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub sessions: SessionConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub timeout_secs: u64,
    pub providers: Vec<ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. Unset means no auth header.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Messages kept per session in memory and reloaded on resume.
    pub history_limit: usize,
    pub dormancy_decay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            dormancy_decay: true,
        }
    }
}

impl Config {
    /// Read `attune.toml` from `base_dir`, falling back to defaults when absent.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = config_path(base_dir);
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.sessions.capacity == 0 {
            anyhow::bail!("sessions.capacity must be at least 1");
        }
        Ok(config)
    }
}

pub fn config_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE_NAME)
}
