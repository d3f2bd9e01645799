use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use unseen_core::snapshot::HttpLoaderConfig;
use unseen_core::EngineConfig;

/// CLI configuration that can be loaded from a JSON file.
///
/// Engine settings sit at the top level next to the transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,

    /// Push relay socket for `watch`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    /// Conversations endpoint for `watch`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<HttpLoaderConfig>,
}

impl CliConfig {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            socket_path: None,
            api: None,
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse without validating; the caller may still override the staff id
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("Invalid engine config")?;
        Ok(())
    }

    /// `<config dir>/unseen/config.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unseen").join("config.json"))
    }
}
