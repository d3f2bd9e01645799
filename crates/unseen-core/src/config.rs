use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COALESCE_WINDOW_MS, DEFAULT_RESUBSCRIBE_DELAY_SECS, DEFAULT_SENDER_LABEL,
    DEFAULT_SNAPSHOT_INTERVAL_SECS,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("staffId must not be empty")]
    MissingStaffId,
    #[error("snapshotIntervalSecs must be greater than zero")]
    ZeroSnapshotInterval,
}

/// Engine configuration, injected at construction.
///
/// Identity (who the local user is) lives here rather than in ambient state so
/// the engine can be driven from tests with any identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Staff id of the local user; messages from this id never notify
    #[serde(default)]
    pub staff_id: String,

    /// Tenant the staff member works in; sent as `X-Tenant-Id` on snapshot
    /// requests unless the loader config names its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Zero ticks after every mutation
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    #[serde(default = "default_resubscribe_delay_secs")]
    pub resubscribe_delay_secs: u64,

    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
}

fn default_snapshot_interval_secs() -> u64 {
    DEFAULT_SNAPSHOT_INTERVAL_SECS
}

fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW_MS
}

fn default_resubscribe_delay_secs() -> u64 {
    DEFAULT_RESUBSCRIBE_DELAY_SECS
}

fn default_fallback_label() -> String {
    DEFAULT_SENDER_LABEL.to_string()
}

impl EngineConfig {
    pub fn new(staff_id: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
            tenant_id: None,
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            resubscribe_delay_secs: DEFAULT_RESUBSCRIBE_DELAY_SECS,
            fallback_label: default_fallback_label(),
        }
    }

    /// Load config from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staff_id.trim().is_empty() {
            return Err(ConfigError::MissingStaffId);
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::ZeroSnapshotInterval);
        }
        Ok(())
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay_secs = delay.as_secs();
        self
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_secs(self.resubscribe_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let json = r#"{"staffId": "staff-7"}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.staff_id, "staff-7");
        assert!(config.tenant_id.is_none());
        assert_eq!(config.snapshot_interval_secs, DEFAULT_SNAPSHOT_INTERVAL_SECS);
        assert_eq!(config.coalesce_window(), Duration::from_millis(250));
        assert_eq!(config.fallback_label, "Someone");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "staffId": "staff-7",
            "tenantId": "hotel-1",
            "snapshotIntervalSecs": 10,
            "coalesceWindowMs": 0,
            "resubscribeDelaySecs": 5,
            "fallbackLabel": "A guest"
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("hotel-1"));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(10));
        assert_eq!(config.coalesce_window(), Duration::ZERO);
        assert_eq!(config.resubscribe_delay(), Duration::from_secs(5));
        assert_eq!(config.fallback_label, "A guest");
    }

    #[test]
    fn test_validate_rejects_blank_staff_id() {
        let config = EngineConfig::new("  ");
        assert_eq!(config.validate(), Err(ConfigError::MissingStaffId));

        let config = EngineConfig {
            snapshot_interval_secs: 0,
            ..EngineConfig::new("staff-1")
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroSnapshotInterval));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"staffId": "staff-9", "tenantId": "t"}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.staff_id, "staff-9");
        assert_eq!(config.tenant_id.as_deref(), Some("t"));
    }

    #[test]
    fn test_load_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"staffId": ""}}"#).unwrap();

        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
