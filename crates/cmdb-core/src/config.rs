use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::affected::MAX_AFFECTED_DEPTH;

/// Config file looked up in the working directory when `CMDB_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "cmdb.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ordering: OrderingConfig,
    #[serde(default)]
    pub connections: ConnectionConfig,
    #[serde(default)]
    pub affected: AffectedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Clamp requested orders into the valid range of the target group.
    /// When disabled, out-of-range orders are written as given and may leave
    /// a gap in the group.
    #[serde(default = "default_true")]
    pub clamp_out_of_range: bool,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            clamp_out_of_range: default_true(),
        }
    }
}

/// What `create_connection` does when the edge already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Return the existing connection.
    #[default]
    Idempotent,
    /// Fail with a conflict error.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for AffectedConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl AffectedConfig {
    /// Configured depth limited to `1..=MAX_AFFECTED_DEPTH`.
    #[must_use]
    pub fn effective_depth(&self) -> u32 {
        self.max_depth.clamp(1, MAX_AFFECTED_DEPTH)
    }
}

/// Load configuration from an explicit file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<CoreConfig> {
    if !path.exists() {
        return Ok(CoreConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<CoreConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the effective configuration for a process started in `root`.
///
/// Precedence (highest wins): `CMDB_DB` for the store path, then the file
/// named by `CMDB_CONFIG`, then `<root>/cmdb.toml`, then defaults.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be parsed.
pub fn resolve_config(root: &Path) -> Result<CoreConfig> {
    let path = env::var_os("CMDB_CONFIG")
        .map_or_else(|| root.join(CONFIG_FILE_NAME), PathBuf::from);
    let mut config = load_config_file(&path)?;

    if let Some(db) = env::var_os("CMDB_DB") {
        config.store.path = PathBuf::from(db);
    } else if config.store.path.is_relative() {
        config.store.path = root.join(&config.store.path);
    }

    Ok(config)
}

fn default_store_path() -> PathBuf {
    PathBuf::from("cmdb.sqlite3")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_true() -> bool {
    true
}

const fn default_max_depth() -> u32 {
    MAX_AFFECTED_DEPTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: CoreConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config, CoreConfig::default());
        assert!(config.ordering.clamp_out_of_range);
        assert_eq!(config.connections.duplicate_policy, DuplicatePolicy::Idempotent);
        assert_eq!(config.affected.max_depth, 10);
        assert_eq!(config.store.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn sections_override_defaults() {
        let config: CoreConfig = toml::from_str(
            r#"
            [store]
            path = "/var/lib/cmdb/cmdb.sqlite3"

            [ordering]
            clamp_out_of_range = false

            [connections]
            duplicate_policy = "reject"

            [affected]
            max_depth = 3
            "#,
        )
        .expect("parse config");

        assert_eq!(config.store.path, PathBuf::from("/var/lib/cmdb/cmdb.sqlite3"));
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert!(!config.ordering.clamp_out_of_range);
        assert_eq!(config.connections.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.affected.effective_depth(), 3);
    }

    #[test]
    fn depth_is_bounded() {
        let deep = AffectedConfig { max_depth: 500 };
        assert_eq!(deep.effective_depth(), MAX_AFFECTED_DEPTH);
        let zero = AffectedConfig { max_depth: 0 };
        assert_eq!(zero.effective_depth(), 1);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_config_file(&dir.path().join("nope.toml")).expect("load");
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[ordering\nclamp = ").expect("write config");
        let err = load_config_file(&path).expect_err("malformed config must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }
}
