//! CLI configuration file
//!
//! ```json
//! {
//!   "database_path": "./tasks.db",
//!   "backup_dir": "./backups",
//!   "compress": true,
//!   "retention_days": 30,
//!   "verify_before_restore": true
//! }
//! ```
//!
//! Only `database_path` is required.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::backup::BackupConfig;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Task store database file (required)
    pub database_path: String,

    /// Artifact directory (optional, default "./backups")
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Compress artifacts (optional, default true)
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Days before a new backup expires (optional, default: never)
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// Verify artifacts before restoring (optional, default true)
    #[serde(default = "default_true")]
    pub verify_before_restore: bool,
}

fn default_backup_dir() -> String {
    "./backups".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.database_path.trim().is_empty() {
            return Err(CliError::config_error("database_path must not be empty"));
        }
        if self.backup_dir.trim().is_empty() {
            return Err(CliError::config_error("backup_dir must not be empty"));
        }
        if self.retention_days == Some(0) {
            return Err(CliError::config_error("retention_days must be > 0"));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }

    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            backup_dir: PathBuf::from(&self.backup_dir),
            compress: self.compress,
            retention_days: self.retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_json(r#"{"database_path": "tasks.db"}"#).unwrap();
        assert_eq!(config.backup_dir, "./backups");
        assert!(config.compress);
        assert!(config.verify_before_restore);
        assert_eq!(config.retention_days, None);

        let backup = config.backup_config();
        assert_eq!(backup.backup_dir, PathBuf::from("./backups"));
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_json(
            r#"{
                "database_path": "/var/lib/trackdb/tasks.db",
                "backup_dir": "/var/backups/trackdb",
                "compress": false,
                "retention_days": 14,
                "verify_before_restore": false
            }"#,
        )
        .unwrap();
        assert!(!config.compress);
        assert_eq!(config.backup_config().retention_days, Some(14));
        assert!(!config.verify_before_restore);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        for json in [
            r#"{}"#,
            r#"{"database_path": ""}"#,
            r#"{"database_path": "x", "backup_dir": " "}"#,
            r#"{"database_path": "x", "retention_days": 0}"#,
            r#"{"database_path": "x", "unknown": 1}"#,
            "not json",
        ] {
            assert!(
                matches!(Config::from_json(json), Err(CliError::Config(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/trackdb.json"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
