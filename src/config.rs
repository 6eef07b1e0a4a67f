use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "RISK_DASHBOARD_CONFIG";
pub const DATABASE_ENV: &str = "RISK_DASHBOARD_DB";
pub const DEFAULT_CONFIG_FILE: &str = "risk-dashboard.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

/// Process-level settings read before the database is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_filter: String,
    /// Seeded when no user with this name exists.
    pub admin: Option<AdminConfig>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/risk-dashboard.db"),
            log_dir: PathBuf::from("logs"),
            log_filter: "info".to_string(),
            admin: None,
        }
    }
}

impl BootstrapConfig {
    /// Reads the file named by `RISK_DASHBOARD_CONFIG` (or the default file in
    /// the working directory) and applies environment overrides.
    pub fn load() -> AppResult<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config = Self::from_file(&path)?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(DATABASE_ENV).filter(|value| !value.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        self
    }
}
