use std::path::{Path, PathBuf};

use anyhow::anyhow;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entities::table::{ClientProfile, ConsentType, TableKind, TableTarget};

pub const API_URL_ENV: &str = "COMPLIANCE_API_URL";
pub const DB_PATH_ENV: &str = "COMPLIANCE_DB";
pub const LOG_ENV: &str = "COMPLIANCE_LOG";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to resolve data directory")]
    NoProjectDirs,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Local SQLite file; `None` uses the platform data directory.
    Sqlite { path: Option<PathBuf> },
    Http {
        base_url: String,
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub client_id: String,
    pub client_name: String,
    pub plant_name: String,
    pub consent: ConsentType,
    pub item_id: String,
    pub table: TableKind,
    pub user: String,
    pub image_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Sqlite { path: None },
            client_id: "local".to_string(),
            client_name: String::new(),
            plant_name: String::new(),
            consent: ConsentType::Cto,
            item_id: "default".to_string(),
            table: TableKind::ProductCompliance,
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "local".to_string()),
            image_timeout_secs: 15,
        }
    }
}

impl AppConfig {
    pub fn target(&self) -> TableTarget {
        TableTarget {
            client_id: self.client_id.clone(),
            consent: self.consent,
            item_id: self.item_id.clone(),
            kind: self.table,
        }
    }

    pub fn profile(&self) -> ClientProfile {
        ClientProfile {
            client_name: self.client_name.clone(),
            plant_name: self.plant_name.clone(),
        }
    }

    /// Parses a config file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment overrides win over the file.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.store = StoreConfig::Http {
                base_url,
                timeout_secs: None,
            };
        } else if let Some(path) = lookup(DB_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.store = StoreConfig::Sqlite {
                path: Some(PathBuf::from(path)),
            };
        }
        self
    }

    pub fn load() -> Result<Self, ConfigError> {
        let dirs = project_dirs().ok_or(ConfigError::NoProjectDirs)?;
        let config = Self::from_file(&dirs.config_dir().join(CONFIG_FILE))?;
        Ok(config.apply_env(|key| std::env::var(key).ok()))
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hellhbbd", "compliance-desk")
}

pub fn default_db_path() -> anyhow::Result<PathBuf> {
    let project_dirs = project_dirs().ok_or_else(|| anyhow!("unable to resolve data directory"))?;
    Ok(project_dirs.data_local_dir().join("compliance.sqlite"))
}

pub fn default_asset_dir() -> anyhow::Result<PathBuf> {
    let project_dirs = project_dirs().ok_or_else(|| anyhow!("unable to resolve data directory"))?;
    Ok(project_dirs.data_local_dir().join("assets"))
}
