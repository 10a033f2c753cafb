//! CLI configuration loaded from YAML

use crate::context::specs::{latest_specification, specification_for_version};
use crate::context::{ResolverOptions, Specification};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown RO-Crate specification version: {0}")]
    UnknownSpecification(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Settings for the `crategraph` binary.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding imported crates
    pub database: PathBuf,
    /// One of trace, debug, info, warn, error
    pub log_level: String,
    /// Specification version used for crates without a context and as the
    /// stand-in for unknown context documents
    pub default_specification: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            log_level: "warn".to_string(),
            default_specification: latest_specification().minor_version().to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let config = Self::from_yaml(&text)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.specification()?;
        self.level()?;
        Ok(())
    }

    pub fn specification(&self) -> Result<&'static Specification, ConfigError> {
        specification_for_version(&self.default_specification)
            .ok_or_else(|| ConfigError::UnknownSpecification(self.default_specification.clone()))
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn resolver_options(&self) -> Result<ResolverOptions, ConfigError> {
        Ok(ResolverOptions {
            fallback: self.specification()?,
        })
    }
}

/// `<config_dir>/crategraph/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crategraph").join("config.yaml"))
}

/// `<data_dir>/crategraph/crategraph.db`, falling back to ~/.local/share
pub fn default_database_path() -> PathBuf {
    let data_dir = dirs::data_dir().unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("crategraph").join("crategraph.db")
}
