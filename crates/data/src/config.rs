use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors raised while loading configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Section [{section}] not found in {path}")]
    MissingSection { section: String, path: PathBuf },
}

/// Load and deserialize one `[section]` of a TOML file.
pub fn load_section<T: DeserializeOwned>(path: &Path, section: &str) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_section(&raw, section).map_err(|e| match e {
        SectionError::Missing => ConfigError::MissingSection {
            section: section.to_string(),
            path: path.to_path_buf(),
        },
        SectionError::Invalid(message) => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
    })
}

enum SectionError {
    Missing,
    Invalid(String),
}

fn parse_section<T: DeserializeOwned>(raw: &str, section: &str) -> Result<T, SectionError> {
    let mut table: toml::Table = raw
        .parse()
        .map_err(|e: toml::de::Error| SectionError::Invalid(e.to_string()))?;
    let value = table.remove(section).ok_or(SectionError::Missing)?;
    value
        .try_into()
        .map_err(|e: toml::de::Error| SectionError::Invalid(e.to_string()))
}

/// PostgreSQL connection parameters (the `[postgresql]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "mt5bot".to_string(),
            password: "mt5bot".to_string(),
            database: "mt5bot".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub const SECTION: &'static str = "postgresql";

    /// Read the `[postgresql]` section of a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section(path, Self::SECTION)
    }

    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}
