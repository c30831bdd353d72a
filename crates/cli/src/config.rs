use mt5bot_data::{ConfigError, DatabaseConfig};
use mt5bot_engine::RunnerConfig;
use mt5bot_strategies::CoinFlipConfig;
use mt5bot_terminal::TerminalConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "mt5bot.toml";

/// Everything read from the TOML config file. The `[postgresql]` section
/// is resolved separately, see [`database_url`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub terminal: TerminalConfig,
    pub runner: RunnerConfig,
    pub strategy: CoinFlipConfig,
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// The config file to read: the explicit one, else the default if present.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        }
    }
}

/// Database URL from the command line, else from `[postgresql]`.
pub fn database_url(
    explicit: Option<&str>,
    config_path: Option<&Path>,
) -> Result<Option<String>, ConfigError> {
    if let Some(url) = explicit {
        return Ok(Some(url.to_string()));
    }
    let Some(path) = config_path else {
        return Ok(None);
    };
    match DatabaseConfig::from_file(path) {
        Ok(db) => Ok(Some(db.connection_url())),
        Err(ConfigError::MissingSection { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sections_default_when_absent() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.terminal.port, 5556);
        assert_eq!(config.runner.max_trades, 1);
    }

    #[test]
    fn test_partial_sections() {
        let raw = r#"
[terminal]
host = "10.0.0.5"

[runner]
symbols = ["EURUSD", "GBPUSD"]
max_trades = 3
volume = "0.10"

[strategy]
entry_probability = 0.25

[postgresql]
host = "db"
"#;
        let config = AppConfig::from_toml(raw).unwrap();
        assert_eq!(config.terminal.host, "10.0.0.5");
        assert_eq!(config.terminal.port, 5556);
        assert_eq!(config.runner.symbols.len(), 2);
        assert_eq!(config.runner.max_trades, 3);
        assert_eq!(config.runner.volume, dec!(0.10));
        assert_eq!(config.runner.delay_ms, 10);
        assert_eq!(config.strategy.entry_probability, 0.25);
    }

    #[test]
    fn test_database_url_precedence() {
        let path = std::env::temp_dir().join(format!("mt5bot-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "[postgresql]\nhost = \"db\"\n").unwrap();

        let from_flag = database_url(Some("postgres://x@y/z"), Some(&path)).unwrap();
        assert_eq!(from_flag.as_deref(), Some("postgres://x@y/z"));

        let from_file = database_url(None, Some(&path)).unwrap();
        assert_eq!(from_file.as_deref(), Some("postgres://mt5bot:mt5bot@db:5432/mt5bot"));

        std::fs::write(&path, "[terminal]\nport = 1\n").unwrap();
        assert_eq!(database_url(None, Some(&path)).unwrap(), None);
        std::fs::remove_file(&path).ok();

        assert_eq!(database_url(None, None).unwrap(), None);
    }
}
