use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Port the server listens on
    pub port: ConfigValue<u16>,
    /// Directory of the built web frontend, if it should be served
    pub static_dir: ConfigValue<Option<PathBuf>>,
    /// Owner assigned to new lists and used to filter list listings
    pub owner: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    owner: Option<String>,
}

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_OWNER: &str = "you";

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    ///
    /// Without an explicit path, `TODOSYNC_CONFIG` and then the platform
    /// config directory are tried.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path =
            config_path.or_else(|| std::env::var("TODOSYNC_CONFIG").ok().map(PathBuf::from));
        Self::load_from(config_path, |key| std::env::var(key).ok())
    }

    fn load_from(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("todosync.db"),
            ConfigSource::Default,
        );
        let mut port = ConfigValue::new(DEFAULT_PORT, ConfigSource::Default);
        let mut static_dir = ConfigValue::new(None, ConfigSource::Default);
        let mut owner = ConfigValue::new(DEFAULT_OWNER.to_string(), ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(file_port) = file_config.port {
                port = ConfigValue::new(file_port, ConfigSource::File);
            }
            if let Some(dir) = file_config.static_dir {
                static_dir = ConfigValue::new(Some(resolve(&path, dir)), ConfigSource::File);
            }
            if let Some(file_owner) = file_config.owner {
                owner = ConfigValue::new(file_owner, ConfigSource::File);
            }

            config_file = Some(path);
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("TODOSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(raw) = env("TODOSYNC_PORT") {
            let parsed = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TODOSYNC_PORT",
                value: raw.clone(),
            })?;
            port = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Some(dir) = env("TODOSYNC_STATIC_DIR") {
            static_dir = ConfigValue::new(Some(PathBuf::from(dir)), ConfigSource::Environment);
        }
        if let Some(env_owner) = env("TODOSYNC_OWNER") {
            owner = ConfigValue::new(env_owner, ConfigSource::Environment);
        }

        Ok(Self {
            database_path,
            port,
            static_dir,
            owner,
            config_file,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/todosync/
    /// - macOS: ~/Library/Application Support/todosync/
    /// - Windows: %APPDATA%/todosync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todosync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/todosync/
    /// - macOS: ~/Library/Application Support/todosync/
    /// - Windows: %APPDATA%/todosync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todosync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}
