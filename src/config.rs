use crate::cache::CacheConfig;
use crate::cli::Cli;
use crate::http_client::HttpClientConfig;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Network configuration for URL sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent sent with every fetch
    pub user_agent: String,
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum number of requests processed at once
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let http = HttpClientConfig::default();
        Self {
            timeout_seconds: http.timeout_seconds,
            user_agent: http.user_agent,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: num_cpus::get() * 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: self.timeout_seconds,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    /// Load configuration with a custom environment provider
    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        // Start with default configuration
        let mut config = Config::default();

        // Load from configuration file if specified
        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else {
            // Try to find configuration files in standard locations
            if let Some(found_config) = Self::find_config_file().await? {
                config = Self::merge_configs(config, found_config);
            }
        }

        // Apply environment variable overrides
        config = Self::apply_environment_overrides_with(env, config)?;

        // Apply CLI argument overrides (highest precedence)
        config = Self::merge_with_cli(config, cli);

        // Validate the final configuration
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            Some("json") => {
                let config: Config = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    let config: Config = serde_json::from_str(&content)?;
                    Ok(config)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "xml-worker.toml",
            "xml-worker.json",
            ".xml-worker.toml",
            ".xml-worker.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-worker");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Cache settings
        if let Some(cache_ttl) = env.get("XML_WORKER_CACHE_TTL") {
            config.cache.time_to_idle_seconds = parse_env("XML_WORKER_CACHE_TTL", &cache_ttl)?;
        }

        if let Some(max_entries) = env.get("XML_WORKER_CACHE_MAX_ENTRIES") {
            config.cache.max_entries = parse_env("XML_WORKER_CACHE_MAX_ENTRIES", &max_entries)?;
        }

        // Network settings
        if let Some(timeout) = env.get("XML_WORKER_TIMEOUT") {
            config.network.timeout_seconds = parse_env("XML_WORKER_TIMEOUT", &timeout)?;
        }

        // Server settings
        if let Some(max_in_flight) = env.get("XML_WORKER_MAX_IN_FLIGHT") {
            config.server.max_in_flight = parse_env("XML_WORKER_MAX_IN_FLIGHT", &max_in_flight)?;
        }

        // Logging settings
        if let Some(level) = env.get("XML_WORKER_LOG_LEVEL") {
            if !logging::is_valid_level(&level) {
                return Err(ConfigError::Environment(format!(
                    "Invalid XML_WORKER_LOG_LEVEL value: {}",
                    level
                )));
            }
            config.logging.level = level.to_ascii_lowercase();
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence when given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        // Cache settings
        if let Some(cache_ttl) = cli.cache_ttl {
            config.cache.time_to_idle_seconds = cache_ttl;
        }
        if let Some(max_entries) = cli.cache_max_entries {
            config.cache.max_entries = max_entries;
        }

        // Network settings
        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }

        // Server settings
        if let Some(max_in_flight) = cli.max_in_flight {
            config.server.max_in_flight = max_in_flight;
        }

        // Logging settings
        if let Some(level) = cli.effective_log_level() {
            config.logging.level = level;
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        // Cache settings
        base.cache.time_to_idle_seconds = override_config.cache.time_to_idle_seconds;
        base.cache.max_entries = override_config.cache.max_entries;

        // Network settings
        base.network.timeout_seconds = override_config.network.timeout_seconds;
        if !override_config.network.user_agent.is_empty() {
            base.network.user_agent = override_config.network.user_agent;
        }

        // Server settings
        base.server.max_in_flight = override_config.server.max_in_flight;

        // Logging settings
        if !override_config.logging.level.is_empty() {
            base.logging.level = override_config.logging.level;
        }

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        // Validate cache settings
        if config.cache.time_to_idle_seconds == 0 {
            return Err(ConfigError::Validation(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        if config.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Cache max entries must be greater than 0".to_string(),
            ));
        }

        // Validate network settings
        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        // Validate server settings
        if config.server.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "Max in-flight requests must be greater than 0".to_string(),
            ));
        }

        // Validate logging settings
        if !logging::is_valid_level(&config.logging.level) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                config.logging.level
            )));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", name, value)))
}
