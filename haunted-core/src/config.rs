use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error::{HauntedError, RetryPolicy};
use crate::models::Stage;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigLoadError> for HauntedError {
    fn from(err: ConfigLoadError) -> Self {
        match err {
            ConfigLoadError::Config(e) => HauntedError::from(e),
            ConfigLoadError::MissingRequired(key) => HauntedError::InvalidConfigValue {
                key,
                message: "Missing required value".to_string(),
            },
            ConfigLoadError::InvalidValue { key, message } => {
                HauntedError::InvalidConfigValue { key, message }
            }
            ConfigLoadError::Io(e) => HauntedError::from(e),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HauntedConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub log_stream: LogStreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_pool_min")]
    pub pool_min_connections: u32,

    #[serde(default = "default_pool_max")]
    pub pool_max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub pool_acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

/// Where one stage's agent service lives and how long a call may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl AgentEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_story_agent")]
    pub story: AgentEndpointConfig,

    #[serde(default = "default_asset_agent")]
    pub asset: AgentEndpointConfig,

    #[serde(default = "default_code_agent")]
    pub code: AgentEndpointConfig,

    #[serde(default = "default_deploy_agent")]
    pub deploy: AgentEndpointConfig,
}

impl AgentsConfig {
    pub fn endpoint(&self, stage: Stage) -> &AgentEndpointConfig {
        match stage {
            Stage::Story => &self.story,
            Stage::Asset => &self.asset,
            Stage::Code => &self.code,
            Stage::Deploy => &self.deploy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStreamConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Uploader service base URL. Empty selects the in-process uploader.
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardAmounts {
    #[serde(default = "default_story_reward")]
    pub story: i64,
    #[serde(default = "default_asset_reward")]
    pub asset: i64,
    #[serde(default = "default_code_reward")]
    pub code: i64,
    #[serde(default = "default_deploy_reward")]
    pub deploy: i64,
}

impl RewardAmounts {
    pub fn for_stage(&self, stage: Stage) -> i64 {
        match stage {
            Stage::Story => self.story,
            Stage::Asset => self.asset,
            Stage::Code => self.code,
            Stage::Deploy => self.deploy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ledger service URL. When empty the database (or memory) ledger is used.
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub amounts: RewardAmounts,

    #[serde(default = "default_completion_bonus")]
    pub completion_bonus: i64,
}

fn default_database_url() -> String {
    "postgres://localhost/haunted_dev".to_string()
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_true() -> bool {
    true
}

fn agent_endpoint(port: u16, path: &str, timeout_secs: u64) -> AgentEndpointConfig {
    AgentEndpointConfig {
        url: format!("http://localhost:{}/{}", port, path),
        timeout_secs,
    }
}

fn default_story_agent() -> AgentEndpointConfig {
    agent_endpoint(3010, "generate", 30)
}

fn default_asset_agent() -> AgentEndpointConfig {
    agent_endpoint(3011, "generate", 120)
}

fn default_code_agent() -> AgentEndpointConfig {
    agent_endpoint(3012, "generate", 180)
}

fn default_deploy_agent() -> AgentEndpointConfig {
    agent_endpoint(3013, "deploy", 180)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_buffer_size() -> usize {
    100
}

fn default_grace_period() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_storage_timeout() -> u64 {
    60
}

fn default_story_reward() -> i64 {
    10
}

fn default_asset_reward() -> i64 {
    15
}

fn default_code_reward() -> i64 {
    20
}

fn default_deploy_reward() -> i64 {
    25
}

fn default_completion_bonus() -> i64 {
    50
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_min_connections: default_pool_min(),
            pool_max_connections: default_pool_max(),
            pool_acquire_timeout_secs: default_acquire_timeout(),
            pool_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_permissive: true,
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            story: default_story_agent(),
            asset: default_asset_agent(),
            code: default_code_agent(),
            deploy: default_deploy_agent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            grace_period_secs: default_grace_period(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for RewardAmounts {
    fn default() -> Self {
        Self {
            story: default_story_reward(),
            asset: default_asset_reward(),
            code: default_code_reward(),
            deploy: default_deploy_reward(),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            amounts: RewardAmounts::default(),
            completion_bonus: default_completion_bonus(),
        }
    }
}

impl HauntedConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(default_config_paths(), true)
    }

    /// Loads `paths` in order, then the environment. The database section is
    /// only validated when `require_database` is set.
    pub fn load_from_paths(
        paths: Vec<PathBuf>,
        require_database: bool,
    ) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HAUNTED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;

        let mut haunted_config: HauntedConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            haunted_config.database.url = url;
        }

        if let Ok(level) = std::env::var("HAUNTED_LOG_LEVEL") {
            haunted_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            haunted_config.logging.level = level;
        }

        if require_database {
            haunted_config.validate()?;
        } else {
            haunted_config.validate_without_database()?;
        }

        Ok(haunted_config)
    }

    /// Checks everything except the database URL, which only matters when a
    /// database-backed store is selected.
    pub fn validate_without_database(&self) -> Result<(), ConfigLoadError> {
        for stage in Stage::ALL {
            let endpoint = self.agents.endpoint(stage);
            if endpoint.url.is_empty() {
                return Err(ConfigLoadError::MissingRequired(format!(
                    "agents.{}.url",
                    stage
                )));
            }
            if endpoint.timeout_secs == 0 {
                return Err(ConfigLoadError::InvalidValue {
                    key: format!("agents.{}.timeout_secs", stage),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "retry.max_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.retry.multiplier < 1.0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "retry.multiplier".to_string(),
                message: "Must be at least 1.0 so delays never shrink".to_string(),
            });
        }

        if self.log_stream.buffer_size == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "log_stream.buffer_size".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.storage.timeout_secs == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "storage.timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.validate_without_database()?;

        if self.database.url.is_empty() {
            return Err(ConfigLoadError::MissingRequired("database.url".to_string()));
        }

        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.url".to_string(),
                message:
                    "Must be a valid PostgreSQL URL starting with postgres:// or postgresql://"
                        .to_string(),
            });
        }

        if self.database.pool_min_connections > self.database.pool_max_connections {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.pool_min_connections".to_string(),
                message: "Cannot be greater than pool_max_connections".to_string(),
            });
        }

        if self.database.pool_acquire_timeout_secs == 0 {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.pool_acquire_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

/// Config files consulted by [`HauntedConfig::load`], lowest precedence first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("haunted.toml"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    for path in get_dotenv_paths() {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

fn get_dotenv_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(config_dir) = get_config_dir() {
        paths.push(config_dir.join(".env"));
    }

    paths
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("haunted"))
}

pub fn ensure_config_dir() -> Result<PathBuf, std::io::Error> {
    let config_dir = get_config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}
