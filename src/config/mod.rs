use crate::domain::entities::positive_seconds;
use crate::error::{AppError, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Environment variable naming an optional YAML or JSON configuration file
pub const CONFIG_FILE_ENV: &str = "QUALITY_JOBS_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfiguration {
    pub scheduler: SchedulerConfig,
    pub predicate: PredicateConfig,
    pub instances: InstanceConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the dispatcher polls the engine for due triggers
    pub tick_interval_ms: u64,
    /// How often remote session states are refreshed
    pub session_sync_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            session_sync_interval_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn session_sync_interval(&self) -> Duration {
        Duration::from_secs(self.session_sync_interval_seconds)
    }
}

/// Polling behaviour of predicate jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredicateConfig {
    pub interval_seconds: u64,
    /// Repeats after the first poll before the data is declared not found
    pub repeat_count: u32,
    pub group: String,
}

impl PredicateConfig {
    /// Polling interval, `None` when zero or out of range
    pub fn interval(&self) -> Option<ChronoDuration> {
        positive_seconds(self.interval_seconds)
    }
}

impl Default for PredicateConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            repeat_count: 12,
            group: "PG".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub max_page_size: usize,
    /// Retention hint stored on each instance
    pub expire_seconds: u64,
}

impl InstanceConfig {
    /// Retention of an instance, `None` when zero or out of range
    pub fn expire_after(&self) -> Option<ChronoDuration> {
        positive_seconds(self.expire_seconds)
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1024,
            expire_seconds: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub mongodb_uri: String,
    pub database_name: String,
    pub job_collection: String,
    pub instance_collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            database_name: "quality".to_string(),
            job_collection: "jobs".to_string(),
            instance_collection: "job_instances".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json", "pretty" or "compact"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Loads, validates and hands out the configuration
pub struct ConfigManager {
    config: Arc<RwLock<AppConfiguration>>,
    config_path: Option<String>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfiguration::default())),
            config_path: None,
        }
    }

    /// Load defaults, then the optional config file, then environment overrides
    pub async fn load(&mut self) -> Result<()> {
        if dotenv::dotenv().is_ok() {
            debug!("Loaded .env file");
        }

        let mut config = AppConfiguration::default();
        if let Ok(config_path) = std::env::var(CONFIG_FILE_ENV) {
            config = Self::load_from_file(&config_path).await?;
            self.config_path = Some(config_path);
        }
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Self::validate_config(&config)?;

        *self.config.write().await = config;
        info!("Configuration loaded successfully");
        Ok(())
    }

    /// Parse a YAML or JSON configuration file
    pub async fn load_from_file(path: &str) -> Result<AppConfiguration> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;

        let config = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&content)?
        } else if path.ends_with(".json") {
            serde_json::from_str(&content)
                .map_err(|e| AppError::ConfigError(format!("Invalid JSON config: {}", e)))?
        } else {
            return Err(AppError::ConfigError(
                "Config file must be .yaml, .yml, or .json".to_string(),
            ));
        };

        debug!(path = path, "Configuration loaded from file");
        Ok(config)
    }

    /// Apply overrides from a variable lookup, normally the process environment
    pub fn apply_env_overrides<F>(config: &mut AppConfiguration, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MONGODB_URI") {
            config.database.mongodb_uri = uri;
        }
        if let Some(db_name) = lookup("MONGODB_DATABASE") {
            config.database.database_name = db_name;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.observability.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.observability.logging.format = format;
        }
        if let Some(interval) = lookup("PREDICATE_INTERVAL_SECONDS") {
            config.predicate.interval_seconds = interval.parse().map_err(|e| {
                AppError::ConfigError(format!("Invalid PREDICATE_INTERVAL_SECONDS: {}", e))
            })?;
        }
        if let Some(count) = lookup("PREDICATE_REPEAT_COUNT") {
            config.predicate.repeat_count = count.parse().map_err(|e| {
                AppError::ConfigError(format!("Invalid PREDICATE_REPEAT_COUNT: {}", e))
            })?;
        }
        if let Some(tick) = lookup("SCHEDULER_TICK_INTERVAL_MS") {
            config.scheduler.tick_interval_ms = tick.parse().map_err(|e| {
                AppError::ConfigError(format!("Invalid SCHEDULER_TICK_INTERVAL_MS: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn validate_config(config: &AppConfiguration) -> Result<()> {
        if config.scheduler.tick_interval_ms == 0 {
            return Err(AppError::ConfigError(
                "Scheduler tick interval must be positive".to_string(),
            ));
        }
        if config.scheduler.session_sync_interval_seconds == 0 {
            return Err(AppError::ConfigError(
                "Session sync interval must be positive".to_string(),
            ));
        }
        if config.predicate.interval().is_none() {
            return Err(AppError::ConfigError(
                "Predicate interval must be positive and within range".to_string(),
            ));
        }
        if config.instances.expire_after().is_none() {
            return Err(AppError::ConfigError(
                "Instance expiry must be positive and within range".to_string(),
            ));
        }
        if config.predicate.group.is_empty() {
            return Err(AppError::ConfigError(
                "Predicate group is required".to_string(),
            ));
        }
        if config.instances.max_page_size == 0 {
            return Err(AppError::ConfigError(
                "Instance page size must be at least 1".to_string(),
            ));
        }
        if config.database.mongodb_uri.is_empty() {
            return Err(AppError::ConfigError("MongoDB URI is required".to_string()));
        }

        match config.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(AppError::ConfigError("Invalid log level".to_string())),
        }
        match config.observability.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(AppError::ConfigError("Invalid log format".to_string())),
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    pub async fn get(&self) -> AppConfiguration {
        self.config.read().await.clone()
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }
}
