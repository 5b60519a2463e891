use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::api::remote::RetryPolicy;
use crate::errors::{AppError, Result};

const ENV_PREFIX: &str = "MEDIAGRAB";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub download_path: PathBuf,
    pub max_concurrent_downloads: usize,
    pub request_timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_secs: u64,
    pub health_check_timeout_secs: u64,
    pub file_size_cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,
    pub stale_download_max_age_secs: u64,
    pub stale_sweep_interval_secs: u64,
    pub default_user_id: String,
    pub proxy: Option<String>,
    pub show_notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            download_path: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            max_concurrent_downloads: 3,
            request_timeout_secs: 30,
            retry_count: 3,
            retry_delay_ms: 1000,
            health_check_interval_secs: 30,
            health_check_timeout_secs: 5,
            file_size_cache_ttl_secs: 30 * 60,
            cache_sweep_interval_secs: 5 * 60,
            stale_download_max_age_secs: 60 * 60,
            stale_sweep_interval_secs: 5 * 60,
            default_user_id: "default".to_string(),
            proxy: None,
            show_notifications: true,
        }
    }
}

impl AppConfig {
    /// Loads the config file from the user config dir, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let first_run = !config_path.exists();

        let config = Self::load_from(&config_path)?;
        if first_run {
            config.save_to(&config_path)?;
        }
        Ok(config)
    }

    /// Reads `path` if present, then applies `MEDIAGRAB_*` environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join("mediagrab").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(AppError::Validation("max_concurrent_downloads must be at least 1".to_string()));
        }

        if self.server_url.trim().is_empty() {
            return Err(AppError::Validation("server_url cannot be empty".to_string()));
        }
        url::Url::parse(&self.server_url)
            .map_err(|e| AppError::Validation(format!("Invalid server_url: {}", e)))?;

        let intervals = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("health_check_interval_secs", self.health_check_interval_secs),
            ("health_check_timeout_secs", self.health_check_timeout_secs),
            ("file_size_cache_ttl_secs", self.file_size_cache_ttl_secs),
            ("cache_sweep_interval_secs", self.cache_sweep_interval_secs),
            ("stale_download_max_age_secs", self.stale_download_max_age_secs),
            ("stale_sweep_interval_secs", self.stale_sweep_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Validation(format!("{} must be greater than zero", name)));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retry_count,
            delay: Duration::from_millis(self.retry_delay_ms),
            attempt_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn file_size_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.file_size_cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn stale_download_max_age(&self) -> Duration {
        Duration::from_secs(self.stale_download_max_age_secs)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs)
    }
}
