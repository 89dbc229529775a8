//! Service configuration.
//!
//! Settings come from built-in defaults, then an optional YAML file, then
//! environment variables (highest precedence).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connector::{ExponentialBackoff, FixedDelay};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// RabbitMQ connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: String,
    pub user: String,
    pub password: String,
}

/// Periodic weather sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub city: String,
    pub interval: Duration,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub elasticsearch_url: String,
    pub openweather_api_key: Option<String>,
    /// Connect to RabbitMQ/Elasticsearch and start the timer at startup.
    pub enable_dependencies: bool,
    pub bind: String,
    pub schedule: ScheduleSettings,
    pub broker_retry: FixedDelay,
    pub search_retry: ExponentialBackoff,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                host: "rabbitmq".to_string(),
                user: "guest".to_string(),
                password: "guest".to_string(),
            },
            elasticsearch_url: "http://elasticsearch:9200".to_string(),
            openweather_api_key: None,
            enable_dependencies: true,
            bind: "0.0.0.0:8000".to_string(),
            schedule: ScheduleSettings {
                city: "London".to_string(),
                interval: Duration::from_secs(2 * 60),
            },
            broker_retry: FixedDelay::default(),
            search_retry: ExponentialBackoff::default(),
            data_dir: PathBuf::from("data"),
            static_dir: PathBuf::from("pages"),
        }
    }
}

// ── YAML overrides ───────────────────────────────────────────────────────

/// Optional YAML overrides. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub schedule: Option<ScheduleFile>,
    #[serde(default)]
    pub broker_retry: Option<FixedRetryFile>,
    #[serde(default)]
    pub search_retry: Option<ExponentialRetryFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleFile {
    pub city: Option<String>,
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedRetryFile {
    pub max_retries: Option<u32>,
    pub delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExponentialRetryFile {
    pub max_retries: Option<u32>,
    pub initial_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
}

impl FileConfig {
    /// Load overrides from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse overrides from a YAML string
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// ── Loading ──────────────────────────────────────────────────────────────

impl Settings {
    /// Defaults, overridden by `config_file` (if given), then by the process
    /// environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let file = match config_file {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Defaults overridden by the process environment only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Build settings from file overrides and an environment lookup.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();
        settings.apply_file(file)?;
        settings.apply_env(env)?;
        Ok(settings)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(schedule) = file.schedule {
            if let Some(city) = schedule.city {
                self.schedule.city = city;
            }
            if let Some(minutes) = schedule.interval_minutes {
                self.schedule.interval = interval_from_minutes("schedule.interval_minutes", minutes)?;
            }
        }
        if let Some(retry) = file.broker_retry {
            if let Some(n) = retry.max_retries {
                self.broker_retry.max_retries = n;
            }
            if let Some(secs) = retry.delay_secs {
                self.broker_retry.delay = Duration::from_secs(secs);
            }
        }
        if let Some(retry) = file.search_retry {
            if let Some(n) = retry.max_retries {
                self.search_retry.max_retries = n;
            }
            if let Some(secs) = retry.initial_delay_secs {
                self.search_retry.initial_delay = Duration::from_secs(secs);
            }
            if let Some(secs) = retry.max_delay_secs {
                self.search_retry.max_delay = Duration::from_secs(secs);
            }
        }
        if self.search_retry.max_delay < self.search_retry.initial_delay {
            return Err(ConfigError::InvalidValue {
                key: "search_retry.max_delay_secs".to_string(),
                value: self.search_retry.max_delay.as_secs().to_string(),
                reason: "must not be smaller than initial_delay_secs",
            });
        }
        Ok(())
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = env("RABBITMQ_HOST") {
            self.broker.host = host;
        }
        if let Some(user) = env("RABBITMQ_DEFAULT_USER") {
            self.broker.user = user;
        }
        if let Some(password) = env("RABBITMQ_DEFAULT_PASS") {
            self.broker.password = password;
        }
        if let Some(url) = env("ELASTICSEARCH_URL") {
            self.elasticsearch_url = url;
        }
        self.openweather_api_key = env("OPENWEATHER_API_KEY").filter(|k| !k.is_empty());
        if let Some(flag) = env("ENABLE_DEPENDENCIES") {
            self.enable_dependencies = flag.to_lowercase() == "true";
        }
        if let Some(bind) = env("WEATHERLOOP_BIND") {
            self.bind = bind;
        }
        if let Some(city) = env("WEATHERLOOP_SCHEDULE_CITY") {
            self.schedule.city = city;
        }
        if let Some(raw) = env("WEATHERLOOP_SCHEDULE_MINUTES") {
            let minutes = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "WEATHERLOOP_SCHEDULE_MINUTES".to_string(),
                value: raw.clone(),
                reason: "expected a whole number of minutes",
            })?;
            self.schedule.interval = interval_from_minutes("WEATHERLOOP_SCHEDULE_MINUTES", minutes)?;
        }
        if let Some(dir) = env("WEATHERLOOP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("WEATHERLOOP_STATIC_DIR") {
            self.static_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

fn interval_from_minutes(key: &str, minutes: u64) -> Result<Duration> {
    if minutes == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: minutes.to_string(),
            reason: "interval must be at least one minute",
        });
    }
    Ok(Duration::from_secs(minutes.saturating_mul(60)))
}
