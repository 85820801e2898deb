use crate::errors::{MonitorError, Result};
use crate::market_data::symbols::SymbolStyle;
use crate::screening::annual_line::DEFAULT_WINDOW;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub indices: Vec<IndexConfig>,
    #[serde(default)]
    pub names: HashMap<String, String>,
    pub data: DataConfig,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub mode: String, // "once" or "watch"
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_label() -> String {
    "annual line screen".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Used when the constituents source fails or comes back empty
    #[serde(default)]
    pub fallback: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    pub source: String, // "http" or "csv"
    #[serde(default)]
    pub constituents_source: ConstituentsSourceKind,
    /// URL template with `{index}`
    #[serde(default)]
    pub constituents_url: Option<String>,
    /// Directory holding `{index}.csv` constituent files
    #[serde(default)]
    pub constituents_dir: Option<String>,
    /// URL template with `{symbol}`, `{start}` and `{end}`
    #[serde(default)]
    pub history_url: Option<String>,
    /// Directory holding `{code}.csv` price files
    #[serde(default)]
    pub csv_dir: Option<String>,
    #[serde(default)]
    pub symbol_style: SymbolStyle,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_history_days")]
    pub history_days: i64,
}

fn default_history_days() -> i64 {
    400
}

/// About a century of calendar days
const MAX_HISTORY_DAYS: i64 = 36_500;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstituentsSourceKind {
    #[default]
    Static,
    Http,
    Csv,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreeningConfig {
    pub window: usize,
    pub lower_band: Decimal,
    pub upper_band: Decimal,
    #[serde(default)]
    pub upper_inclusive: bool,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            lower_band: Decimal::new(-5, 2),
            upper_band: Decimal::ZERO,
            upper_inclusive: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub max_symbols: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_interval_ms: 500,
            request_timeout_secs: 30,
            max_symbols: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    pub retention_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "cache".to_string(),
            retention_days: 7,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub alert_log: String,
    #[serde(default)]
    pub csv_report: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            alert_log: "alerts.jsonl".to_string(),
            csv_report: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub run_at: String,
    pub weekdays_only: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: "15:30".to_string(),
            weekdays_only: true,
        }
    }
}

impl ScheduleConfig {
    pub fn run_at_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M").map_err(|e| {
            MonitorError::ConfigError(format!("Invalid schedule.run_at '{}': {}", self.run_at, e))
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
    pub notify_on_match: bool,
    pub notify_on_error: bool,
    pub notify_when_empty: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            notify_on_match: true,
            notify_on_error: true,
            notify_when_empty: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MonitorError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.general.mode.as_str(), "once" | "watch") {
            return Err(MonitorError::ConfigError(
                "Invalid mode. Must be 'once' or 'watch'".to_string(),
            ));
        }

        if self.indices.is_empty() {
            return Err(MonitorError::ConfigError(
                "At least one [[indices]] entry is required".to_string(),
            ));
        }

        if self.screening.window == 0 {
            return Err(MonitorError::ConfigError(
                "screening.window must be greater than zero".to_string(),
            ));
        }

        if self.screening.lower_band > self.screening.upper_band {
            return Err(MonitorError::ConfigError(
                "screening.lower_band must not exceed screening.upper_band".to_string(),
            ));
        }

        if self.fetch.max_workers == 0 {
            return Err(MonitorError::ConfigError(
                "fetch.max_workers must be greater than zero".to_string(),
            ));
        }

        if self.data.history_days <= 0 || self.data.history_days > MAX_HISTORY_DAYS {
            return Err(MonitorError::ConfigError(format!(
                "data.history_days must be between 1 and {}",
                MAX_HISTORY_DAYS
            )));
        }

        if self.cache.retention_days < 0 {
            return Err(MonitorError::ConfigError(
                "cache.retention_days must not be negative".to_string(),
            ));
        }

        match self.data.source.as_str() {
            "http" if self.data.history_url.is_none() => {
                return Err(MonitorError::ConfigError(
                    "data.history_url is required for the http source".to_string(),
                ));
            }
            "csv" if self.data.csv_dir.is_none() => {
                return Err(MonitorError::ConfigError(
                    "data.csv_dir is required for the csv source".to_string(),
                ));
            }
            "http" | "csv" => {}
            other => {
                return Err(MonitorError::ConfigError(format!(
                    "Unknown data source: {}",
                    other
                )));
            }
        }

        match self.data.constituents_source {
            ConstituentsSourceKind::Http if self.data.constituents_url.is_none() => {
                return Err(MonitorError::ConfigError(
                    "data.constituents_url is required for http constituents".to_string(),
                ));
            }
            ConstituentsSourceKind::Csv if self.data.constituents_dir.is_none() => {
                return Err(MonitorError::ConfigError(
                    "data.constituents_dir is required for csv constituents".to_string(),
                ));
            }
            _ => {}
        }

        self.schedule.run_at_time()?;

        Ok(())
    }

    /// Expand environment variables in configuration
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(token) = self.data.api_token.take() {
            self.data.api_token = Some(expand_required(&token)?);
        }

        // A missing relay is not fatal; alerts still reach the log
        self.notifications.webhook_url = self
            .notifications
            .webhook_url
            .take()
            .and_then(|url| expand_optional(&url));
        self.notifications.webhook_token = self
            .notifications
            .webhook_token
            .take()
            .and_then(|token| expand_optional(&token));

        Ok(())
    }
}

fn placeholder(value: &str) -> Option<&str> {
    if value.starts_with("${") && value.ends_with('}') {
        Some(&value[2..value.len() - 1])
    } else {
        None
    }
}

fn expand_required(value: &str) -> Result<String> {
    match placeholder(value) {
        Some(var_name) => std::env::var(var_name).map_err(|_| {
            MonitorError::ConfigError(format!("Environment variable {} not set", var_name))
        }),
        None => Ok(value.to_string()),
    }
}

fn expand_optional(value: &str) -> Option<String> {
    match placeholder(value) {
        Some(var_name) => std::env::var(var_name).ok(),
        None => Some(value.to_string()),
    }
}
