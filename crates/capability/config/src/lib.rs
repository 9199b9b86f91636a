//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub poll_interval_ms: u64,
    pub collector_max_concurrency: usize,
    pub reading_retention_days: u64,
    pub retention_interval_seconds: u64,
    pub reading_channel_capacity: usize,
    pub alarm_event_capacity: usize,
    pub critical_notifications: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub notify_max_retries: u64,
    pub notify_backoff_ms: u64,
    pub simulator_enabled: bool,
    pub simulator_addr: String,
    pub simulator_tick_ms: u64,
    pub simulator_seed: Option<u64>,
    pub stations_file: Option<String>,
    pub alarm_rules_file: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_interval_ms = read_positive_u64("EMS_POLL_INTERVAL_MS", 5000)?;
        let collector_max_concurrency =
            read_positive_u64("EMS_COLLECTOR_MAX_CONCURRENCY", 4)? as usize;
        let reading_retention_days = read_positive_u64("EMS_READING_RETENTION_DAYS", 30)?;
        let retention_interval_seconds =
            read_positive_u64("EMS_RETENTION_INTERVAL_SECONDS", 86_400)?;
        let reading_channel_capacity =
            read_positive_u64("EMS_READING_CHANNEL_CAPACITY", 256)? as usize;
        let alarm_event_capacity = read_positive_u64("EMS_ALARM_EVENT_CAPACITY", 1024)? as usize;
        let critical_notifications = read_bool_with_default("EMS_CRITICAL_NOTIFICATIONS", true);
        let email_notifications = read_bool_with_default("EMS_EMAIL_NOTIFICATIONS", false);
        let sms_notifications = read_bool_with_default("EMS_SMS_NOTIFICATIONS", false);
        let notify_max_retries = read_u64_with_default("EMS_NOTIFY_MAX_RETRIES", 2)?;
        let notify_backoff_ms = read_u64_with_default("EMS_NOTIFY_BACKOFF_MS", 200)?;
        let simulator_enabled = read_bool_with_default("EMS_SIMULATOR", false);
        let simulator_addr =
            env::var("EMS_SIMULATOR_ADDR").unwrap_or_else(|_| "127.0.0.1:5020".to_string());
        let simulator_tick_ms = read_u64_with_default("EMS_SIMULATOR_TICK_MS", 1000)?;
        let simulator_seed = read_optional_u64("EMS_SIMULATOR_SEED")?;
        let stations_file = read_optional("EMS_STATIONS_FILE");
        let alarm_rules_file = read_optional("EMS_ALARM_RULES_FILE");

        Ok(Self {
            poll_interval_ms,
            collector_max_concurrency,
            reading_retention_days,
            retention_interval_seconds,
            reading_channel_capacity,
            alarm_event_capacity,
            critical_notifications,
            email_notifications,
            sms_notifications,
            notify_max_retries,
            notify_backoff_ms,
            simulator_enabled,
            simulator_addr,
            simulator_tick_ms,
            simulator_seed,
            stations_file,
            alarm_rules_file,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 读取必须大于 0 的 u64（通道容量、并发度、周期等）。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(None),
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
