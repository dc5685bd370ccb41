use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use receipt_printer::{DEFAULT_MAX_WIDTH, RasterSettings, TG2480_PRINTABLE_WIDTH};
use thiserror::Error;

use crate::queue::WorkerConfig;

/// Invalid configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(var: &'static str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Print service configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./data | queue file and log root |
/// | HTTP_HOST | 127.0.0.1 | bind address |
/// | HTTP_PORT | 8101 | bind port |
/// | API_KEY | (empty) | required `X-API-Key` when set |
/// | DEFAULT_PRINTER | (empty) | printer for requests that name none |
/// | LOG_LEVEL | info | trace / debug / info / warn / error |
/// | LOG_DIR | (unset) | daily rolling log files |
/// | RETRY_COUNT | 3 | attempts before a job is failed |
/// | QUEUE_FILE | {WORK_DIR}/queue.json | persisted job table |
/// | PRINTABLE_WIDTH | 608 | printable dots per line |
/// | MAX_IMAGE_WIDTH | 512 | downscale cap |
/// | POLL_INTERVAL_MS | 2000 | idle wait between dispatch cycles |
/// | ERROR_BACKOFF_MS | 5000 | wait after a failed cycle |
/// | SHUTDOWN_TIMEOUT_MS | 5000 | dispatcher stop deadline |
/// | SEND_TIMEOUT_MS | (unset) | per-send deadline |
/// | JOB_RETENTION_HOURS | 0 | prune finished jobs; 0 keeps them |
/// | PRINTERS | (empty) | `name=host:port,...` network printers |
///
/// ```ignore
/// HTTP_PORT=9000 PRINTERS=kitchen=192.168.1.50 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: PathBuf,
    pub http_host: String,
    pub http_port: u16,
    /// Empty disables authentication
    pub api_key: String,
    pub default_printer: Option<String>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub retry_count: u32,
    pub queue_file: PathBuf,
    pub printable_width: u32,
    pub max_image_width: u32,
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub send_timeout_ms: Option<u64>,
    pub job_retention_hours: u64,
    /// Raw `PRINTERS` value, parsed by the network transport
    pub printers: String,
}

impl Config {
    /// Load from the process environment
    ///
    /// Unset variables take their defaults; a malformed number is an error.
    /// Call [`Config::validate`] to reject out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let work_dir = var("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir);
        let queue_file = var("QUEUE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("queue.json"));

        Ok(Self {
            http_host: var("HTTP_HOST").unwrap_or(defaults.http_host),
            http_port: parse("HTTP_PORT", var("HTTP_PORT"))?.unwrap_or(defaults.http_port),
            api_key: var("API_KEY").unwrap_or_default(),
            default_printer: var("DEFAULT_PRINTER"),
            log_level: var("LOG_LEVEL")
                .map(|level| normalize_level(&level))
                .unwrap_or(defaults.log_level),
            log_dir: var("LOG_DIR").map(PathBuf::from),
            retry_count: parse("RETRY_COUNT", var("RETRY_COUNT"))?.unwrap_or(defaults.retry_count),
            queue_file,
            printable_width: parse("PRINTABLE_WIDTH", var("PRINTABLE_WIDTH"))?
                .unwrap_or(defaults.printable_width),
            max_image_width: parse("MAX_IMAGE_WIDTH", var("MAX_IMAGE_WIDTH"))?
                .unwrap_or(defaults.max_image_width),
            poll_interval_ms: parse("POLL_INTERVAL_MS", var("POLL_INTERVAL_MS"))?
                .unwrap_or(defaults.poll_interval_ms),
            error_backoff_ms: parse("ERROR_BACKOFF_MS", var("ERROR_BACKOFF_MS"))?
                .unwrap_or(defaults.error_backoff_ms),
            shutdown_timeout_ms: parse("SHUTDOWN_TIMEOUT_MS", var("SHUTDOWN_TIMEOUT_MS"))?
                .unwrap_or(defaults.shutdown_timeout_ms),
            send_timeout_ms: parse("SEND_TIMEOUT_MS", var("SEND_TIMEOUT_MS"))?,
            job_retention_hours: parse("JOB_RETENTION_HOURS", var("JOB_RETENTION_HOURS"))?
                .unwrap_or(defaults.job_retention_hours),
            printers: var("PRINTERS").unwrap_or_default(),
            work_dir,
        })
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port == 0 {
            return Err(invalid("HTTP_PORT", self.http_port, "must be 1-65535"));
        }
        if self.bind_addr().is_none() {
            return Err(invalid("HTTP_HOST", &self.http_host, "not an IP address"));
        }
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(invalid(
                "LOG_LEVEL",
                &self.log_level,
                "expected trace, debug, info, warn or error",
            ));
        }
        if self.max_image_width == 0 {
            return Err(invalid("MAX_IMAGE_WIDTH", self.max_image_width, "must be positive"));
        }
        if self.printable_width == 0 || self.printable_width > u32::from(u16::MAX) {
            return Err(invalid(
                "PRINTABLE_WIDTH",
                self.printable_width,
                "must be 1-65535",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("POLL_INTERVAL_MS", self.poll_interval_ms, "must be positive"));
        }
        if self.send_timeout_ms == Some(0) {
            return Err(invalid("SEND_TIMEOUT_MS", 0, "must be positive when set"));
        }
        if self.job_retention_hours > 0 && self.retention().is_none() {
            return Err(invalid(
                "JOB_RETENTION_HOURS",
                self.job_retention_hours,
                "too large",
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Option<SocketAddr> {
        let ip = self.http_host.parse().ok()?;
        Some(SocketAddr::new(ip, self.http_port))
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn raster_settings(&self) -> RasterSettings {
        RasterSettings::new(self.printable_width, self.max_image_width)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            raster: self.raster_settings(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
            retention: self.retention(),
        }
    }

    /// Retention window; `None` when disabled or out of range
    fn retention(&self) -> Option<chrono::Duration> {
        if self.job_retention_hours == 0 {
            return None;
        }
        i64::try_from(self.job_retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let work_dir = PathBuf::from("./data");
        Self {
            queue_file: work_dir.join("queue.json"),
            work_dir,
            http_host: "127.0.0.1".to_string(),
            http_port: 8101,
            api_key: String::new(),
            default_printer: None,
            log_level: "info".to_string(),
            log_dir: None,
            retry_count: 3,
            printable_width: TG2480_PRINTABLE_WIDTH,
            max_image_width: DEFAULT_MAX_WIDTH,
            poll_interval_ms: 2000,
            error_backoff_ms: 5000,
            shutdown_timeout_ms: 5000,
            send_timeout_ms: None,
            job_retention_hours: 0,
            printers: String::new(),
        }
    }
}

/// Parse a set variable; a malformed value is rejected
fn parse<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .parse()
            .map_err(|e: T::Err| invalid(key, &value, e.to_string()))
    })
    .transpose()
}

/// Lowercase, with the `WARNING` / `CRITICAL` spellings mapped
fn normalize_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}
