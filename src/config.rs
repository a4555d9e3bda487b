use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub meter: MeterConfig,
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// IP or host[:port] of the P1 meter (API v1).
    pub host: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    5
}

impl MeterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite://p1.db".into()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    8000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Per-viewer queue length before the oldest message is evicted. Rounded up
    /// to the next power of two.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_subscriber_capacity() -> usize {
    200
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Windows longer than this are served minute-aggregated.
    #[serde(default = "default_aggregate_after_hours")]
    pub aggregate_after_hours: u32,
    #[serde(default = "default_max_hours")]
    pub max_hours: u32,
    #[serde(default = "default_hours")]
    pub default_hours: u32,
    #[serde(default = "default_export_hours")]
    pub export_default_hours: u32,
}

fn default_aggregate_after_hours() -> u32 {
    6
}

fn default_max_hours() -> u32 {
    24 * 31
}

fn default_hours() -> u32 {
    1
}

fn default_export_hours() -> u32 {
    24
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            aggregate_after_hours: default_aggregate_after_hours(),
            max_hours: default_max_hours(),
            default_hours: default_hours(),
            export_default_hours: default_export_hours(),
        }
    }
}

/// Installation limits a dashboard draws as threshold lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_phase_limit_a")]
    pub phase_limit_a: f64,
    #[serde(default = "default_volt_low")]
    pub volt_low: f64,
    #[serde(default = "default_volt_high")]
    pub volt_high: f64,
    #[serde(default = "default_volt_nominal")]
    pub volt_nominal: f64,
}

fn default_phase_limit_a() -> f64 {
    16.0
}

fn default_volt_low() -> f64 {
    207.0
}

fn default_volt_high() -> f64 {
    253.0
}

fn default_volt_nominal() -> f64 {
    230.0
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            phase_limit_a: default_phase_limit_a(),
            volt_low: default_volt_low(),
            volt_high: default_volt_high(),
            volt_nominal: default_volt_nominal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards `DATABASE_URL` and `METER_HOST` override their YAML values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_yaml(&raw)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        if let Ok(host) = std::env::var("METER_HOST") {
            cfg.meter.host = host;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML document after placeholder expansion, without env overrides.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let cfg: Self = serde_yaml::from_str(&expanded)?;
        Ok(cfg)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.meter.host.trim().is_empty() {
            return Err(AppError::Config("meter.host cannot be empty".into()));
        }
        if self.meter.poll_interval_secs == 0 {
            return Err(AppError::Config(
                "meter.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.meter.timeout_secs == 0 {
            return Err(AppError::Config(
                "meter.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api.port == 0 {
            return Err(AppError::Config("api.port cannot be 0".into()));
        }
        if self.live.subscriber_capacity == 0 {
            return Err(AppError::Config(
                "live.subscriber_capacity must be greater than 0".into(),
            ));
        }
        if self.query.max_hours == 0 {
            return Err(AppError::Config("query.max_hours cannot be 0".into()));
        }
        if self.query.aggregate_after_hours > self.query.max_hours {
            return Err(AppError::Config(
                "query.aggregate_after_hours cannot exceed query.max_hours".into(),
            ));
        }
        if self.limits.volt_low >= self.limits.volt_high {
            return Err(AppError::Config(
                "limits.volt_low must be below limits.volt_high".into(),
            ));
        }
        Ok(())
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
fn expand_env_placeholders(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let close = match it.peek().copied() {
            Some('$') => {
                // "$$" -> "$"
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };
        it.next();
        let var = read_until(&mut it, close).ok_or_else(|| {
            AppError::Config(format!("unterminated env placeholder: missing '{}'", close))
        })?;
        let val = std::env::var(&var)
            .map_err(|_| AppError::Config(format!("missing environment variable: {}", var)))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Read characters until we hit `end`, returning the collected string.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
