use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::DeliveryMethod;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_dispatch_interval_secs() -> u64 {
    30
}

fn default_batch_limit() -> usize {
    100
}

fn default_max_retries() -> i64 {
    3
}

fn default_bar_history() -> usize {
    200
}

fn default_market_base_url() -> String {
    "http://127.0.0.1:8900".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_send_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub senders: SendersConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    /// Daily bars fetched per instrument for volume and indicator triggers.
    #[serde(default = "default_bar_history")]
    pub bar_history: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval_secs(),
            bar_history: default_bar_history(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_dispatch_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on queue entries processed per tick.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Stamped onto each queue entry at enqueue time.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_dispatch_interval_secs(),
            batch_limit: default_batch_limit(),
            max_retries: default_max_retries(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Routing for email/sms/push transports. Each is an HTTP gateway endpoint;
/// a method without a gateway URL falls back to the terminal sender.
/// Webhook deliveries always go to the entry's own recipient URL.
#[derive(Debug, Default, Deserialize)]
pub struct SendersConfig {
    pub email_gateway_url: Option<String>,
    pub sms_gateway_url: Option<String>,
    pub push_gateway_url: Option<String>,
}

impl SendersConfig {
    pub fn gateway_url(&self, method: DeliveryMethod) -> Option<&str> {
        match method {
            DeliveryMethod::Email => self.email_gateway_url.as_deref(),
            DeliveryMethod::Sms => self.sms_gateway_url.as_deref(),
            DeliveryMethod::Push => self.push_gateway_url.as_deref(),
            DeliveryMethod::Webhook => None,
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.scanner.interval_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "scanner.interval_secs must be > 0".into(),
        }));
    }
    if config.dispatcher.interval_secs == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "dispatcher.interval_secs must be > 0".into(),
        }));
    }
    if config.dispatcher.batch_limit == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "dispatcher.batch_limit must be > 0".into(),
        }));
    }
    if config.dispatcher.max_retries < 1 {
        return Err(Report::new(ConfigError::Validation {
            field: "dispatcher.max_retries must be >= 1".into(),
        }));
    }
    if config.market_data.requests_per_second == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "market_data.requests_per_second must be > 0".into(),
        }));
    }
    for (method, url) in [
        (DeliveryMethod::Email, &config.senders.email_gateway_url),
        (DeliveryMethod::Sms, &config.senders.sms_gateway_url),
        (DeliveryMethod::Push, &config.senders.push_gateway_url),
    ] {
        if let Some(url) = url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(Report::new(ConfigError::Validation {
                field: format!("senders.{method}_gateway_url must be an http(s) URL"),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"

[scanner]
interval_secs = 30
bar_history = 100

[dispatcher]
interval_secs = 15
batch_limit = 50
max_retries = 5
send_timeout_secs = 20

[market_data]
base_url = "https://market.example.com"
request_timeout_secs = 5
requests_per_second = 10

[senders]
email_gateway_url = "https://mail.example.com/send"
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.scanner.interval_secs, 30);
        assert_eq!(config.dispatcher.batch_limit, 50);
        assert_eq!(config.dispatcher.max_retries, 5);
        assert_eq!(config.market_data.requests_per_second, 10);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let toml = r#"
[general]
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.scanner.interval_secs, 60);
        assert_eq!(config.scanner.bar_history, 200);
        assert_eq!(config.dispatcher.interval_secs, 30);
        assert_eq!(config.dispatcher.batch_limit, 100);
        assert_eq!(config.dispatcher.max_retries, 3);
        assert_eq!(config.market_data.request_timeout_secs, 10);
        assert!(config.senders.email_gateway_url.is_none());
    }

    #[test]
    fn zero_scan_interval_rejected() {
        let toml = r#"
[general]

[scanner]
interval_secs = 0
"#;
        let config = parse(toml);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_batch_limit_rejected() {
        let toml = r#"
[general]

[dispatcher]
batch_limit = 0
"#;
        let config = parse(toml);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn non_http_gateway_url_rejected() {
        let toml = r#"
[general]

[senders]
sms_gateway_url = "smpp://gateway.example.com"
"#;
        let config = parse(toml);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn gateway_url_lookup_per_method() {
        let toml = r#"
[general]

[senders]
email_gateway_url = "https://mail.example.com/send"
"#;
        let config = parse(toml);
        assert!(config.senders.gateway_url(DeliveryMethod::Email).is_some());
        assert!(config.senders.gateway_url(DeliveryMethod::Sms).is_none());
        assert!(config.senders.gateway_url(DeliveryMethod::Webhook).is_none());
    }
}
