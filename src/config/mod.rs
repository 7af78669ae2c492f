//! Configuration management for pocrunner
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatch and liveness configuration
    pub scan: ScanConfig,

    /// HTTP client configuration
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scan-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Pacing rate for check execution (operations per second)
    pub rate_limit: u32,

    /// Dispatch pool width; defaults to `rate_limit`
    pub concurrency: Option<usize>,

    /// Liveness sweeper pool width
    pub fingerprint_concurrency: usize,

    /// Failures after which an alive target is re-probed
    pub max_host_error: u32,

    /// Sleep between liveness sweep passes in seconds
    pub sweep_interval_secs: u64,

    /// Skip the liveness pass that runs before dispatch
    pub no_finger: bool,

    /// Run only the liveness pass, no dispatch
    pub only_finger: bool,

    /// Let the HTTP executor skip targets classified dead
    pub skip_dead_targets: bool,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Optional proxy URL for all requests
    pub proxy: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rate_limit: 150,
            concurrency: None,
            fingerprint_concurrency: 20,
            max_host_error: 3,
            sweep_interval_secs: 10,
            no_finger: false,
            only_finger: false,
            skip_dead_targets: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            user_agent: format!("pocrunner/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::with_source(format!("Failed to read config file: {}", path.display()), e)
        })?;

        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay `POCRUNNER_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("POCRUNNER_RATE_LIMIT") {
            self.scan.rate_limit = v;
        }
        if let Some(v) = env_parse("POCRUNNER_CONCURRENCY") {
            self.scan.concurrency = Some(v);
        }
        if let Some(v) = env_parse("POCRUNNER_FINGERPRINT_CONCURRENCY") {
            self.scan.fingerprint_concurrency = v;
        }
        if let Some(v) = env_parse("POCRUNNER_MAX_HOST_ERROR") {
            self.scan.max_host_error = v;
        }
        if let Some(v) = env_parse("POCRUNNER_SWEEP_INTERVAL") {
            self.scan.sweep_interval_secs = v;
        }
        if let Some(v) = env_flag("POCRUNNER_NO_FINGER") {
            self.scan.no_finger = v;
        }
        if let Some(v) = env_flag("POCRUNNER_ONLY_FINGER") {
            self.scan.only_finger = v;
        }
        if let Some(v) = env_parse("POCRUNNER_REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("POCRUNNER_USER_AGENT") {
            self.http.user_agent = v;
        }
        if let Ok(v) = std::env::var("POCRUNNER_PROXY") {
            self.http.proxy = Some(v);
        }
        if let Ok(v) = std::env::var("POCRUNNER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("POCRUNNER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.rate_limit == 0 {
            return Err(Error::config("rate_limit must be greater than 0"));
        }

        if self.scan.concurrency == Some(0) {
            return Err(Error::config("concurrency must be greater than 0"));
        }

        if self.scan.fingerprint_concurrency == 0 {
            return Err(Error::config(
                "fingerprint_concurrency must be greater than 0",
            ));
        }

        if self.scan.max_host_error == 0 {
            return Err(Error::config("max_host_error must be greater than 0"));
        }

        if self.scan.no_finger && self.scan.only_finger {
            return Err(Error::config(
                "no_finger and only_finger cannot both be set",
            ));
        }

        if self.http.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }

        if let Some(proxy) = &self.http.proxy {
            url::Url::parse(proxy)
                .map_err(|e| Error::config(format!("invalid proxy URL '{proxy}': {e}")))?;
        }

        Ok(())
    }

    /// Dispatch pool width
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.scan
            .concurrency
            .unwrap_or(self.scan.rate_limit as usize)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    /// Get the inter-pass sweep delay as Duration
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.scan.sweep_interval_secs)
    }

    /// Build the shared HTTP client used by the prober and the executor
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.http.user_agent)
            .timeout(self.request_timeout())
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .gzip(true);

        if let Some(proxy) = &self.http.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(builder.build()?)
    }
}
