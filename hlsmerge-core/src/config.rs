use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default poll interval for a stream (1 second, first tick immediate).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub fetch: FetchConfig,
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Transport limits applied to every origin request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout; also bounds how long one cycle can stall.
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            connect_timeout_ms: 2000,
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// One aggregated stream and its redundant origins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// Master playlist addresses, polled every cycle.
    pub origins: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, origins: Vec<String>) -> Self {
        Self {
            name: name.into(),
            origins,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // HLSMERGE_SERVER__PORT, HLSMERGE_FETCH__TIMEOUT_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("HLSMERGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.fetch.timeout_ms == 0 {
            errors.push("fetch.timeout_ms must be greater than 0".to_string());
        }
        if self.fetch.connect_timeout_ms == 0 {
            errors.push("fetch.connect_timeout_ms must be greater than 0".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        if self.streams.is_empty() {
            errors.push("at least one stream must be configured".to_string());
        }

        let mut names = HashSet::new();
        for stream in &self.streams {
            if stream.name.trim().is_empty() {
                errors.push("stream name must not be empty".to_string());
            } else if stream.name.contains('/') {
                errors.push(format!("stream name \"{}\" must not contain '/'", stream.name));
            } else if !names.insert(stream.name.as_str()) {
                errors.push(format!("duplicate stream name \"{}\"", stream.name));
            }

            if stream.poll_interval_ms == 0 {
                errors.push(format!(
                    "stream \"{}\": poll_interval_ms must be greater than 0",
                    stream.name
                ));
            }
            if stream.origins.is_empty() {
                errors.push(format!("stream \"{}\": at least one origin is required", stream.name));
            }
            for origin in &stream.origins {
                match url::Url::parse(origin) {
                    Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                    Ok(url) => errors.push(format!(
                        "stream \"{}\": unsupported origin scheme \"{}\" in {origin}",
                        stream.name,
                        url.scheme()
                    )),
                    Err(e) => errors.push(format!(
                        "stream \"{}\": invalid origin {origin}: {e}",
                        stream.name
                    )),
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
