use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_API_USER_AGENT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// How posts and comments are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    /// Unauthenticated scraping of the public `.json` endpoints
    Public,
    /// Authenticated API access with a bearer token
    Api,
}

/// Retry budget and waits used by the request gateway.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub throttle_cooldown: Duration,
    pub transport_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            throttle_cooldown: Duration::from_secs(30),
            transport_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Inclusive range for randomized polite delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    #[must_use]
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self::from_millis(0, 0)
    }
}

/// Settings for the chunked archive writer.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveConfig {
    /// Flush a chunk once its serialized size reaches this many bytes.
    pub chunk_threshold_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Crawl target
    pub source_name: String,
    pub start_year: i32,
    pub mode: HarvestMode,
    pub page_size: u32,

    // Endpoints and credentials
    pub public_base_url: String,
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub api_user_agent: String,

    // Requests
    pub retry: RetryPolicy,
    pub page_delay: DelayRange,
    pub post_delay: DelayRange,
    pub expand_more: bool,
    pub progress_every: usize,

    // Output
    pub output_dir: PathBuf,
    pub archive: ArchiveConfig,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let source_name = required_env("SUBREDDIT")?
            .trim()
            .trim_start_matches("r/")
            .to_string();
        let start_year = parse_start_year(&required_env("START_YEAR")?)?;
        let mode = parse_harvest_mode(&env_or_default("HARVEST_MODE", "public"))?;

        // Mode-dependent defaults
        let (post_delay_min, post_delay_max, progress_every, expand_default, dir_suffix) =
            match mode {
                HarvestMode::Public => (1500, 3000, 5, false, "_data_noauth"),
                HarvestMode::Api => (500, 1000, 10, true, "_data"),
            };

        let output_dir = optional_env("OUTPUT_DIR").map_or_else(
            || PathBuf::from(format!("./{source_name}{dir_suffix}")),
            PathBuf::from,
        );

        let log_file = match optional_env("LOG_FILE") {
            Some(v) if v.eq_ignore_ascii_case("off") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(output_dir.join(format!("{source_name}.log"))),
        };

        let chunk_mb = parse_env_u64("CHUNK_SIZE_MB", 100)?;

        Ok(Self {
            // Crawl target
            source_name,
            start_year,
            mode,
            page_size: parse_env_u32("PAGE_SIZE", 100)?,

            // Endpoints and credentials
            public_base_url: env_or_default("PUBLIC_BASE_URL", "https://www.reddit.com"),
            api_base_url: env_or_default("API_BASE_URL", "https://oauth.reddit.com"),
            access_token: optional_env("REDDIT_ACCESS_TOKEN"),
            api_user_agent: env_or_default("API_USER_AGENT", DEFAULT_API_USER_AGENT),

            // Requests
            retry: RetryPolicy {
                max_attempts: parse_env_u32("MAX_ATTEMPTS", 3)?,
                throttle_cooldown: Duration::from_secs(parse_env_u64(
                    "THROTTLE_COOLDOWN_SECS",
                    30,
                )?),
                transport_backoff: Duration::from_secs(parse_env_u64(
                    "TRANSPORT_BACKOFF_SECS",
                    5,
                )?),
                request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 10)?),
            },
            page_delay: DelayRange::from_millis(
                parse_env_u64("PAGE_DELAY_MIN_MS", 1000)?,
                parse_env_u64("PAGE_DELAY_MAX_MS", 2000)?,
            ),
            post_delay: DelayRange::from_millis(
                parse_env_u64("POST_DELAY_MIN_MS", post_delay_min)?,
                parse_env_u64("POST_DELAY_MAX_MS", post_delay_max)?,
            ),
            expand_more: parse_env_bool("EXPAND_MORE", expand_default)?,
            progress_every: parse_env_usize("PROGRESS_EVERY", progress_every)?,

            // Output
            output_dir,
            archive: ArchiveConfig {
                chunk_threshold_bytes: chunk_mb.saturating_mul(1024 * 1024),
            },
            log_file,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_source_name(&self.source_name) {
            return Err(invalid(
                "SUBREDDIT",
                "must be 1-21 characters of letters, digits or underscore",
            ));
        }
        if self.mode == HarvestMode::Api && self.access_token.is_none() {
            return Err(invalid(
                "REDDIT_ACCESS_TOKEN",
                "required when HARVEST_MODE=api",
            ));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(invalid("PAGE_SIZE", "must be between 1 and 100"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.page_delay.min > self.page_delay.max {
            return Err(invalid("PAGE_DELAY_MIN_MS", "must not exceed PAGE_DELAY_MAX_MS"));
        }
        if self.post_delay.min > self.post_delay.max {
            return Err(invalid("POST_DELAY_MIN_MS", "must not exceed POST_DELAY_MAX_MS"));
        }
        if self.progress_every == 0 {
            return Err(invalid("PROGRESS_EVERY", "must be at least 1"));
        }
        if self.archive.chunk_threshold_bytes == 0 {
            return Err(invalid("CHUNK_SIZE_MB", "must be at least 1"));
        }
        validate_base_url("PUBLIC_BASE_URL", &self.public_base_url)?;
        validate_base_url("API_BASE_URL", &self.api_base_url)?;
        Ok(())
    }

    /// Configuration with no waits, aimed at a local mock server.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            source_name: "rust".to_string(),
            start_year: 2024,
            mode: HarvestMode::Public,
            page_size: 100,
            public_base_url: "http://127.0.0.1:9".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            access_token: None,
            api_user_agent: DEFAULT_API_USER_AGENT.to_string(),
            retry: RetryPolicy {
                max_attempts: 3,
                throttle_cooldown: Duration::ZERO,
                transport_backoff: Duration::ZERO,
                request_timeout: Duration::from_secs(5),
            },
            page_delay: DelayRange::zero(),
            post_delay: DelayRange::zero(),
            expand_more: false,
            progress_every: 5,
            output_dir: PathBuf::from("./rust_data_test"),
            archive: ArchiveConfig::default(),
            log_file: None,
        }
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Upstream subreddit naming: 1-21 ASCII letters, digits or underscores.
fn is_valid_source_name(name: &str) -> bool {
    (1..=21).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_base_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(name, &e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(invalid(name, "must be an http(s) URL with a host")),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_start_year(value: &str) -> Result<i32, ConfigError> {
    let year: i32 = value
        .trim()
        .parse()
        .map_err(|e| ConfigError::ParseInt {
            name: "START_YEAR".to_string(),
            source: e,
        })?;
    if !(1970..=9999).contains(&year) {
        return Err(invalid("START_YEAR", "must be between 1970 and 9999"));
    }
    Ok(year)
}

fn parse_harvest_mode(value: &str) -> Result<HarvestMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "public" | "noauth" => Ok(HarvestMode::Public),
        "api" | "auth" => Ok(HarvestMode::Api),
        _ => Err(ConfigError::InvalidValue {
            name: "HARVEST_MODE".to_string(),
            message: format!("must be 'public' or 'api', got '{value}'"),
        }),
    }
}
