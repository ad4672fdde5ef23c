//! Centralized configuration management for portal-harvest

use crate::errors::HarvestError;
use crate::models::DateRange;
use std::path::PathBuf;
use std::time::Duration;

/// Widest START_YEAR..END_YEAR span accepted
pub const MAX_RANGE_YEARS: i32 = 50;

/// Application configuration, built once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Portal root, without trailing slash
    pub base_url: String,
    /// Login credentials
    pub credentials: Credentials,
    /// Keyword used for the output folder name and candidate filtering
    pub document: String,
    /// Requested traversal range
    pub range: DateRange,
    /// Directory for downloaded documents
    pub download_dir: PathBuf,
    /// Cookie snapshot written after login
    pub cookie_file: PathBuf,
    /// Branch/year catalog
    pub catalog_file: PathBuf,
    /// HTTP client configuration
    pub http: HttpConfig,
    /// Retry policy for transport failures
    pub retry: RetryPolicy,
    /// Number of concurrent download workers
    pub download_concurrency: usize,
    /// Consecutive "no document section" skips before warning about session expiry
    pub expiry_suspect_threshold: usize,
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Navigation and fetch timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

/// Bounded retry for transient transport failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            user_agent: "portal-harvest/0.1.0".to_string(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms * attempt as u64)
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, HarvestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                HarvestError::Config("BASE_URL is not defined in environment variables".into())
            })?;

        let credentials = Credentials {
            username: lookup("USERNAME").unwrap_or_default(),
            password: lookup("PASSWORD").unwrap_or_default(),
        };

        let range = DateRange::new(
            parse_var(&lookup, "START_YEAR")?.unwrap_or(0),
            parse_var(&lookup, "START_MONTH")?.unwrap_or(0),
            parse_var(&lookup, "END_YEAR")?.unwrap_or(0),
            parse_var(&lookup, "END_MONTH")?.unwrap_or(0),
        );

        let http = HttpConfig {
            timeout_seconds: parse_var(&lookup, "HARVEST_TIMEOUT_SECONDS")?.unwrap_or(60),
            user_agent: lookup("HARVEST_USER_AGENT")
                .unwrap_or_else(|| "portal-harvest/0.1.0".to_string()),
        };

        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "RETRY_ATTEMPTS")?.unwrap_or(3u32).max(1),
            backoff_ms: parse_var(&lookup, "RETRY_BACKOFF_MS")?.unwrap_or(1000),
        };

        Ok(Config {
            base_url,
            credentials,
            document: lookup("DOCUMENT").unwrap_or_default(),
            range,
            download_dir: lookup("HARVEST_DOWNLOAD_DIR")
                .unwrap_or_else(|| "./downloads".to_string())
                .into(),
            cookie_file: lookup("HARVEST_COOKIE_FILE")
                .unwrap_or_else(|| "./cookies.json".to_string())
                .into(),
            catalog_file: lookup("HARVEST_CATALOG")
                .unwrap_or_else(|| "./branches.json".to_string())
                .into(),
            http,
            retry,
            download_concurrency: parse_var(&lookup, "DOWNLOAD_CONCURRENCY")?
                .unwrap_or(4usize)
                .max(1),
            expiry_suspect_threshold: parse_var(&lookup, "EXPIRY_SUSPECT_THRESHOLD")?
                .unwrap_or(10),
        })
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Check the inputs a full run needs beyond BASE_URL
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.document.trim().is_empty() {
            return Err(HarvestError::Config("DOCUMENT keyword is not set".into()));
        }
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(HarvestError::Config(
                "USERNAME and PASSWORD must both be set".into(),
            ));
        }
        self.validate_range()
    }

    /// Range bounds must be present; an inverted range is allowed and yields no work
    pub fn validate_range(&self) -> Result<(), HarvestError> {
        let r = &self.range;
        if r.start_year == 0 || r.end_year == 0 {
            return Err(HarvestError::Config(
                "START_YEAR and END_YEAR must be set".into(),
            ));
        }
        if r.end_year - r.start_year > MAX_RANGE_YEARS {
            return Err(HarvestError::Config(format!(
                "START_YEAR {} to END_YEAR {} spans more than {} years",
                r.start_year, r.end_year, MAX_RANGE_YEARS
            )));
        }
        for (name, month) in [("START_MONTH", r.start_month), ("END_MONTH", r.end_month)] {
            if !(1..=12).contains(&month) {
                return Err(HarvestError::Config(format!(
                    "{} must be between 1 and 12, got {}",
                    name, month
                )));
            }
        }
        Ok(())
    }
}

/// Helper function to parse a variable as a specific type
fn parse_var<F, T>(lookup: &F, var_name: &str) -> Result<Option<T>, HarvestError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var_name) {
        Some(val) => val.trim().parse().map(Some).map_err(|e| {
            HarvestError::Config(format!(
                "Failed to parse environment variable {} = '{}': {}",
                var_name, val, e
            ))
        }),
        None => Ok(None),
    }
}
