//! Error types for the harvesting pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Fault class of a [`HarvestError`], used to decide whether the run continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or malformed operator input, fatal before any navigation
    Configuration,
    /// No usable session, fatal for the whole run
    Authentication,
    /// Connectivity or server fault, skip the affected unit
    Transport,
    /// Local disk fault, skip the affected file
    Filesystem,
}

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session expired: navigation to {0} ended on the login page")]
    SessionExpired(String),

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Element '{selector}' did not appear on {url} within {seconds}s")]
    ElementMissing {
        selector: String,
        url: String,
        seconds: u64,
    },

    #[error("Malformed document listing at {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No page loaded in session")]
    NoPage,

    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("Invalid URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HarvestError::Config(_) => ErrorClass::Configuration,
            HarvestError::Auth(_) | HarvestError::SessionExpired(_) => ErrorClass::Authentication,
            HarvestError::Filesystem { .. } => ErrorClass::Filesystem,
            _ => ErrorClass::Transport,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Timeout { .. } => true,
            HarvestError::Status { status, .. } => *status == 429 || *status >= 500,
            HarvestError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Configuration | ErrorClass::Authentication
        )
    }

    /// Process exit code for an error that ends the run
    pub fn exit_code(&self) -> u8 {
        match self.class() {
            ErrorClass::Configuration => 1,
            ErrorClass::Authentication => 2,
            _ => 3,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarvestError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
