//! Authenticated browsing session and the cookie snapshot it produces
//!
//! The pipeline only talks to a [`SessionProvider`]. It is a single-owner
//! resource: navigation replaces the current page, so callers hold it by
//! `&mut` and never share it between tasks. Downloads use the immutable
//! [`SessionContext`] instead.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::RetryPolicy;
use crate::errors::HarvestError;

pub mod http;
pub mod memory;

pub use http::HttpSession;
pub use memory::MemorySession;

/// Rendered-page capability used by discovery and resolution
#[async_trait]
pub trait SessionProvider: Send {
    /// Load `url`, replacing the current page
    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;

    /// Page produced by the last successful navigation
    fn page(&self) -> Option<&RenderedPage>;

    /// Wait until `selector` matches something on the current page
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), HarvestError>;

    /// Authentication cookies held by the session
    fn cookies(&self) -> Vec<CookieRecord>;

    fn current_url(&self) -> Option<String> {
        self.page().map(|page| page.url.to_string())
    }

    /// Absolute hrefs of every anchor on the current page
    fn anchor_hrefs(&self) -> Result<Vec<String>, HarvestError> {
        self.page()
            .ok_or(HarvestError::NoPage)?
            .anchor_hrefs()
    }

    /// Text content of the first element matching `selector`
    fn text_of(&self, selector: &str) -> Result<Option<String>, HarvestError> {
        self.page().ok_or(HarvestError::NoPage)?.text_of(selector)
    }
}

/// Snapshot of a loaded page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: Url,
    /// HTML markup of the page
    pub body: String,
}

impl RenderedPage {
    pub fn html(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Non-HTML responses are shown the way a browser does, inside a `<pre>`
    pub fn text_payload(url: Url, text: &str) -> Self {
        let body = format!(
            "<html><head></head><body><pre>{}</pre></body></html>",
            escape_html(text)
        );
        Self { url, body }
    }

    pub fn anchor_hrefs(&self) -> Result<Vec<String>, HarvestError> {
        let selector = parse_selector("a[href]")?;
        let document = Html::parse_document(&self.body);
        let hrefs = document
            .select(&selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match self.url.join(href.trim()) {
                Ok(resolved) => Some(resolved.to_string()),
                Err(e) => {
                    debug!("Ignoring unresolvable href '{}': {}", href, e);
                    None
                }
            })
            .collect();
        Ok(hrefs)
    }

    pub fn text_of(&self, selector: &str) -> Result<Option<String>, HarvestError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        let text = document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>());
        Ok(text)
    }

    pub fn contains(&self, selector: &str) -> Result<bool, HarvestError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        let found = document.select(&selector).next().is_some();
        Ok(found)
    }

    pub fn is_login_page(&self) -> bool {
        is_login_url(&self.url)
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, HarvestError> {
    Selector::parse(selector).map_err(|_| HarvestError::Selector(selector.to_string()))
}

pub(crate) fn parse_url(url: &str) -> Result<Url, HarvestError> {
    Url::parse(url).map_err(|source| HarvestError::Url {
        url: url.to_string(),
        source,
    })
}

/// The portal's login form lives at `<base>/login`
pub fn is_login_url(url: &Url) -> bool {
    url.path().trim_end_matches('/').ends_with("/login")
}

/// A navigation that lands on the login page although something else was asked for
pub(crate) fn check_not_logged_out(requested: &str, page: &RenderedPage) -> Result<(), HarvestError> {
    let requested_login = parse_url(requested)
        .map(|url| is_login_url(&url))
        .unwrap_or(false);
    if page.is_login_page() && !requested_login {
        return Err(HarvestError::SessionExpired(requested.to_string()));
    }
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Navigate, retrying transient transport failures with linear backoff
pub async fn navigate_with_retry<S>(
    session: &mut S,
    url: &str,
    policy: &RetryPolicy,
) -> Result<(), HarvestError>
where
    S: SessionProvider + ?Sized,
{
    let mut attempt = 1;
    loop {
        match session.navigate(url).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "Navigation to {} failed (attempt {}/{}): {}",
                    url, attempt, policy.max_attempts, e
                );
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// One cookie as persisted in the snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Attributes written by other tools are kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CookieRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Parse a `Cookie:` style header (`a=1; b=2`) into records
pub fn parse_cookie_header(header: &str, domain: Option<&str>) -> Vec<CookieRecord> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name.is_empty() {
                return None;
            }
            let mut record = CookieRecord::new(name, value);
            record.domain = domain.map(str::to_string);
            Some(record)
        })
        .collect()
}

/// Immutable authentication state shared by download workers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    cookies: Vec<CookieRecord>,
}

impl SessionContext {
    pub fn new(cookies: Vec<CookieRecord>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[CookieRecord] {
        &self.cookies
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn save(&self, path: &Path) -> Result<(), HarvestError> {
        let json = serde_json::to_string_pretty(&self.cookies)
            .map_err(|e| HarvestError::filesystem(path, std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::filesystem(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| HarvestError::filesystem(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| HarvestError::filesystem(path, e))?;
        let cookies = serde_json::from_str(&content).map_err(|e| {
            HarvestError::filesystem(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        Ok(Self { cookies })
    }
}
