//! Offline session serving pages from memory
//!
//! Useful for replaying captured portal pages and for exercising the pipeline
//! without a network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::{check_not_logged_out, parse_url, CookieRecord, RenderedPage, SessionProvider};
use crate::errors::HarvestError;

/// Page as registered; its URL is parsed when it is served
#[derive(Debug, Clone)]
struct StoredPage {
    url: String,
    body: String,
    payload: bool,
}

impl StoredPage {
    fn render(&self) -> Result<RenderedPage, HarvestError> {
        let url = parse_url(&self.url)?;
        Ok(if self.payload {
            RenderedPage::text_payload(url, &self.body)
        } else {
            RenderedPage::html(url, self.body.as_str())
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    pages: HashMap<String, StoredPage>,
    failures: HashMap<String, u32>,
    cookies: Vec<CookieRecord>,
    visits: Vec<String>,
    current: Option<RenderedPage>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` as HTML when `url` is requested
    pub fn with_html(self, url: &str, body: &str) -> Self {
        self.with_page(url, body, false)
    }

    /// Serve `body` as a raw (JSON) payload when `url` is requested
    pub fn with_payload(self, url: &str, body: &str) -> Self {
        self.with_page(url, body, true)
    }

    fn with_page(mut self, url: &str, body: &str, payload: bool) -> Self {
        let page = StoredPage {
            url: url.to_string(),
            body: body.to_string(),
            payload,
        };
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Requesting `from` lands on the page registered for `to`
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        let page = self.pages.get(to).cloned().unwrap_or_else(|| StoredPage {
            url: to.to_string(),
            body: String::new(),
            payload: false,
        });
        self.pages.insert(from.to_string(), page);
        self
    }

    /// The next `count` navigations to `url` time out
    pub fn with_timeouts(mut self, url: &str, count: u32) -> Self {
        self.failures.insert(url.to_string(), count);
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(CookieRecord::new(name, value));
        self
    }

    /// Every URL navigated to, in order
    pub fn visits(&self) -> &[String] {
        &self.visits
    }
}

#[async_trait]
impl SessionProvider for MemorySession {
    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        self.visits.push(url.to_string());

        if let Some(remaining) = self.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HarvestError::Timeout {
                    url: url.to_string(),
                    seconds: 0,
                });
            }
        }

        let page = self
            .pages
            .get(url)
            .ok_or_else(|| HarvestError::Status {
                status: 404,
                url: url.to_string(),
            })?
            .render()?;
        check_not_logged_out(url, &page)?;
        self.current = Some(page);
        Ok(())
    }

    fn page(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), HarvestError> {
        let page = self.current.as_ref().ok_or(HarvestError::NoPage)?;
        if page.contains(selector)? {
            Ok(())
        } else {
            Err(HarvestError::ElementMissing {
                selector: selector.to_string(),
                url: page.url.to_string(),
                seconds: timeout.as_secs(),
            })
        }
    }

    fn cookies(&self) -> Vec<CookieRecord> {
        self.cookies.clone()
    }
}
