//! Report link discovery on a period listing page

use regex::Regex;
use tracing::{debug, info};

use crate::config::RetryPolicy;
use crate::errors::HarvestError;
use crate::session::{navigate_with_retry, SessionProvider};

/// Matches `<base>/report/<id>` and nothing longer
#[derive(Debug, Clone)]
pub struct ReportPattern {
    regex: Regex,
}

impl ReportPattern {
    pub fn new(base_url: &str) -> Result<Self, HarvestError> {
        let base = regex::escape(base_url.trim_end_matches('/'));
        let regex = Regex::new(&format!(r"^{}/report/\d+$", base))
            .map_err(|e| HarvestError::Config(format!("invalid report pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, href: &str) -> bool {
        self.regex.is_match(href)
    }
}

/// Open a listing page and collect its report links in page order
pub async fn discover_reports<S>(
    session: &mut S,
    listing_url: &str,
    pattern: &ReportPattern,
    retry: &RetryPolicy,
) -> Result<Vec<String>, HarvestError>
where
    S: SessionProvider + ?Sized,
{
    navigate_with_retry(session, listing_url, retry).await?;

    let hrefs = session.anchor_hrefs()?;
    debug!("Listing {} has {} anchors", listing_url, hrefs.len());

    let mut links: Vec<String> = Vec::new();
    for href in hrefs {
        if pattern.is_match(&href) && !links.contains(&href) {
            links.push(href);
        }
    }

    info!("Found {} report links on {}", links.len(), listing_url);
    Ok(links)
}
