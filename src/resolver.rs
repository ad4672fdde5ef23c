//! Resolve a report page to the document matching the configured keyword

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RetryPolicy;
use crate::errors::HarvestError;
use crate::models::{DocumentCandidate, Resolution, SkipReason};
use crate::session::{navigate_with_retry, SessionProvider};

/// Element holding the JSON payload of the machine-readable listing
const PAYLOAD_SELECTOR: &str = "pre";

/// Document listing returned by `<report>/document?ajax=1`
#[derive(Debug, Deserialize)]
struct DocumentListing {
    data: Vec<DocumentCandidate>,
}

#[derive(Debug, Clone)]
pub struct DocumentResolver {
    keyword: String,
    wait_timeout: Duration,
    retry: RetryPolicy,
}

impl DocumentResolver {
    pub fn new(keyword: impl Into<String>, wait_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            keyword: keyword.into(),
            wait_timeout,
            retry,
        }
    }

    pub async fn resolve<S>(&self, session: &mut S, report_url: &str) -> Result<Resolution, HarvestError>
    where
        S: SessionProvider + ?Sized,
    {
        navigate_with_retry(session, report_url, &self.retry).await?;

        let current_url = session.current_url().ok_or(HarvestError::NoPage)?;
        let expected = format!("{}/document", current_url.trim_end_matches('/'));
        let document_url = session
            .anchor_hrefs()?
            .into_iter()
            .find(|href| *href == expected);

        let Some(document_url) = document_url else {
            info!("No document section on {}", current_url);
            return Ok(Resolution::Skipped(SkipReason::NoDocumentSection));
        };
        debug!("Document section found: {}", document_url);

        let listing_url = format!("{}?ajax=1", document_url);
        navigate_with_retry(session, &listing_url, &self.retry).await?;
        session.wait_for(PAYLOAD_SELECTOR, self.wait_timeout).await?;

        let payload = session.text_of(PAYLOAD_SELECTOR)?.unwrap_or_default();
        let listing: DocumentListing =
            serde_json::from_str(&payload).map_err(|source| HarvestError::Payload {
                url: listing_url.clone(),
                source,
            })?;

        match select_candidate(listing.data, &self.keyword) {
            Some(candidate) => {
                info!("Selected '{}' for {}", candidate.basename, report_url);
                Ok(Resolution::Found(candidate))
            }
            None => {
                info!("No document containing '{}' on {}", self.keyword, report_url);
                Ok(Resolution::Skipped(SkipReason::KeywordNotFound))
            }
        }
    }
}

/// First candidate whose basename contains `keyword` (case-sensitive)
pub fn select_candidate(
    candidates: impl IntoIterator<Item = DocumentCandidate>,
    keyword: &str,
) -> Option<DocumentCandidate> {
    candidates
        .into_iter()
        .find(|candidate| candidate.basename.contains(keyword))
}
