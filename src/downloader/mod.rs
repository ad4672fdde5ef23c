//! Document download executor
//!
//! Downloads only need a URL and the cookie snapshot, so they can run in a
//! bounded pool without touching the browsing session.

use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::errors::HarvestError;
use crate::layout::ensure_dir;
use crate::models::{DocumentCandidate, DownloadTarget};
use crate::session::SessionContext;

pub mod fetch;

pub use fetch::{FetchedResource, Fetcher, HttpFetcher};

/// Used when the server does not name the file
pub const DEFAULT_FILENAME: &str = "default.pdf";

/// One resolved document and the folder it belongs in
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub candidate: DocumentCandidate,
    pub folder: PathBuf,
}

#[derive(Clone)]
pub struct DownloadExecutor {
    fetcher: Arc<dyn Fetcher>,
    context: Arc<SessionContext>,
    retry: RetryPolicy,
}

impl DownloadExecutor {
    pub fn new(fetcher: Arc<dyn Fetcher>, context: Arc<SessionContext>, retry: RetryPolicy) -> Self {
        Self {
            fetcher,
            context,
            retry,
        }
    }

    /// Fetch `url` and write it into `folder` under the server-supplied name
    pub async fn download(&self, url: &str, folder: &Path) -> Result<DownloadTarget, HarvestError> {
        let resource = self.fetch_with_retry(url).await?;

        let target = DownloadTarget {
            folder: folder.to_path_buf(),
            suggested_name: filename_from_headers(&resource.headers),
        };

        ensure_dir(&target.folder).await?;
        let path = target.path();
        tokio::fs::write(&path, &resource.body)
            .await
            .map_err(|e| HarvestError::filesystem(&path, e))?;

        info!("File downloaded to: {}", path.display());
        Ok(target)
    }

    /// Run `jobs` with at most `concurrency` in flight; each job reports its own result
    pub async fn download_all(
        &self,
        jobs: Vec<DownloadJob>,
        concurrency: usize,
    ) -> Vec<(DownloadJob, Result<DownloadTarget, HarvestError>)> {
        stream::iter(jobs)
            .map(|job| async move {
                let result = self.download(&job.candidate.url, &job.folder).await;
                if let Err(e) = &result {
                    warn!("✗ Failed to download {}: {}", job.candidate.basename, e);
                }
                (job, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<FetchedResource, HarvestError> {
        let cookie_header = self.context.cookie_header();
        let mut attempt = 1;

        loop {
            let outcome = match self.fetcher.fetch(url, &cookie_header).await {
                Ok(resource) if resource.is_success() => return Ok(resource),
                Ok(resource) => Err(HarvestError::Status {
                    status: resource.status,
                    url: url.to_string(),
                }),
                Err(e) => Err(e),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "Download of {} failed (attempt {}/{}): {}",
                        url, attempt, self.retry.max_attempts, e
                    );
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
                Ok(resource) => return Ok(resource),
            }
        }
    }
}

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"filename="([^"]+)""#).expect("static regex"))
}

/// Name from `Content-Disposition: ...; filename="..."`, else [`DEFAULT_FILENAME`]
pub fn filename_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

fn filename_from_disposition(disposition: &str) -> Option<String> {
    let captured = filename_pattern().captures(disposition)?.get(1)?.as_str();
    // Never let the server pick a path outside the target folder
    let name = Path::new(captured).file_name()?.to_str()?.trim();
    if name.is_empty() || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::HeaderValue;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned responses per URL, in order; the last one repeats
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<HashMap<String, Vec<Result<FetchedResource, u16>>>>,
        seen_cookies: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn respond(self, url: &str, response: Result<FetchedResource, u16>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(response);
            self
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, cookie_header: &str) -> Result<FetchedResource, HarvestError> {
            self.seen_cookies.lock().unwrap().push(cookie_header.to_string());
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.get_mut(url).expect("unexpected url");
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            next.map_err(|_| HarvestError::Timeout {
                url: url.to_string(),
                seconds: 0,
            })
        }
    }

    fn pdf(disposition: Option<&str>) -> FetchedResource {
        let mut headers = HeaderMap::new();
        if let Some(value) = disposition {
            headers.insert(CONTENT_DISPOSITION, HeaderValue::from_str(value).unwrap());
        }
        FetchedResource {
            status: 200,
            headers,
            body: b"%PDF-1.4".to_vec(),
        }
    }

    fn status(code: u16) -> FetchedResource {
        FetchedResource {
            status: code,
            ..Default::default()
        }
    }

    fn executor(fetcher: Arc<ScriptedFetcher>) -> DownloadExecutor {
        let context = SessionContext::new(vec![crate::session::CookieRecord::new("sid", "abc")]);
        DownloadExecutor::new(
            fetcher,
            Arc::new(context),
            RetryPolicy {
                max_attempts: 3,
                backoff_ms: 0,
            },
        )
    }

    fn job(url: &str, folder: &Path) -> DownloadJob {
        DownloadJob {
            candidate: DocumentCandidate {
                basename: url.rsplit('/').next().unwrap().to_string(),
                url: url.to_string(),
            },
            folder: folder.to_path_buf(),
        }
    }

    #[test]
    fn test_filename_recovery() {
        let mut headers = HeaderMap::new();
        assert_eq!(filename_from_headers(&headers), "default.pdf");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="report-03.pdf""#),
        );
        assert_eq!(filename_from_headers(&headers), "report-03.pdf");

        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment; filename=bare.pdf"));
        assert_eq!(filename_from_headers(&headers), "default.pdf");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(r#"attachment; filename="../../etc/passwd""#),
        );
        assert_eq!(filename_from_headers(&headers), "passwd");
    }

    #[tokio::test]
    async fn test_download_writes_recovered_and_default_names() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("HQ").join("TAHUN2024").join("PERIODE1");
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(
                    "https://portal.test/files/1",
                    Ok(pdf(Some(r#"attachment; filename="report-03.pdf""#))),
                )
                .respond("https://portal.test/files/2", Ok(pdf(None))),
        );
        let executor = executor(Arc::clone(&fetcher));

        let named = executor.download("https://portal.test/files/1", &folder).await.unwrap();
        assert_eq!(named.path(), folder.join("report-03.pdf"));
        assert_eq!(std::fs::read(folder.join("report-03.pdf")).unwrap(), b"%PDF-1.4");

        let fallback = executor.download("https://portal.test/files/2", &folder).await.unwrap();
        assert_eq!(fallback.suggested_name, "default.pdf");
        assert!(folder.join("default.pdf").exists());

        assert!(fetcher.seen_cookies.lock().unwrap().iter().all(|c| c == "sid=abc"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default().respond("https://portal.test/files/9", Ok(status(404))),
        );

        let err = executor(fetcher)
            .download("https://portal.test/files/9", temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://portal.test/files/5";
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond(url, Err(0))
                .respond(url, Ok(status(503)))
                .respond(url, Ok(pdf(None))),
        );

        let target = executor(Arc::clone(&fetcher)).download(url, temp_dir.path()).await.unwrap();
        assert_eq!(target.suggested_name, "default.pdf");
        assert_eq!(fetcher.seen_cookies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_others() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .respond("https://portal.test/files/bad", Err(0))
                .respond(
                    "https://portal.test/files/good",
                    Ok(pdf(Some(r#"attachment; filename="good.pdf""#))),
                ),
        );
        let executor = executor(fetcher);

        let jobs = vec![
            job("https://portal.test/files/bad", temp_dir.path()),
            job("https://portal.test/files/good", temp_dir.path()),
        ];
        let results = executor.download_all(jobs, 2).await;

        assert_eq!(results.len(), 2);
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failed, 1);
        assert!(temp_dir.path().join("good.pdf").exists());
    }
}
