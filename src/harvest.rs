//! Harvest orchestration: plan → discover → resolve → download

use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{discover_reports, ReportPattern};
use crate::downloader::{DownloadExecutor, DownloadJob};
use crate::errors::HarvestError;
use crate::layout::OutputLayout;
use crate::models::{Period, PlannedUnit, Resolution, SkipReason};
use crate::planner::TraversalPlan;
use crate::resolver::DocumentResolver;
use crate::session::SessionProvider;

/// Outcome counts for one (branch, period)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSummary {
    pub branch: String,
    pub period: Period,
    pub reports: usize,
    pub downloaded: usize,
    pub skipped_no_document: usize,
    pub skipped_no_keyword: usize,
    pub failed: usize,
}

impl PeriodSummary {
    fn new(unit: &PlannedUnit) -> Self {
        Self {
            branch: unit.branch.name.to_uppercase(),
            period: unit.period,
            reports: 0,
            downloaded: 0,
            skipped_no_document: 0,
            skipped_no_keyword: 0,
            failed: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_no_document + self.skipped_no_keyword
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NoDocumentSection => self.skipped_no_document += 1,
            SkipReason::KeywordNotFound => self.skipped_no_keyword += 1,
        }
    }
}

impl fmt::Display for PeriodSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} reports, {} downloaded, {} skipped ({} without document section, {} without keyword), {} failed",
            self.branch,
            self.period,
            self.reports,
            self.downloaded,
            self.skipped(),
            self.skipped_no_document,
            self.skipped_no_keyword,
            self.failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub periods: Vec<PeriodSummary>,
}

impl RunSummary {
    pub fn downloaded(&self) -> usize {
        self.periods.iter().map(|p| p.downloaded).sum()
    }

    pub fn skipped(&self) -> usize {
        self.periods.iter().map(|p| p.skipped()).sum()
    }

    pub fn failed(&self) -> usize {
        self.periods.iter().map(|p| p.failed).sum()
    }
}

pub struct Harvester {
    pattern: ReportPattern,
    resolver: DocumentResolver,
    executor: DownloadExecutor,
    layout: OutputLayout,
    config: HarvestSettings,
}

/// The slice of [`Config`] the orchestration loop reads
#[derive(Debug, Clone)]
struct HarvestSettings {
    retry: crate::config::RetryPolicy,
    download_concurrency: usize,
    expiry_suspect_threshold: usize,
}

impl Harvester {
    pub fn new(
        config: &Config,
        executor: DownloadExecutor,
        layout: OutputLayout,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            pattern: ReportPattern::new(&config.base_url)?,
            resolver: DocumentResolver::new(
                config.document.clone(),
                config.http_timeout(),
                config.retry.clone(),
            ),
            executor,
            layout,
            config: HarvestSettings {
                retry: config.retry.clone(),
                download_concurrency: config.download_concurrency,
                expiry_suspect_threshold: config.expiry_suspect_threshold,
            },
        })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Visit every planned unit; only configuration or authentication faults stop the run
    pub async fn run<S>(&self, session: &mut S, plan: &TraversalPlan) -> Result<RunSummary, HarvestError>
    where
        S: SessionProvider + ?Sized,
    {
        let mut summary = RunSummary::default();
        let mut absence_streak = 0;

        for unit in plan.units() {
            info!(
                "Processing {} (branch {}) period {}",
                unit.branch.name.to_uppercase(),
                unit.branch.id,
                unit.period
            );
            let period = self.harvest_unit(session, &unit, &mut absence_streak).await?;
            info!("{}", period);
            summary.periods.push(period);
        }

        if summary.periods.is_empty() {
            warn!("The requested range does not cover any configured period");
        }
        Ok(summary)
    }

    async fn harvest_unit<S>(
        &self,
        session: &mut S,
        unit: &PlannedUnit,
        absence_streak: &mut usize,
    ) -> Result<PeriodSummary, HarvestError>
    where
        S: SessionProvider + ?Sized,
    {
        let mut summary = PeriodSummary::new(unit);

        let links = match discover_reports(session, &unit.listing_url, &self.pattern, &self.config.retry).await {
            Ok(links) => links,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("✗ Failed to load listing {}: {}", unit.listing_url, e);
                summary.failed += 1;
                return Ok(summary);
            }
        };
        summary.reports = links.len();

        let folder = self.layout.period_folder(&unit.branch, unit.period);
        let mut jobs = Vec::new();

        for link in &links {
            match self.resolver.resolve(session, link).await {
                Ok(Resolution::Found(candidate)) => {
                    *absence_streak = 0;
                    jobs.push(DownloadJob {
                        candidate,
                        folder: folder.clone(),
                    });
                }
                Ok(Resolution::Skipped(reason)) => {
                    debug!("Skipped {}: {}", link, reason.as_str());
                    summary.record_skip(reason);
                    if reason == SkipReason::NoDocumentSection {
                        *absence_streak += 1;
                        self.check_absence_streak(*absence_streak);
                    } else {
                        *absence_streak = 0;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("✗ Failed to resolve {}: {}", link, e);
                    summary.failed += 1;
                }
            }
        }

        for (_, result) in self
            .executor
            .download_all(jobs, self.config.download_concurrency)
            .await
        {
            match result {
                Ok(_) => summary.downloaded += 1,
                Err(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }

    fn check_absence_streak(&self, streak: usize) {
        let threshold = self.config.expiry_suspect_threshold;
        if threshold > 0 && streak == threshold {
            warn!(
                "{} consecutive reports had no document section; the session may have expired",
                streak
            );
        }
    }
}
