use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Organizational unit whose reports are harvested independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: u32,
    pub name: String,
}

/// One reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Inclusive (year, month) bounds requested by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start_year: i32,
    pub start_month: u32,
    pub end_year: i32,
    pub end_month: u32,
}

impl DateRange {
    pub fn new(start_year: i32, start_month: u32, end_year: i32, end_month: u32) -> Self {
        Self {
            start_year,
            start_month,
            end_year,
            end_month,
        }
    }

    pub fn start(&self) -> Period {
        Period::new(self.start_year, self.start_month)
    }

    pub fn end(&self) -> Period {
        Period::new(self.end_year, self.end_month)
    }

    pub fn contains(&self, period: Period) -> bool {
        self.start() <= period && period <= self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.start() > self.end()
    }
}

/// One (branch, period) cell of the traversal space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub branch: Branch,
    pub period: Period,
    pub listing_url: String,
}

/// Entry of a report's document listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCandidate {
    pub basename: String,
    pub url: String,
}

/// Where a resolved document ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub folder: PathBuf,
    pub suggested_name: String,
}

impl DownloadTarget {
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.suggested_name)
    }
}

/// Why a report produced nothing to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NoDocumentSection,
    KeywordNotFound,
}

impl SkipReason {
    pub fn as_str(&self) -> &str {
        match self {
            SkipReason::NoDocumentSection => "no document section",
            SkipReason::KeywordNotFound => "keyword not found",
        }
    }
}

/// Result of resolving one report; transport faults travel as `Err` instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(DocumentCandidate),
    Skipped(SkipReason),
}
