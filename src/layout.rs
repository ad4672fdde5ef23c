//! Output directory layout
//!
//! `<root>/DOCUMENT-<KEYWORD>-<timestamp>/<BRANCH>/TAHUN<year>/PERIODE<month>`

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::errors::HarvestError;
use crate::models::{Branch, Period};

#[derive(Debug, Clone)]
pub struct OutputLayout {
    run_root: PathBuf,
}

impl OutputLayout {
    /// Layout for one run started at `started`
    pub fn new(download_dir: &Path, keyword: &str, started: DateTime<Utc>) -> Self {
        let run_root = download_dir.join(format!(
            "DOCUMENT-{}-{}",
            keyword.to_uppercase(),
            run_timestamp(started)
        ));
        Self { run_root }
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn period_folder(&self, branch: &Branch, period: Period) -> PathBuf {
        self.run_root
            .join(branch.name.to_uppercase())
            .join(format!("TAHUN{}", period.year))
            .join(format!("PERIODE{}", period.month))
    }
}

/// UTC timestamp used in the run folder name, e.g. `20240115_103045`
pub fn run_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Create `path` and every missing parent; a no-op when it already exists
pub async fn ensure_dir(path: &Path) -> Result<(), HarvestError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| HarvestError::filesystem(path, e))
}
