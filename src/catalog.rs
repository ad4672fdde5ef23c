//! Branch and year enumeration loaded from a JSON catalog file

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::models::{Branch, DateRange};

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub branches: Vec<Branch>,
    /// Calendar years the portal knows about; defaults to the requested range
    #[serde(default)]
    pub years: Option<Vec<i32>>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read branch catalog: {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&content)
            .with_context(|| format!("Invalid branch catalog: {}", path.display()))?;

        if catalog.branches.is_empty() {
            anyhow::bail!("Branch catalog {} lists no branches", path.display());
        }
        Ok(catalog)
    }

    pub fn years_for(&self, range: &DateRange) -> Vec<i32> {
        match &self.years {
            Some(years) => years.clone(),
            None => (range.start_year..=range.end_year).collect(),
        }
    }
}
