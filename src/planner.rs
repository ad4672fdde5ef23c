//! Traversal planning over branches × years × months
//!
//! The plan is a pure value: iterating it performs no I/O and can be restarted
//! from scratch at any time.

use crate::models::{Branch, DateRange, Period, PlannedUnit};

/// Calendar months in enumeration order
pub const MONTHS: [u32; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

#[derive(Debug, Clone)]
pub struct TraversalPlan {
    base_url: String,
    branches: Vec<Branch>,
    years: Vec<i32>,
    range: DateRange,
}

impl TraversalPlan {
    pub fn new(
        base_url: impl Into<String>,
        branches: Vec<Branch>,
        years: Vec<i32>,
        range: DateRange,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            branches,
            years,
            range,
        }
    }

    /// Periods of the configured calendar that fall inside the range
    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        let range = self.range;
        self.years.iter().flat_map(move |&year| {
            MONTHS
                .iter()
                .map(move |&month| Period::new(year, month))
                .filter(move |period| range.contains(*period))
        })
    }

    /// Branch-major, then year, then month
    pub fn units(&self) -> impl Iterator<Item = PlannedUnit> + '_ {
        self.branches.iter().flat_map(move |branch| {
            self.periods().map(move |period| PlannedUnit {
                branch: branch.clone(),
                period,
                listing_url: listing_url(&self.base_url, branch, period),
            })
        })
    }
}

/// Report listing page for one branch and period
pub fn listing_url(base_url: &str, branch: &Branch, period: Period) -> String {
    format!(
        "{}/report?year={}&month_id={}&branch_id={}&sort=week_id&direction=asc",
        base_url, period.year, period.month, branch.id
    )
}
