use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "portal-harvest")]
#[command(about = "Harvest periodic report documents from the reporting portal into a branch/year/month folder tree")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and download every matching document in the range
    Run {
        #[command(flatten)]
        range: RangeArgs,

        /// Output directory (overrides HARVEST_DOWNLOAD_DIR)
        #[arg(short, long)]
        output: Option<String>,

        /// Number of concurrent downloads (overrides DOWNLOAD_CONCURRENCY)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Print the planned branch/period units and their listing URLs
    Plan {
        #[command(flatten)]
        range: RangeArgs,
    },
}

/// Values that override the environment for a single invocation
#[derive(Args, Debug, Default)]
pub struct RangeArgs {
    /// Document keyword (overrides DOCUMENT)
    #[arg(short, long)]
    pub document: Option<String>,

    /// First year of the range (overrides START_YEAR)
    #[arg(long)]
    pub start_year: Option<i32>,

    /// First month of the range (overrides START_MONTH)
    #[arg(long)]
    pub start_month: Option<u32>,

    /// Last year of the range (overrides END_YEAR)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Last month of the range (overrides END_MONTH)
    #[arg(long)]
    pub end_month: Option<u32>,

    /// Branch catalog JSON file (overrides HARVEST_CATALOG)
    #[arg(long)]
    pub catalog: Option<String>,
}

impl RangeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(document) = &self.document {
            config.document = document.clone();
        }
        if let Some(year) = self.start_year {
            config.range.start_year = year;
        }
        if let Some(month) = self.start_month {
            config.range.start_month = month;
        }
        if let Some(year) = self.end_year {
            config.range.end_year = year;
        }
        if let Some(month) = self.end_month {
            config.range.end_month = month;
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_file = catalog.into();
        }
    }
}
