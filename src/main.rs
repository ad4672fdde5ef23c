use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use portal_harvest::catalog::Catalog;
use portal_harvest::cli::{Cli, Commands};
use portal_harvest::config::Config;
use portal_harvest::downloader::{DownloadExecutor, HttpFetcher};
use portal_harvest::harvest::Harvester;
use portal_harvest::layout::{ensure_dir, OutputLayout};
use portal_harvest::planner::TraversalPlan;
use portal_harvest::session::{HttpSession, SessionContext, SessionProvider};
use portal_harvest::HarvestError;

#[tokio::main]
async fn main() -> ExitCode {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "portal_harvest=info");
    }

    // Initialize logging to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "portal-harvest.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), HarvestError> {
    let mut config = Config::from_env()?;

    match &cli.command {
        Commands::Plan { range } => {
            range.apply(&mut config);
            config.validate_range()?;
            let plan = build_plan(&config)?;

            let mut count = 0;
            for unit in plan.units() {
                println!(
                    "{} {} - {}",
                    unit.branch.name.to_uppercase(),
                    unit.period,
                    unit.listing_url
                );
                count += 1;
            }
            println!("{} units planned", count);
        }

        Commands::Run {
            range,
            output,
            concurrency,
        } => {
            range.apply(&mut config);
            if let Some(output) = output {
                config.download_dir = output.into();
            }
            if let Some(concurrency) = concurrency {
                config.download_concurrency = (*concurrency).max(1);
            }
            config.validate()?;
            let plan = build_plan(&config)?;

            let mut session = HttpSession::new(&config)?;
            session.login(&config.credentials).await?;

            let context = SessionContext::new(session.cookies());
            context.save(&config.cookie_file)?;
            info!(
                "Saved {} cookies to {}",
                context.cookies().len(),
                config.cookie_file.display()
            );

            let fetcher = Arc::new(HttpFetcher::new(&config)?);
            let executor = DownloadExecutor::new(fetcher, Arc::new(context), config.retry.clone());
            let layout = OutputLayout::new(&config.download_dir, &config.document, Utc::now());
            ensure_dir(layout.run_root()).await?;

            let harvester = Harvester::new(&config, executor, layout)?;
            let summary = harvester.run(&mut session, &plan).await?;

            info!(
                "DOCUMENT {} finished: {} downloaded, {} skipped, {} failed",
                config.document.to_uppercase(),
                summary.downloaded(),
                summary.skipped(),
                summary.failed()
            );
            println!(
                "DOCUMENT {} downloaded to {}",
                config.document.to_uppercase(),
                harvester.layout().run_root().display()
            );
        }
    }

    Ok(())
}

fn build_plan(config: &Config) -> Result<TraversalPlan, HarvestError> {
    let catalog = Catalog::load(&config.catalog_file)
        .map_err(|e| HarvestError::Config(format!("{:#}", e)))?;
    let years = catalog.years_for(&config.range);

    Ok(TraversalPlan::new(
        config.base_url.clone(),
        catalog.branches,
        years,
        config.range,
    ))
}
