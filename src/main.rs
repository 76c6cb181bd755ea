use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use race_scraper::apis::blog_page::BlogPageSource;
use race_scraper::common::constants::SCRAPE_URL_ENV;
use race_scraper::config::{ApiCredentials, PipelineConfig};
use race_scraper::infra::http_client::{ReqwestHttp, ReqwestSyncTransport};
use race_scraper::logging;
use race_scraper::pipeline::sync::{ChunkStatus, SyncClient};
use race_scraper::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "race_scraper")]
#[command(about = "Scrape running events and sync them to the internal API")]
#[command(version)]
#[command(after_help = "Environment Variables:
    API_URL              URL of the internal sync endpoint
    API_KEY              API key for authentication
    SCRAPE_URL           Page to scrape when --url is not given
    RACE_SCRAPER_CONFIG  Path of the TOML config (default: config.toml)")]
struct Cli {
    /// Page to scrape (overrides SCRAPE_URL)
    #[arg(long)]
    url: Option<String>,

    /// Output directory for the JSON/CSV exports and the quality report
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Skip API sync even if credentials are configured
    #[arg(long)]
    no_api: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Path of the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.verbose);

    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                error!("Scraping failed: {:#}", e);
                println!("\n❌ Scraping failed: {:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!("\nScraping interrupted by user");
            ExitCode::from(130)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = PipelineConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    let Some(url) = cli
        .url
        .clone()
        .or_else(|| std::env::var(SCRAPE_URL_ENV).ok())
        .filter(|u| !u.trim().is_empty())
    else {
        println!("\n❌ Error: {} environment variable is not set.", SCRAPE_URL_ENV);
        println!("   Set it in .env file or use --url argument.");
        return Ok(ExitCode::FAILURE);
    };

    println!("\n📡 Fetching events from: {}", url);
    let source = BlogPageSource::new(Arc::new(ReqwestHttp::new()?));
    let fragments = source
        .fetch_fragments(&url)
        .await
        .context("failed to fetch the race calendar")?;

    println!("🔍 Extracting event data...");
    let pipeline = Pipeline::from_config(&config)?;
    let processed = pipeline.process(&fragments);

    if processed.is_empty() {
        warn!("No events were extracted! Check the HTML structure.");
        println!("\n⚠ No events were extracted. Check the logs for details.");
        return Ok(ExitCode::FAILURE);
    }

    let paths = pipeline
        .export(&processed, &cli.output)
        .with_context(|| format!("failed to write exports to {}", cli.output.display()))?;

    println!("\n✓ Scraping completed");
    println!("Total events extracted: {}", processed.events().len());
    if !processed.skipped.is_empty() {
        println!("Fragments skipped: {}", processed.skipped.len());
    }
    println!(
        "Data saved to {} and {}",
        paths.json.display(),
        paths.csv.display()
    );
    println!("Quality report saved to {}", paths.report.display());
    println!("\n{}", processed.validated.report());

    if cli.no_api {
        println!("API sync skipped (--no-api flag)");
        return Ok(ExitCode::SUCCESS);
    }
    let Some(credentials) = ApiCredentials::from_env() else {
        info!("API_URL or API_KEY not set, skipping API sync");
        println!("API sync skipped (API_URL and API_KEY not set)");
        return Ok(ExitCode::SUCCESS);
    };

    println!("Syncing to API...");
    let transport =
        ReqwestSyncTransport::new(&credentials.api_url, &credentials.api_key, &config.sync)?;
    let client = SyncClient::new(Arc::new(transport), &config.sync)?;
    let report = pipeline.sync(&processed, &client).await;

    let (inserted, updated) = report
        .chunks
        .iter()
        .filter_map(|c| match &c.status {
            ChunkStatus::Delivered(Some(summary)) => Some((summary.inserted, summary.updated)),
            _ => None,
        })
        .fold((0, 0), |(i, u), (ci, cu)| (i + ci, u + cu));

    if report.is_success() {
        println!(
            "✓ Successfully synced {} events to API",
            report.delivered_records()
        );
        println!("  - Inserted: {}", inserted);
        println!("  - Updated: {}", updated);
        Ok(ExitCode::SUCCESS)
    } else {
        for chunk in report.failed_chunks() {
            if let Some(err) = chunk.error() {
                println!(
                    "❌ Chunk {} ({} events) failed after {} attempts: {}",
                    chunk.index, chunk.records, chunk.attempts, err
                );
            }
        }
        println!(
            "Synced {} of {} events. Data was saved locally.",
            report.delivered_records(),
            processed.validated.sync_payload().len()
        );
        Ok(ExitCode::FAILURE)
    }
}
