//! Shelf Scout command line
//!
//! ```text
//! shelf-scout discover [--target N]
//! shelf-scout run [--start N] [--max N] [--threshold F] [--workers N] [--resume] [--dry-run] [--sink sqlite|files]
//! shelf-scout social [--max N] [--threshold F]
//! shelf-scout ledger [--failed] [--social]
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shelf_scout::application::{
    BatchOrchestrator, CrawlState, DiscoveryCrawler, EnrichmentGenerator, RunParameters, SocialPublisher, StopReason,
};
use shelf_scout::domain::{PageFetcher, ProductExtractor, ProductSink};
use shelf_scout::infrastructure::{
    AppConfig, CandidateStore, ConfigManager, DatabaseConnection, DetailPageExtractor, FileBundleSink, HttpClient,
    LedgerStore, ListingParser, MemorySink, OllamaClient, SocialBundleWriter, SqliteProductSink,
    init_logging_with_config,
};

#[derive(Parser)]
#[command(name = "shelf-scout", version, about = "Crawl bestseller listings, rank products and enrich the best ones")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl every listing source and write the ranked candidate list
    Discover {
        /// Stop after this many unique products
        #[arg(long)]
        target: Option<usize>,
    },
    /// Scrape, enrich and store candidates from the ranked list
    Run(RunArgs),
    /// Build social media bundles for the top candidates
    Social {
        #[arg(long)]
        max: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Show progress ledger counts
    Ledger {
        /// List failed ids with their errors
        #[arg(long)]
        failed: bool,
        /// Read the social publisher's ledger instead
        #[arg(long)]
        social: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Position in the ranked list to start scanning from
    #[arg(long)]
    start: Option<usize>,
    /// Maximum number of candidates to process
    #[arg(long)]
    max: Option<usize>,
    /// Minimum priority score
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    workers: Option<usize>,
    /// Start from the ledger's last index
    #[arg(long)]
    resume: bool,
    /// Keep results in memory and leave the ledger file untouched
    #[arg(long)]
    dry_run: bool,
    #[arg(long, value_enum, default_value_t = SinkKind::Sqlite)]
    sink: SinkKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkKind {
    Sqlite,
    Files,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.load_config().await?;
    init_logging_with_config(&config.logging)?;
    info!("Config: {}", manager.config_path().display());

    let started = Instant::now();
    match cli.command {
        Command::Discover { target } => discover(&config, target).await?,
        Command::Run(args) => run_batch(&config, args).await?,
        Command::Social { max, threshold } => social(&config, max, threshold).await?,
        Command::Ledger { failed, social } => show_ledger(&config, failed, social).await?,
    }
    info!("Done in {}", format_duration(started.elapsed()));
    Ok(())
}

fn candidate_store(config: &AppConfig) -> CandidateStore {
    CandidateStore::new(config.output.candidates_csv_path(), config.output.candidates_json_path())
}

fn fetcher(config: &AppConfig) -> Result<Arc<dyn PageFetcher>> {
    Ok(Arc::new(HttpClient::new(config.fetch.clone())?))
}

fn extractor(config: &AppConfig) -> Result<Arc<dyn ProductExtractor>> {
    Ok(Arc::new(DetailPageExtractor::with_config(&config.parsing.detail_selectors)?))
}

fn enricher(config: &AppConfig) -> Result<Arc<EnrichmentGenerator>> {
    let client = OllamaClient::new(&config.generator)?;
    info!("Generator model: {}", client.model());
    Ok(Arc::new(EnrichmentGenerator::new(Arc::new(client), config.generator.max_title_chars)))
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing in-flight work");
            token.cancel();
        }
    });
}

async fn discover(config: &AppConfig, target: Option<usize>) -> Result<()> {
    let mut discovery = config.discovery.clone();
    if let Some(target) = target {
        discovery.target_count = target;
    }

    let parser = ListingParser::with_config(&config.parsing.listing_selectors)?;
    let crawler = DiscoveryCrawler::new(fetcher(config)?, parser, config.site.clone(), discovery);

    let mut state = CrawlState::new();
    tokio::select! {
        () = crawler.crawl(&mut state) => {}
        _ = tokio::signal::ctrl_c() => warn!("🛑 Discovery interrupted, keeping what was found"),
    }
    state.stats.log_summary(state.candidates.len());

    let candidates = state.candidates.into_ranked();
    candidate_store(config)
        .write_all(&candidates)
        .await
        .context("Failed to write candidate list")?;

    info!("🏆 Top candidates:");
    for (i, candidate) in candidates.iter().take(10).enumerate() {
        info!(
            "   {:>2}. [{:.0}] {} ({} #{})",
            i + 1,
            candidate.priority_score,
            candidate.id,
            candidate.discovery_source,
            candidate.rank_in_source.map_or_else(|| "-".to_string(), |r| r.to_string())
        );
    }
    Ok(())
}

async fn open_sink(config: &AppConfig, args: &RunArgs) -> Result<Arc<dyn ProductSink>> {
    if args.dry_run {
        info!("🧪 Dry run: records stay in memory");
        return Ok(Arc::new(MemorySink::new()));
    }
    match args.sink {
        SinkKind::Sqlite => {
            let url = config.output.resolved_database_url();
            let db = DatabaseConnection::new(&url)
                .await
                .with_context(|| format!("Failed to open database {url}"))?;
            db.migrate().await?;
            Ok(Arc::new(SqliteProductSink::new(Arc::new(db.pool().clone()))))
        }
        SinkKind::Files => Ok(Arc::new(FileBundleSink::new(config.output.bundle_path()))),
    }
}

async fn run_batch(config: &AppConfig, args: RunArgs) -> Result<()> {
    let candidates = candidate_store(config).load().await?;
    if candidates.is_empty() {
        bail!("No candidates to process; run `shelf-scout discover` first");
    }

    let ledger_store = LedgerStore::new(config.output.ledger_path());
    let mut ledger = ledger_store.load().await?;
    info!(
        "📂 Ledger: {} processed, {} failed, last index {}",
        ledger.processed_count(),
        ledger.failed_count(),
        ledger.last_index
    );

    let mut params = RunParameters::from_config(&config.batch);
    params.start = match (args.start, args.resume) {
        (Some(start), _) => start,
        (None, true) => ledger.last_index,
        (None, false) => 0,
    };
    params.max_items = args.max;
    if let Some(threshold) = args.threshold {
        params.threshold = threshold;
    }
    if let Some(workers) = args.workers {
        params.workers = workers.max(1);
    }

    let sink = open_sink(config, &args).await?;
    let mut orchestrator = BatchOrchestrator::new(fetcher(config)?, extractor(config)?, enricher(config)?, sink, config.batch.clone())
        .with_locales(config.generator.locales.clone())
        .with_affiliate_tag(config.site.affiliate_tag.clone());
    if !args.dry_run {
        orchestrator = orchestrator.with_ledger_store(ledger_store);
    }
    cancel_on_ctrl_c(orchestrator.cancellation_token());

    let report = orchestrator.run(&candidates, &mut ledger, &params).await?;
    match report.stop_reason {
        StopReason::Finished => {}
        StopReason::RateLimited => warn!("The site is rate limiting; wait before running again with --resume"),
        StopReason::Interrupted => info!("Run again with --resume to continue"),
    }
    Ok(())
}

async fn social(config: &AppConfig, max: Option<usize>, threshold: Option<f64>) -> Result<()> {
    let candidates = candidate_store(config).load().await?;
    if candidates.is_empty() {
        bail!("No candidates to publish; run `shelf-scout discover` first");
    }

    let ledger_store = LedgerStore::new(config.output.social_ledger_path());
    let mut ledger = ledger_store.load().await?;

    let publisher = SocialPublisher::new(
        fetcher(config)?,
        extractor(config)?,
        enricher(config)?,
        SocialBundleWriter::new(config.output.social_path()),
        config.social.clone(),
    )
    .with_ledger_store(ledger_store)
    .with_affiliate_tag(config.site.affiliate_tag.clone());
    cancel_on_ctrl_c(publisher.cancellation_token());

    let report = publisher
        .publish(
            &candidates,
            &mut ledger,
            max.unwrap_or(config.social.max_products),
            threshold.unwrap_or(config.social.priority_threshold),
        )
        .await?;
    info!("📁 Bundles in {}", config.output.social_path().display());
    for dir in &report.bundles {
        info!("   {}", dir.display());
    }
    Ok(())
}

async fn show_ledger(config: &AppConfig, failed: bool, social: bool) -> Result<()> {
    let path = if social {
        config.output.social_ledger_path()
    } else {
        config.output.ledger_path()
    };
    let ledger = LedgerStore::new(&path).load().await?;

    println!("Ledger: {}", path.display());
    println!("  processed:  {}", ledger.processed_count());
    println!("  failed:     {}", ledger.failed_count());
    println!("  last index: {}", ledger.last_index);
    match ledger.saved_at {
        Some(at) => println!("  saved at:   {}", at.to_rfc3339()),
        None => println!("  saved at:   never"),
    }

    if failed {
        for (id, record) in &ledger.failed_ids {
            println!();
            println!("{id} ({})", record.timestamp.format("%Y-%m-%d %H:%M:%S"));
            println!("  {}", record.url);
            println!("  {}", record.error);
        }
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
