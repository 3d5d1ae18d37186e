use anyhow::{Context, Result};
use clap::Parser;
use movie_etl::cache::EnrichmentCache;
use movie_etl::enrich::EnrichmentService;
use movie_etl::fetcher::{OmdbClient, OMDB_API_BASE};
use movie_etl::loader::Loader;
use movie_etl::pipeline::{self, PipelineOptions};
use movie_etl::progress::{format_duration, set_log_only};
use movie_etl::rate_limit;
use movie_etl::safety::validate_output_paths;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "movie-etl")]
#[command(about = "Load MovieLens movies + ratings into SQLite, enriched with OMDb metadata")]
struct Args {
    #[arg(env = "MOVIES_CSV")]
    movies: PathBuf,

    #[arg(env = "RATINGS_CSV")]
    ratings: PathBuf,

    /// SQLite database to upsert into (created if missing)
    #[arg(long, env = "MOVIE_DB", default_value = "movies.sqlite3")]
    database: PathBuf,

    /// JSON enrichment cache, keyed by normalized title
    #[arg(long, env = "OMDB_CACHE", default_value = "omdb_cache.json")]
    cache: PathBuf,

    /// OMDb API key; without one the run uses the cache only
    #[arg(long, env = "OMDB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "OMDB_URL", default_value = OMDB_API_BASE)]
    omdb_url: String,

    /// Minimum spacing between OMDb requests (0 disables throttling)
    #[arg(long, default_value = "100")]
    delay_ms: u64,

    /// Resolver threads for enrichment
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Rows of each input file to log before processing
    #[arg(long, default_value = "5")]
    preview: usize,

    /// Hide progress bars and log every movie row instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("ETL failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    set_log_only(args.log_only);
    let start = Instant::now();

    validate_output_paths(&[&args.movies, &args.ratings], &args.cache, &args.database)?;

    info!(movies = %args.movies.display(), ratings = %args.ratings.display(), "reading inputs");
    let inputs = pipeline::extract(&args.movies, &args.ratings).context("Failed to read input files")?;
    info!(movies = inputs.movies.len(), ratings = inputs.ratings.len(), "inputs read");

    let cache = EnrichmentCache::open(&args.cache).context("Failed to load enrichment cache")?;
    info!(path = %args.cache.display(), entries = cache.len(), "enrichment cache loaded");

    let service = match args.api_key.as_deref() {
        Some(key) => {
            let client = OmdbClient::with_base_url(key, &args.omdb_url)
                .context("Failed to build OMDb client")?;
            let limiter = rate_limit::from_delay(Duration::from_millis(args.delay_ms));
            EnrichmentService::new(cache, Box::new(client), limiter)
        }
        None => {
            warn!("no OMDb API key configured, uncached titles get placeholder details");
            EnrichmentService::offline(cache)
        }
    };

    info!(path = %args.database.display(), "opening database");
    let mut loader = Loader::open(&args.database).context("Failed to open database")?;

    let options = PipelineOptions {
        workers: args.workers as usize,
        preview: args.preview,
    };
    let stats = pipeline::run(inputs, &service, &mut loader, &options)?;
    loader.close().context("Failed to close database")?;

    if let Some(path) = &args.stats_out {
        stats.write_to_file(path).context("Failed to write stats")?;
    }

    println!("\n{:=<60}", "");
    println!("ETL finished successfully!");
    println!("  Movies: {} loaded", stats.movies_loaded);
    println!(
        "  Enrichment: {} cached ({:.1}%), {} fetched, {} failed, {} offline",
        stats.cache_hits,
        stats.cache_hit_rate(),
        stats.fetches,
        stats.fetch_failures,
        stats.offline_misses
    );
    println!(
        "  Ratings: {} inserted, {} duplicates ignored",
        stats.ratings_inserted, stats.ratings_ignored
    );
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
