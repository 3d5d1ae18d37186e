//! Summarize the OMDb enrichment cache and optionally drop cached failures
//!
//! Usage: cache-report <omdb_cache.json> [--sample N] [--purge-failed]
//!
//! Failed lookups are cached as "Data not available" and never retried.
//! Purging them lets the next movie-etl run fetch those titles again.

use anyhow::{Context, Result};
use clap::Parser;
use movie_etl::cache::EnrichmentCache;
use movie_etl::models::{CacheEntry, NOT_AVAILABLE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cache-report")]
#[command(about = "Report on (and prune) the OMDb enrichment cache")]
struct Args {
    #[arg(env = "OMDB_CACHE", default_value = "omdb_cache.json")]
    cache: PathBuf,

    /// Number of failed titles to list
    #[arg(long, default_value = "20")]
    sample: usize,

    /// Remove cached failures so they are fetched again on the next run
    #[arg(long)]
    purge_failed: bool,
}

#[derive(Default)]
struct Breakdown {
    resolved: usize,
    failed: usize,
    no_director: usize,
    no_plot: usize,
    no_box_office: usize,
}

impl Breakdown {
    fn record(&mut self, entry: &CacheEntry) {
        if entry.is_not_available() {
            self.failed += 1;
            return;
        }
        self.resolved += 1;
        // OMDb itself reports unknown fields as "N/A"
        let missing = |v: &str| v == NOT_AVAILABLE || v == "N/A";
        if missing(&entry.director) {
            self.no_director += 1;
        }
        if missing(&entry.plot) {
            self.no_plot += 1;
        }
        if missing(&entry.box_office) {
            self.no_box_office += 1;
        }
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Loading cache {:?}...", args.cache);
    let cache = EnrichmentCache::open(&args.cache).context("Failed to load enrichment cache")?;
    let entries = cache.snapshot();
    let total = entries.len();

    let mut breakdown = Breakdown::default();
    let mut failed_titles: Vec<&String> = Vec::new();
    for (title, entry) in &entries {
        breakdown.record(entry);
        if entry.is_not_available() {
            failed_titles.push(title);
        }
    }
    failed_titles.sort();

    println!("\n{:=<60}", "");
    println!("Cache entries: {}", total);
    println!(
        "  Resolved:      {:>7} ({:.1}%)",
        breakdown.resolved,
        pct(breakdown.resolved, total)
    );
    println!(
        "  Failed:        {:>7} ({:.1}%)",
        breakdown.failed,
        pct(breakdown.failed, total)
    );
    println!("Resolved entries missing:");
    println!("  director:      {:>7}", breakdown.no_director);
    println!("  plot:          {:>7}", breakdown.no_plot);
    println!("  box office:    {:>7}", breakdown.no_box_office);
    println!("{:=<60}", "");

    if !failed_titles.is_empty() && args.sample > 0 {
        println!("\nFailed titles (first {}):", args.sample.min(failed_titles.len()));
        for title in failed_titles.iter().take(args.sample) {
            println!("  {}", title);
        }
    }

    if args.purge_failed {
        let removed = cache
            .remove_where(|_, entry| entry.is_not_available())
            .context("Failed to rewrite enrichment cache")?;
        println!("\nPurged {} failed entries from {:?}", removed, args.cache);
    }

    Ok(())
}
