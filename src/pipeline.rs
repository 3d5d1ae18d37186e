//! Extract → enrich → load.
//!
//! Inputs are read in full before anything touches the store. Movies are
//! then resolved and upserted one row at a time, or on a resolver pool
//! feeding a single SQLite writer when more than one worker is requested.
//! Ratings go last, in batched transactions.

use crate::enrich::EnrichmentService;
use crate::error::{EtlError, Result};
use crate::ingest::{read_movies, read_ratings};
use crate::loader::Loader;
use crate::models::{MovieRecord, MovieRow, RatingRecord, RunStats};
use crate::normalize::{decade, extract_year};
use crate::progress::{create_progress_bar, report_movie};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

const MOVIE_BATCH_SIZE: usize = 500;
const FLUSH_EVERY: Duration = Duration::from_millis(750);

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Resolver threads; 1 keeps the fully sequential behaviour
    pub workers: usize,
    /// Rows of each input to log before processing
    pub preview: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            preview: 5,
        }
    }
}

pub struct Inputs {
    pub movies: Vec<MovieRow>,
    pub ratings: Vec<RatingRecord>,
}

/// Read both input files. Any failure here aborts before store writes.
pub fn extract(movies_path: &Path, ratings_path: &Path) -> Result<Inputs> {
    let movies = read_movies(movies_path)?;
    let ratings = read_ratings(ratings_path)?;
    Ok(Inputs { movies, ratings })
}

pub fn log_preview(inputs: &Inputs, rows: usize) {
    for movie in inputs.movies.iter().take(rows) {
        let year = extract_year(&movie.title);
        info!(
            movie_id = movie.movie_id,
            title = %movie.title,
            genres = movie.genres.as_deref().unwrap_or("-"),
            year = ?year,
            decade = ?decade(year),
            "movies preview"
        );
    }
    for rating in inputs.ratings.iter().take(rows) {
        info!(
            user_id = rating.user_id,
            movie_id = rating.movie_id,
            rating = rating.rating,
            timestamp = rating.timestamp,
            rated_at = ?rating.rated_at(),
            "ratings preview"
        );
    }
}

/// Run the transform and load phases over already-extracted inputs.
pub fn run(
    inputs: Inputs,
    service: &EnrichmentService,
    loader: &mut Loader,
    options: &PipelineOptions,
) -> Result<RunStats> {
    let start = Instant::now();
    let mut stats = RunStats {
        movies_read: inputs.movies.len(),
        ratings_read: inputs.ratings.len(),
        ..Default::default()
    };

    if options.preview > 0 {
        log_preview(&inputs, options.preview);
    }

    let before = service.counters();
    stats.movies_loaded = load_movies(inputs.movies, service, loader, options.workers)?;
    let after = service.counters();
    stats.cache_hits = after.cache_hits - before.cache_hits;
    stats.fetches = after.fetches - before.fetches;
    stats.fetch_failures = after.fetch_failures - before.fetch_failures;
    stats.offline_misses = after.offline_misses - before.offline_misses;

    stats.ratings_inserted = load_ratings(&inputs.ratings, loader)?;
    stats.ratings_ignored = stats.ratings_read - stats.ratings_inserted;

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}

/// Resolve and upsert every movie row. Returns the number of rows written.
pub fn load_movies(
    rows: Vec<MovieRow>,
    service: &EnrichmentService,
    loader: &mut Loader,
    workers: usize,
) -> Result<usize> {
    let pb = create_progress_bar(rows.len() as u64, "movies");

    let written = if workers > 1 {
        load_movies_parallel(rows, service, loader, workers, &pb)?
    } else {
        load_movies_sequential(rows, service, loader, &pb)?
    };

    pb.finish_with_message(format!("loaded {}", written));
    Ok(written)
}

fn load_movies_sequential(
    rows: Vec<MovieRow>,
    service: &EnrichmentService,
    loader: &Loader,
    pb: &ProgressBar,
) -> Result<usize> {
    let mut written = 0;
    for row in rows {
        let details = service.resolve(&row.title)?;
        let record = MovieRecord::from_row(row, details);
        loader.upsert_movie(&record)?;
        report_movie(pb, &record);
        written += 1;
    }
    Ok(written)
}

fn load_movies_parallel(
    rows: Vec<MovieRow>,
    service: &EnrichmentService,
    loader: &mut Loader,
    workers: usize,
    pb: &ProgressBar,
) -> Result<usize> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EtlError::WorkerPool(e.to_string()))?;
    let (tx, rx) = bounded::<Result<MovieRecord>>(workers * 4);

    std::thread::scope(|s| {
        let resolver = s.spawn(move || {
            pool.install(|| {
                rows.into_par_iter().try_for_each_with(tx, |tx, row| {
                    let record = service
                        .resolve(&row.title)
                        .map(|details| MovieRecord::from_row(row, details));
                    // A closed channel means the writer gave up; stop resolving
                    tx.send(record).map_err(|_| ())
                })
            })
        });

        let written = write_movies(loader, rx, pb);

        match resolver.join() {
            Ok(_) => written,
            Err(_) => Err(EtlError::WorkerPool("resolver thread panicked".to_string())),
        }
    })
}

/// Single writer: drains resolved records and upserts them in batches.
fn write_movies(
    loader: &mut Loader,
    rx: Receiver<Result<MovieRecord>>,
    pb: &ProgressBar,
) -> Result<usize> {
    let mut batch: Vec<MovieRecord> = Vec::with_capacity(MOVIE_BATCH_SIZE);
    let mut written = 0;
    let mut last_flush = Instant::now();

    loop {
        match rx.recv_timeout(FLUSH_EVERY) {
            Ok(record) => {
                let record = record?;
                report_movie(pb, &record);
                batch.push(record);
                if batch.len() >= MOVIE_BATCH_SIZE || last_flush.elapsed() >= FLUSH_EVERY {
                    written += loader.upsert_movies(&batch)?;
                    batch.clear();
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !batch.is_empty() {
                    written += loader.upsert_movies(&batch)?;
                    batch.clear();
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !batch.is_empty() {
                    written += loader.upsert_movies(&batch)?;
                }
                break;
            }
        }
    }

    Ok(written)
}

/// Insert all ratings, skipping duplicates. Returns rows actually inserted.
pub fn load_ratings(ratings: &[RatingRecord], loader: &mut Loader) -> Result<usize> {
    let pb = create_progress_bar(ratings.len() as u64, "ratings");
    let inserted = loader.insert_ratings_ignore_duplicates(ratings, |n| pb.inc(n as u64))?;
    pb.finish_with_message(format!(
        "inserted {}, ignored {} duplicates",
        inserted,
        ratings.len() - inserted
    ));
    Ok(inserted)
}
