//! Terminal progress for the load phases.
//!
//! Bars count CSV rows. With `--log-only` nothing is drawn and each loaded
//! movie becomes an `info!` line instead, which suits piped or CI output.

use crate::models::{MovieRecord, NOT_AVAILABLE};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const ROW_BAR_TEMPLATE: &str =
    "{prefix:>9.bold} {bar:32.green/white} {human_pos}/{human_len} rows  {per_sec}  eta {eta}  {wide_msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed})";
const SPINNER_TICK: Duration = Duration::from_millis(120);

static ROW_BAR_STYLE: Lazy<ProgressStyle> = Lazy::new(|| {
    ProgressStyle::with_template(ROW_BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
});

static SPINNER_STYLE: Lazy<ProgressStyle> = Lazy::new(|| {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
});

/// Set once from `--log-only` before any bar is created.
static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time for the run summary: `850ms`, `12.3s`, `4m 05s`, `1h 02m`.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1_000 {
        return format!("{millis}ms");
    }
    let secs = d.as_secs();
    match secs {
        0..=59 => format!("{:.1}s", d.as_secs_f64()),
        60..=3_599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3_600, (secs % 3_600) / 60),
    }
}

/// Row-counting bar for one load phase, labelled with `phase`.
pub fn create_progress_bar(rows: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(rows).with_prefix(phase.to_string());
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(ROW_BAR_STYLE.clone());
    }
    pb
}

/// Spinner shown while a CSV file is read in full.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner().with_message(msg.to_string());
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(SPINNER_STYLE.clone());
        pb.enable_steady_tick(SPINNER_TICK);
    }
    pb
}

/// Advance the movie bar by one row, logging the loaded record.
pub fn report_movie(pb: &ProgressBar, record: &MovieRecord) {
    let enriched = record.director != NOT_AVAILABLE;
    if is_log_only() {
        info!(
            movie_id = record.movie_id,
            title = %record.title,
            year = ?record.year,
            enriched,
            "movie loaded"
        );
    } else {
        pb.set_message(record.title.clone());
        debug!(
            movie_id = record.movie_id,
            director = %record.director,
            box_office = %record.box_office,
            decade = ?record.decade(),
            "movie loaded"
        );
    }
    pb.inc(1);
}
