//! Core data models for the movie ETL.
//!
//! Input rows as they come off the CSV files, the records handed to the
//! loader, the durable enrichment cache entry, and run statistics.

use crate::normalize::{decade, extract_year};
use serde::{Deserialize, Serialize};

/// Placeholder stored when real enrichment data cannot be obtained.
pub const NOT_AVAILABLE: &str = "Data not available";

// ============================================================================
// Input Rows
// ============================================================================

/// Raw row from movies.csv (`movieId,title,genres`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MovieRow {
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub genres: Option<String>,
}

/// Raw row from ratings.csv (`userId,movieId,rating,timestamp`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RatingRow {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub rating: f64,
    pub timestamp: i64,
}

// ============================================================================
// Enrichment Cache Entry
// ============================================================================

/// Externally fetched attributes for one normalized title.
/// The normalized title itself is the key in the cache mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub director: String,
    pub plot: String,
    pub box_office: String,
}

impl CacheEntry {
    pub fn new(
        director: impl Into<String>,
        plot: impl Into<String>,
        box_office: impl Into<String>,
    ) -> Self {
        Self {
            director: director.into(),
            plot: plot.into(),
            box_office: box_office.into(),
        }
    }

    /// The sentinel triple used whenever a lookup fails.
    pub fn not_available() -> Self {
        Self::new(NOT_AVAILABLE, NOT_AVAILABLE, NOT_AVAILABLE)
    }

    /// True when every field is the sentinel, i.e. the lookup failed.
    pub fn is_not_available(&self) -> bool {
        self.director == NOT_AVAILABLE
            && self.plot == NOT_AVAILABLE
            && self.box_office == NOT_AVAILABLE
    }
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self::not_available()
    }
}

// ============================================================================
// Loader Records
// ============================================================================

/// Movie row joined with its enrichment, ready for upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieRecord {
    pub movie_id: i64,
    pub title: String,
    pub genres: Option<String>,
    pub year: Option<i32>,
    pub director: String,
    pub plot: String,
    pub box_office: String,
}

impl MovieRecord {
    pub fn from_row(row: MovieRow, details: CacheEntry) -> Self {
        let year = extract_year(&row.title);
        Self {
            movie_id: row.movie_id,
            title: row.title,
            genres: row.genres,
            year,
            director: details.director,
            plot: details.plot,
            box_office: details.box_office,
        }
    }

    pub fn decade(&self) -> Option<i32> {
        decade(self.year)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingRecord {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
    /// Unix epoch seconds
    pub timestamp: i64,
}

impl RatingRecord {
    /// Timestamp rendered as a UTC datetime, None if out of range.
    pub fn rated_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl From<RatingRow> for RatingRecord {
    fn from(row: RatingRow) -> Self {
        Self {
            user_id: row.user_id,
            movie_id: row.movie_id,
            rating: row.rating,
            timestamp: row.timestamp,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one ETL run, written out with `--stats-out`.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    pub movies_read: usize,
    pub movies_loaded: usize,

    // Enrichment
    pub cache_hits: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    pub offline_misses: usize,

    pub ratings_read: usize,
    pub ratings_inserted: usize,
    pub ratings_ignored: usize,

    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Share of movie rows answered from the cache, as a percentage
    pub fn cache_hit_rate(&self) -> f64 {
        if self.movies_read == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / self.movies_read as f64
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
