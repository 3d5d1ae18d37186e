//! CSV extraction for the MovieLens-style input files.
//!
//! Both readers load the whole file up front: a malformed row anywhere
//! aborts the run before the store is touched.

use crate::error::{EtlError, Result};
use crate::models::{MovieRow, RatingRecord, RatingRow};
use crate::progress::create_spinner;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

pub fn read_movies(path: &Path) -> Result<Vec<MovieRow>> {
    read_rows(path, "Reading movies")
}

pub fn read_ratings(path: &Path) -> Result<Vec<RatingRecord>> {
    let rows: Vec<RatingRow> = read_rows(path, "Reading ratings")?;
    Ok(rows.into_iter().map(RatingRecord::from).collect())
}

fn read_rows<T: DeserializeOwned>(path: &Path, phase: &str) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|source| EtlError::InputIo {
        path: path.to_path_buf(),
        source,
    })?;

    let spinner = create_spinner(phase);
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(file);

    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        let row: T = record.map_err(|source| EtlError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }

    spinner.finish_with_message(format!("{}: {} rows", phase, rows.len()));
    Ok(rows)
}
