//! Movie ETL library - shared modules for all binaries.

pub mod cache;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod rate_limit;
pub mod safety;

pub use error::{EtlError, Result};
