//! OMDb API client for fetching director, plot and box office by title.
//!
//! A lookup never fails from the caller's point of view: network errors,
//! non-success statuses, "not found" responses and unparsable bodies all
//! degrade to the "Data not available" entry.

use crate::error::Result;
use crate::models::CacheEntry;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const OMDB_API_BASE: &str = "http://www.omdbapi.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One outbound lookup per call, no retries.
pub trait MetadataFetcher: Send + Sync {
    fn fetch(&self, normalized_title: &str) -> CacheEntry;
}

pub struct OmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Subset of the OMDb title response. Everything is optional because
/// error responses only carry `Response` and `Error`.
#[derive(Debug, Default, Deserialize)]
pub struct OmdbResponse {
    #[serde(rename = "Response")]
    pub response: Option<String>,
    #[serde(rename = "Error")]
    pub error: Option<String>,
    #[serde(rename = "Director")]
    pub director: Option<String>,
    #[serde(rename = "Plot")]
    pub plot: Option<String>,
    #[serde(rename = "BoxOffice")]
    pub box_office: Option<String>,
}

impl OmdbResponse {
    /// Populated entry if the title was found, None otherwise.
    /// Fields missing from a found response default individually.
    pub fn into_entry(self) -> Option<CacheEntry> {
        if self.response.as_deref() != Some("True") {
            return None;
        }
        let fallback = CacheEntry::not_available();
        Some(CacheEntry {
            director: self.director.unwrap_or(fallback.director),
            plot: self.plot.unwrap_or(fallback.plot),
            box_office: self.box_office.unwrap_or(fallback.box_office),
        })
    }
}

impl OmdbClient {
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn lookup(&self, title: &str) -> Result<OmdbResponse> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("t", title), ("apikey", self.api_key.as_str())])
            .send()?
            .error_for_status()?;

        Ok(response.json()?)
    }
}

impl MetadataFetcher for OmdbClient {
    fn fetch(&self, normalized_title: &str) -> CacheEntry {
        match self.lookup(normalized_title) {
            Ok(body) => {
                let reason = body.error.clone();
                match body.into_entry() {
                    Some(entry) => {
                        debug!(title = normalized_title, director = %entry.director, "OMDb hit");
                        entry
                    }
                    None => {
                        warn!(
                            title = normalized_title,
                            reason = reason.as_deref().unwrap_or("unknown"),
                            "OMDb has no match"
                        );
                        CacheEntry::not_available()
                    }
                }
            }
            Err(e) => {
                warn!(title = normalized_title, error = %e, "OMDb request failed");
                CacheEntry::not_available()
            }
        }
    }
}
