//! Safety checks to prevent a run from clobbering its own inputs.
//!
//! The cache file is rewritten on every update and the database is written
//! in place, so neither may point at an input CSV or at each other.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Canonical form when the file exists. Not-yet-created outputs are made
/// absolute lexically, so `./out.db` and `out.db` still compare equal.
fn resolved(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Validates that the cache and database paths are safe to write.
///
/// Checks:
/// - Neither output may be one of the input files
/// - The cache and the database must be different files
pub fn validate_output_paths(inputs: &[&Path], cache: &Path, database: &Path) -> Result<()> {
    let cache_r = resolved(cache);
    let database_r = resolved(database);

    for input in inputs {
        let input_r = resolved(input);
        if input_r == cache_r {
            bail!(
                "Safety check failed: cache '{}' cannot be the same as input '{}'",
                cache.display(),
                input.display()
            );
        }
        if input_r == database_r {
            bail!(
                "Safety check failed: database '{}' cannot be the same as input '{}'",
                database.display(),
                input.display()
            );
        }
    }

    if cache_r == database_r {
        bail!(
            "Safety check failed: cache and database both point at '{}'",
            cache.display()
        );
    }

    Ok(())
}
