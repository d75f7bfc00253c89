//! Batched CDN cache invalidation.
//!
//! Takes the changed-path list a sync run produced and issues invalidation
//! requests against a distribution, chunked so no single request exceeds the
//! provider's path limit. Paths are rooted (`/index.html`) because CDN
//! invalidation addresses URLs, not store keys. An empty change list issues
//! no request at all.
//!
//! Batches go out sequentially in path order; the first failed batch aborts
//! the remainder, so a retry re-invalidates only from the failed batch on.
//! The shared [`Cancellation`] flag is checked between batches, like the
//! sync engine checks it between uploads.

use thiserror::Error;

use crate::sync::Cancellation;

/// Most paths one invalidation request may carry.
pub const MAX_PATHS_PER_BATCH: usize = 500;

#[derive(Error, Debug)]
pub enum InvalidateError {
    #[error("invalidation batch of {paths} paths failed on {distribution}: {reason}")]
    Batch {
        distribution: String,
        paths: usize,
        reason: String,
    },
    #[error("invalidation cancelled")]
    Cancelled,
}

/// CDN edge the invalidation requests go to.
pub trait CdnClient {
    /// Invalidate one batch of rooted paths on a distribution.
    ///
    /// Callers guarantee `paths` is non-empty and within
    /// [`MAX_PATHS_PER_BATCH`].
    fn invalidate_batch(&self, distribution: &str, paths: &[String])
    -> Result<(), InvalidateError>;
}

/// Invalidate every changed key, batching as needed.
///
/// Keys are store keys (forward-slash relative paths); they are rooted with
/// a leading `/` before being sent. Cancellation is checked before each
/// batch; already-issued batches stand. Returns the number of batches
/// issued.
pub fn invalidate(
    client: &dyn CdnClient,
    distribution: &str,
    changed: &[String],
    cancel: &Cancellation,
) -> Result<usize, InvalidateError> {
    if changed.is_empty() {
        return Ok(0);
    }

    let paths: Vec<String> = changed.iter().map(|key| format!("/{key}")).collect();
    let mut batches = 0;
    for chunk in paths.chunks(MAX_PATHS_PER_BATCH) {
        if cancel.is_cancelled() {
            return Err(InvalidateError::Cancelled);
        }
        client.invalidate_batch(distribution, chunk)?;
        batches += 1;
    }
    Ok(batches)
}

/// CDN client that journals invalidation requests to a log file.
///
/// Pairs with the directory-backed object store: each batch appends one line
/// (`distribution<TAB>path path …`) to `invalidations.log` next to the store
/// root, so a deploy's purge activity can be inspected after the fact.
pub struct FsCdnClient {
    log_path: std::path::PathBuf,
}

impl FsCdnClient {
    pub fn new(root: &std::path::Path) -> Self {
        Self {
            log_path: root.join("invalidations.log"),
        }
    }
}

impl CdnClient for FsCdnClient {
    fn invalidate_batch(
        &self,
        distribution: &str,
        paths: &[String],
    ) -> Result<(), InvalidateError> {
        use std::io::Write;

        let mut file = std::fs::File::options()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|err| InvalidateError::Batch {
                distribution: distribution.to_string(),
                paths: paths.len(),
                reason: err.to_string(),
            })?;
        writeln!(file, "{distribution}\t{}", paths.join(" ")).map_err(|err| {
            InvalidateError::Batch {
                distribution: distribution.to_string(),
                paths: paths.len(),
                reason: err.to_string(),
            }
        })?;
        Ok(())
    }
}
