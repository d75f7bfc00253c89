//! Incremental upload of the output tree to an object store.
//!
//! Sync never deletes: it walks the local output tree, compares each file's
//! content signature (SHA-256, hex) against the remote listing, and uploads
//! only files that are new or whose signature changed. Remote objects with
//! no local counterpart are left alone. Keys use forward slashes regardless
//! of the local path separator, so the same tree produces the same keys on
//! every platform.
//!
//! Planning and uploading are separate steps: [`plan`] produces a
//! [`SyncPlan`] without touching the remote, which backs `--dry-run`, and
//! [`sync`] executes a plan under a bounded rayon pool. Uploads may race, but
//! the changed-path list comes back in deterministic key order and the first
//! failure (in key order) is surfaced after every upload has been attempted.
//! Cancellation is checked between uploads; work already in flight finishes.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to build upload pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("listing remote objects: {0}")]
    List(String),
    #[error("uploading {key}: {reason}")]
    Put { key: String, reason: String },
    #[error("sync cancelled")]
    Cancelled,
}

/// Who may read an uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    /// World-readable, the policy for published site files.
    #[default]
    PublicRead,
    /// Readable only by the store owner.
    Private,
}

/// One object as reported by the remote listing.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: String,
    /// Hex SHA-256 of the object's content.
    pub signature: String,
}

/// One upload request.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub access: AccessPolicy,
}

/// Storage backend the sync engine uploads through.
///
/// Implementations must be safe to call from multiple upload workers.
pub trait ObjectStore: Sync {
    /// List every object under the store's root, keyed by forward-slash path.
    fn list(&self) -> Result<Vec<RemoteObject>, SyncError>;

    /// Write one object, replacing any existing object at the same key.
    fn put(&self, object: &PutObject) -> Result<(), SyncError>;
}

/// Cooperative cancellation shared between the driver and upload workers.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Plan only; no uploads are performed.
    pub dry_run: bool,
    /// Upper bound on concurrent uploads.
    pub fan_out: usize,
    /// Access policy stamped on every uploaded object.
    pub access: AccessPolicy,
    pub cancel: Cancellation,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            fan_out: 8,
            access: AccessPolicy::PublicRead,
            cancel: Cancellation::new(),
        }
    }
}

/// What a sync would upload, split by reason.
///
/// All three lists are in ascending key order.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Keys with no remote counterpart.
    pub new: Vec<String>,
    /// Keys whose remote signature differs from the local content.
    pub changed: Vec<String>,
    /// Keys whose remote signature already matches.
    pub unchanged: Vec<String>,
}

impl SyncPlan {
    /// Every key that needs uploading, in ascending key order.
    pub fn uploads(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.new.iter().chain(&self.changed).cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty()
    }
}

/// Diff the local output tree against the remote listing.
pub fn plan(local_root: &Path, store: &dyn ObjectStore) -> Result<SyncPlan, SyncError> {
    let local = local_signatures(local_root)?;
    let remote: BTreeMap<String, String> = store
        .list()?
        .into_iter()
        .map(|object| (object.key, object.signature))
        .collect();

    let mut out = SyncPlan::default();
    for (key, signature) in local {
        match remote.get(&key) {
            None => out.new.push(key),
            Some(theirs) if *theirs != signature => out.changed.push(key),
            Some(_) => out.unchanged.push(key),
        }
    }
    Ok(out)
}

/// Upload everything the plan calls for and return the uploaded keys.
///
/// The returned list is the set of remote paths that actually changed, in
/// ascending key order, ready to hand to CDN invalidation. A dry run uploads
/// nothing and returns the same list the real run would.
pub fn sync(
    local_root: &Path,
    store: &dyn ObjectStore,
    options: &SyncOptions,
) -> Result<Vec<String>, SyncError> {
    let uploads = plan(local_root, store)?.uploads();
    if options.dry_run || uploads.is_empty() {
        return Ok(uploads);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.fan_out.max(1))
        .build()?;

    let results: Vec<Result<(), SyncError>> = pool.install(|| {
        uploads
            .par_iter()
            .map(|key| {
                if options.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let body = fs::read(local_root.join(key_to_relative(key)))?;
                store.put(&PutObject {
                    key: key.clone(),
                    body,
                    content_type: content_type(key).to_string(),
                    access: options.access,
                })
            })
            .collect()
    });

    match results.into_iter().find_map(|result| result.err()) {
        Some(err) => Err(err),
        None => Ok(uploads),
    }
}

/// Walk the local tree and signature every regular file, keyed by
/// forward-slash path relative to the root.
fn local_signatures(root: &Path) -> Result<BTreeMap<String, String>, SyncError> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(key, signature(entry.path())?);
    }
    Ok(out)
}

/// Hex SHA-256 of a file's content, streamed.
pub fn signature(path: &Path) -> Result<String, SyncError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn key_to_relative(key: &str) -> std::path::PathBuf {
    key.split('/').collect()
}

/// MIME type by extension, defaulting to `application/octet-stream`.
pub fn content_type(key: &str) -> &'static str {
    let extension = key.rsplit('.').next().unwrap_or("");
    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Object store backed by a local directory. Keys map to file paths under
/// the root; signatures are computed from file content on listing.
pub struct FsObjectStore {
    root: std::path::PathBuf,
}

impl FsObjectStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn list(&self) -> Result<Vec<RemoteObject>, SyncError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        for (key, signature) in local_signatures(&self.root)? {
            objects.push(RemoteObject { key, signature });
        }
        Ok(objects)
    }

    fn put(&self, object: &PutObject) -> Result<(), SyncError> {
        let path = self.root.join(key_to_relative(&object.key));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &object.body)?;
        Ok(())
    }
}
