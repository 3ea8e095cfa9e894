#![deny(warnings)]
#![deny(clippy::all)]

//! Decides whether a file target's action may be skipped: the mtime policy compares output and
//! input modification times directly off the filesystem, the hash policy compares each input's
//! current content digest against the digest recorded at the target's last successful build.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use kiln_digest_store::{DigestStore, DigestStoreError, Record};
use kiln_hashing::Digest;
use kiln_registry::FileTarget;
use log::{debug, trace};

#[derive(Debug)]
pub enum FreshnessError {
    Io { path: String, source: std::io::Error },
    DigestStore(DigestStoreError),
}

impl fmt::Display for FreshnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreshnessError::Io { path, source } => write!(f, "{path}: {source}"),
            FreshnessError::DigestStore(e) => write!(f, "{e}"),
        }
    }
}

impl Error for FreshnessError {}

impl From<DigestStoreError> for FreshnessError {
    fn from(e: DigestStoreError) -> Self {
        FreshnessError::DigestStore(e)
    }
}

fn mtime_secs(path: &str) -> Result<u64, FreshnessError> {
    let metadata = fs::metadata(path).map_err(|source| FreshnessError::Io {
        path: path.to_string(),
        source,
    })?;
    let modified = metadata.modified().map_err(|source| FreshnessError::Io {
        path: path.to_string(),
        source,
    })?;
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}

/// True iff every declared output of `target` exists on disk. Shared precondition for both
/// freshness policies.
fn outputs_exist(target: &FileTarget) -> bool {
    target.outputs.iter().all(|o| Path::new(o).exists())
}

fn mtime_is_fresh(target: &FileTarget) -> Result<bool, FreshnessError> {
    if !outputs_exist(target) {
        return Ok(false);
    }
    if target.inputs.is_empty() {
        return Ok(true);
    }
    let mut min_output_mtime = u64::MAX;
    for output in &target.outputs {
        min_output_mtime = min_output_mtime.min(mtime_secs(output)?);
    }
    let mut max_input_mtime = 0u64;
    for input in &target.inputs {
        max_input_mtime = max_input_mtime.max(mtime_secs(input)?);
    }
    trace!(
        "mtime check for {:?}: min(output)={min_output_mtime} max(input)={max_input_mtime}",
        target.outputs[0]
    );
    Ok(min_output_mtime >= max_input_mtime)
}

fn current_digest(
    target_name: &str,
    input: &str,
    digest_store: &DigestStore,
) -> Result<Digest, FreshnessError> {
    let current_mtime = mtime_secs(input)?;
    if let Some(record) = digest_store.get(target_name, input) {
        if record.mtime_secs == current_mtime {
            trace!("{input:?} mtime unchanged since last recorded digest, skipping re-hash");
            return Ok(record.digest);
        }
    }
    let digest = Digest::of_file(Path::new(input)).map_err(|source| FreshnessError::Io {
        path: input.to_string(),
        source,
    })?;
    Ok(digest)
}

fn hash_is_fresh(target: &FileTarget, digest_store: &DigestStore) -> Result<bool, FreshnessError> {
    if !outputs_exist(target) {
        return Ok(false);
    }
    let target_name = target.outputs[0].as_str();
    for input in &target.inputs {
        let recorded = digest_store.get(target_name, input);
        let current = current_digest(target_name, input, digest_store)?;
        match recorded {
            Some(record) if record.digest == current => continue,
            _ => {
                debug!("{target_name:?} stale: input {input:?} digest changed or unrecorded");
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Decides whether `target`'s action may be skipped under `use_hash` (the hash policy if true,
/// the mtime policy otherwise). `use_hash` is taken as an explicit parameter rather than read off
/// `target.use_hash` so a driver-level `--use-hash` override can take effect without mutating the
/// (immutable) registered target.
pub fn is_fresh(
    target: &FileTarget,
    use_hash: bool,
    digest_store: &DigestStore,
) -> Result<bool, FreshnessError> {
    if use_hash {
        hash_is_fresh(target, digest_store)
    } else {
        mtime_is_fresh(target)
    }
}

/// Records the input-digest vector observed for `target` after a successful build, for use by a
/// later hash-policy freshness check. A no-op under the mtime policy: mtime freshness is always
/// recomputed from the filesystem, nothing needs persisting.
pub fn record_success(
    target: &FileTarget,
    use_hash: bool,
    digest_store: &mut DigestStore,
) -> Result<(), FreshnessError> {
    if !use_hash {
        return Ok(());
    }
    let target_name = target.outputs[0].clone();
    for input in &target.inputs {
        let digest = Digest::of_file(Path::new(input)).map_err(|source| FreshnessError::Io {
            path: input.clone(),
            source,
        })?;
        let mtime_secs = mtime_secs(input)?;
        digest_store.set(&target_name, input, Record { digest, mtime_secs });
    }
    Ok(())
}
