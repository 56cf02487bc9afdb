//! Crash-safe single-file writes
//!
//! Content is written in full to a `.tmp` sibling, synced, then renamed over
//! the target. A reader of the target path sees either the previous contents
//! or the new contents, never a partial file. On failure the temp file is
//! removed and the target is left as it was.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Suffix appended to the target path for the in-flight copy
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path of the temp sibling used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomically replace the contents of `path`
pub fn write_atomic(path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> StoreResult<()> {
    let path = path.as_ref();
    let temp = temp_path(path);
    debug!(path = %path.display(), bytes = content.as_ref().len(), "write_atomic: called");

    if let Err(e) = write_then_swap(path, &temp, content.as_ref()) {
        warn!(path = %path.display(), error = %e, "write_atomic: failed, removing temp file");
        discard_temp(&temp);
        return Err(e);
    }
    Ok(())
}

fn write_temp(temp: &Path, content: &[u8]) -> StoreResult<()> {
    let mut file = fs::File::create(temp).map_err(|e| StoreError::io(temp, e))?;
    file.write_all(content).map_err(|e| StoreError::io(temp, e))?;
    file.sync_all().map_err(|e| StoreError::io(temp, e))
}

fn write_then_swap(path: &Path, temp: &Path, content: &[u8]) -> StoreResult<()> {
    write_temp(temp, content)?;

    // rename() replaces an existing target atomically on every platform std supports
    if path.exists() {
        debug!(path = %path.display(), "write_then_swap: replacing existing file");
    } else {
        debug!(path = %path.display(), "write_then_swap: creating new file");
    }
    fs::rename(temp, path).map_err(|e| StoreError::io(path, e))
}

fn discard_temp(temp: &Path) {
    if temp.exists()
        && let Err(rm) = fs::remove_file(temp)
    {
        debug!(temp = %temp.display(), error = %rm, "discard_temp: could not remove temp file");
    }
}

/// Atomically write `content` to a path that must not exist yet
///
/// The synced temp file is hard-linked into place. Linking fails with
/// `AlreadyExists` when the target is present, so an existing file is never
/// replaced, even by a writer racing this one.
pub fn write_new(path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> StoreResult<()> {
    let path = path.as_ref();
    let temp = temp_path(path);
    debug!(path = %path.display(), bytes = content.as_ref().len(), "write_new: called");

    let result = write_temp(&temp, content.as_ref())
        .and_then(|()| fs::hard_link(&temp, path).map_err(|e| StoreError::io(path, e)));
    discard_temp(&temp);
    if let Err(e) = &result {
        warn!(path = %path.display(), error = %e, "write_new: failed");
    }
    result
}
