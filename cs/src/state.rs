//! StateStore - persisted key/value document plus the layout overlay
//!
//! ```text
//! <data-dir>/
//! ├── state.json     # StateDocument: { key: value, ... }
//! ├── coords.txt     # coordinate cache, one `id:x,y` per line
//! ├── desktop.json   # item list saved by the UI (optional)
//! └── assets/        # write-once binary assets
//! ```
//!
//! The store itself is not synchronized. Callers run every operation that
//! touches these files on the PersistenceQueue worker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};
use crate::layout::{CoordCache, LayoutEntry, merge_layout};

/// File holding the StateDocument
pub const STATE_FILE: &str = "state.json";

/// File holding the coordinate cache
pub const COORDS_FILE: &str = "coords.txt";

/// UI-saved item list that gets the same overlay as `desktop_items`
pub const DESKTOP_FILE: &str = "desktop.json";

/// State key whose value is the canonical desktop item list
pub const DESKTOP_ITEMS_KEY: &str = "desktop_items";

/// Mapping from key to arbitrary structured value
pub type StateDocument = Map<String, Value>;

/// Key/value store rooted at one data directory
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
    fallback_dir: Option<PathBuf>,
}

impl StateStore {
    /// Open a store at `data_dir`; the directory is created on first write
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        debug!(data_dir = %data_dir.display(), "StateStore::open: called");
        Self {
            data_dir,
            fallback_dir: std::env::current_dir().ok(),
        }
    }

    /// Search `dir` for files missing from the data dir when reading raw text
    pub fn with_fallback_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_dir = dir;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn coords_path(&self) -> PathBuf {
        self.data_dir.join(COORDS_FILE)
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| StoreError::io(&self.data_dir, e))
    }

    // === StateDocument ===

    /// Load the whole document; missing or corrupt files read as empty
    pub fn load_document(&self) -> StateDocument {
        match self.try_load_document() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Treating unreadable state document as empty");
                StateDocument::new()
            }
        }
    }

    fn try_load_document(&self) -> StoreResult<StateDocument> {
        let path = self.state_path();
        let Some(content) = read_optional(&path)? else {
            debug!(path = %path.display(), "try_load_document: no state document yet");
            return Ok(StateDocument::new());
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(other) => Err(StoreError::Corrupt {
                path,
                message: format!("expected an object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(StoreError::Corrupt {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Get a value; `desktop_items` comes back with cached positions overlaid
    pub fn get(&self, key: &str) -> Option<Value> {
        debug!(%key, "get: called");
        match self.load_document().remove(key)? {
            Value::Array(items) if key == DESKTOP_ITEMS_KEY => Some(Value::Array(self.merge_layout(items))),
            value => Some(value),
        }
    }

    /// Set a value and rewrite the document atomically
    ///
    /// Saving `desktop_items` also rewrites the coordinate cache from the
    /// positional fields of the new list.
    pub fn save(&self, key: &str, value: Value) -> StoreResult<()> {
        debug!(%key, "save: called");
        self.ensure_dir()?;

        let cache = match (key, &value) {
            (DESKTOP_ITEMS_KEY, Value::Array(items)) => Some(CoordCache::from_items(items)),
            _ => None,
        };

        let mut doc = self.load_document();
        doc.insert(key.to_string(), value);
        let content = serde_json::to_string_pretty(&doc)?;
        self.write_with_layout(&self.state_path(), &content, cache)?;
        info!(%key, "State saved");
        Ok(())
    }

    // === Layout ===

    /// Read the coordinate cache; a missing or unreadable file is an empty cache
    pub fn load_coords(&self) -> CoordCache {
        match read_optional(&self.coords_path()) {
            Ok(Some(content)) => CoordCache::parse(&content),
            Ok(None) => CoordCache::new(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable coordinate cache");
                CoordCache::new()
            }
        }
    }

    /// Overlay cached positions onto `items`
    pub fn merge_layout(&self, items: Vec<Value>) -> Vec<Value> {
        let cache = self.load_coords();
        debug!(items = items.len(), cached = cache.len(), "merge_layout: called");
        merge_layout(items, &cache)
    }

    /// Rewrite the coordinate cache from the positions in `items`
    pub fn extract_layout(&self, items: &[Value]) -> StoreResult<()> {
        let cache = CoordCache::from_items(items);
        debug!(items = items.len(), kept = cache.len(), "extract_layout: called");
        self.ensure_dir()?;
        write_atomic(self.coords_path(), cache.render())
    }

    /// Write `content` to `path`, refreshing the coordinate cache first
    ///
    /// The cache is written before the item list. If the list write fails the
    /// previous cache is put back, or removed when there was none, so the
    /// cache never carries positions from a list that was not saved.
    fn write_with_layout(&self, path: &Path, content: &str, cache: Option<CoordCache>) -> StoreResult<()> {
        let Some(cache) = cache else {
            return write_atomic(path, content);
        };

        let coords_path = self.coords_path();
        let previous = read_optional(&coords_path).unwrap_or_else(|e| {
            warn!(error = %e, "write_with_layout: previous coordinate cache unreadable, treating as absent");
            None
        });
        debug!(kept = cache.len(), had_previous = previous.is_some(), "write_with_layout: called");

        write_atomic(&coords_path, cache.render())?;
        if let Err(e) = write_atomic(path, content) {
            warn!(
                path = %path.display(),
                error = %e,
                "write_with_layout: item list not written, rolling back coordinate cache"
            );
            self.restore_coords(previous.as_deref());
            return Err(e);
        }
        Ok(())
    }

    /// Best effort: put back `previous`, dropping the cache if that fails too
    fn restore_coords(&self, previous: Option<&str>) {
        let coords_path = self.coords_path();
        if let Some(previous) = previous {
            match write_atomic(&coords_path, previous) {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "restore_coords: could not restore previous cache, removing it"),
            }
        }
        if let Err(e) = fs::remove_file(&coords_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %coords_path.display(), error = %e, "restore_coords: could not remove coordinate cache");
        }
    }

    /// Record one drag position; last write wins per id
    pub fn update_coords(&self, id: &str, x: f64, y: f64) -> StoreResult<()> {
        debug!(%id, x, y, "update_coords: called");
        if !x.is_finite() || !y.is_finite() {
            return Err(StoreError::InvalidCoordinates(format!("non-finite position for {}", id)));
        }
        let entry = LayoutEntry::new(id, x.trunc() as i64, y.trunc() as i64);
        if !entry.has_storable_id() {
            return Err(StoreError::InvalidCoordinates(format!("id {:?} cannot be stored in the cache", id)));
        }
        self.ensure_dir()?;
        let mut cache = self.load_coords();
        cache.upsert(entry);
        write_atomic(self.coords_path(), cache.render())
    }

    // === Raw files ===

    /// Read a file from the data dir, falling back to the fallback dir
    pub fn read_text(&self, name: &str) -> Option<String> {
        debug!(%name, "read_text: called");
        if validate_file_name(name).is_err() {
            warn!(%name, "read_text: rejecting invalid file name");
            return None;
        }

        let primary = self.data_dir.join(name);
        match read_optional(&primary) {
            Ok(Some(content)) => return Some(content),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "read_text: primary read failed"),
        }

        let fallback = self.fallback_dir.as_ref()?.join(name);
        match read_optional(&fallback) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "read_text: fallback read failed");
                None
            }
        }
    }

    /// Read a UI file; `desktop.json` comes back with cached positions overlaid
    pub fn read_file(&self, name: &str) -> Option<String> {
        let content = self.read_text(name)?;
        if name != DESKTOP_FILE {
            return Some(content);
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(items)) => {
                let merged = Value::Array(self.merge_layout(items));
                Some(merged.to_string())
            }
            Ok(_) => Some(content),
            Err(e) => {
                warn!(error = %e, "read_file: desktop.json is not valid JSON, returning it unmerged");
                Some(content)
            }
        }
    }

    /// Atomically write a UI file into the data dir
    ///
    /// Writing `desktop.json` also refreshes the coordinate cache so the two
    /// never disagree.
    pub fn write_file(&self, name: &str, content: &str) -> StoreResult<PathBuf> {
        debug!(%name, bytes = content.len(), "write_file: called");
        validate_file_name(name)?;
        self.ensure_dir()?;

        let cache = if name == DESKTOP_FILE {
            match serde_json::from_str::<Value>(content) {
                Ok(Value::Array(items)) => Some(CoordCache::from_items(&items)),
                _ => {
                    warn!("write_file: desktop.json is not an item list, coordinate cache left alone");
                    None
                }
            }
        } else {
            None
        };

        let path = self.data_dir.join(name);
        self.write_with_layout(&path, content, cache)?;
        info!(path = %path.display(), "File saved");
        Ok(path)
    }
}

/// Accept only plain file names inside the data dir
pub fn validate_file_name(name: &str) -> StoreResult<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
        && Path::new(name).is_relative();
    if plain {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
