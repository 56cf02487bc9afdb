//! Desktop layout: positional overrides and the coordinate cache
//!
//! The coordinate cache is a plain-text file with one `id:x,y` line per item.
//! It is a denormalized overlay of the positional fields of the canonical
//! item list, kept for cheap drag updates. It never carries anything but
//! positions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Position of one desktop item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub id: String,
    pub x: i64,
    pub y: i64,
}

impl LayoutEntry {
    pub fn new(id: impl Into<String>, x: i64, y: i64) -> Self {
        Self { id: id.into(), x, y }
    }

    /// Pull the positional fields out of a structured item
    ///
    /// Returns `None` when `id`, `x` or `y` is missing or not usable.
    pub fn from_item(item: &Value) -> Option<Self> {
        let id = match item.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let x = coerce_coordinate(item.get("x")?)?;
        let y = coerce_coordinate(item.get("y")?)?;
        Some(Self { id, x, y })
    }

    /// False for ids the line format cannot hold: empty, or with a line break
    pub fn has_storable_id(&self) -> bool {
        !self.id.is_empty() && !self.id.contains(['\n', '\r'])
    }

    fn to_line(&self) -> String {
        format!("{}:{},{}", self.id, self.x, self.y)
    }

    fn parse_line(line: &str) -> Option<Self> {
        let (id, coords) = line.trim().rsplit_once(':')?;
        let (x, y) = coords.split_once(',')?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            x: parse_coordinate(x)?,
            y: parse_coordinate(y)?,
        })
    }
}

/// Parse as floating point then truncate, so `12` and `12.7` both read as 12
fn parse_coordinate(text: &str) -> Option<i64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value.trunc() as i64)
}

fn coerce_coordinate(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_coordinate(s),
        _ => None,
    }
}

/// Ordered `id -> position` overlay, last write wins per id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordCache {
    entries: Vec<LayoutEntry>,
}

impl CoordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cache file content; malformed lines are skipped
    pub fn parse(content: &str) -> Self {
        let mut cache = Self::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match LayoutEntry::parse_line(line) {
                Some(entry) => cache.upsert(entry),
                None => debug!(line, "CoordCache::parse: skipping malformed line"),
            }
        }
        cache
    }

    /// Render as cache file content, one `id:x,y` line per entry
    pub fn render(&self) -> String {
        self.entries.iter().map(|e| e.to_line() + "\n").collect()
    }

    /// Derive a cache from an item list
    ///
    /// Items without `id`/`x`/`y`, or whose id cannot be stored, are skipped.
    pub fn from_items(items: &[Value]) -> Self {
        let mut cache = Self::new();
        for item in items {
            match LayoutEntry::from_item(item) {
                Some(entry) => cache.upsert(entry),
                None => debug!(?item, "CoordCache::from_items: item has no usable position"),
            }
        }
        cache
    }

    /// Insert or replace the position for `entry.id`, keeping first-seen order
    ///
    /// Entries whose id cannot be stored are dropped.
    pub fn upsert(&mut self, entry: LayoutEntry) {
        if !entry.has_storable_id() {
            debug!(id = ?entry.id, "CoordCache::upsert: skipping id the cache cannot hold");
            return;
        }
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, id: &str) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Overlay cached positions onto `items`
///
/// Pure and order-preserving: every item keeps its place in the list and all
/// fields other than `x`/`y`; items with no cache entry are returned as-is.
pub fn merge_layout(items: Vec<Value>, cache: &CoordCache) -> Vec<Value> {
    items
        .into_iter()
        .map(|mut item| {
            let id = match item.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            if let Some(id) = id
                && let Some(entry) = cache.get(&id)
                && let Some(obj) = item.as_object_mut()
            {
                obj.insert("x".to_string(), Value::from(entry.x));
                obj.insert("y".to_string(), Value::from(entry.y));
            }
            item
        })
        .collect()
}
