//! Attribute cache store
//!
//! A path-keyed map of [`Entry`] snapshots behind a single mutex. The store
//! has no notion of TTL: freshness is judged by the reader, and stale entries
//! stay until they are overwritten or removed.
//!
//! Every removal bumps an invalidation generation. A refresh snapshots the
//! generation before its remote call and inserts with
//! [`AttrCache::put_if_generation`], so properties read before a write can
//! never land after that write has invalidated the path.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::entry::Entry;

/// Upper sentinel appended to a directory prefix for range scans
const RANGE_END: &str = "/\u{FFFF}";

#[derive(Debug, Default)]
struct Slots {
    entries: BTreeMap<String, Arc<Entry>>,
    /// Bumped by every `remove` and `clear`
    generation: u64,
}

/// Thread-safe map from object path to cached attributes
#[derive(Debug, Default)]
pub struct AttrCache {
    slots: Mutex<Slots>,
}

impl AttrCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries are replaced wholesale, so a guard poisoned by a panicking
    /// holder still protects a consistent map.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the entry for `path`
    pub fn put(&self, path: &str, entry: Entry) {
        self.lock().entries.insert(path.to_string(), Arc::new(entry));
        trace!(path = path, "Cached attributes");
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert `entry` unless an invalidation happened since `generation` was read
    ///
    /// Returns whether the entry was stored.
    pub fn put_if_generation(&self, path: &str, entry: Entry, generation: u64) -> bool {
        let mut slots = self.lock();
        if slots.generation != generation {
            trace!(path = path, "Dropped attributes fetched before an invalidation");
            return false;
        }
        slots.entries.insert(path.to_string(), Arc::new(entry));
        trace!(path = path, "Cached attributes");
        true
    }

    /// Current entry for `path`, fresh or not
    pub fn get(&self, path: &str) -> Option<Arc<Entry>> {
        self.lock().entries.get(path).cloned()
    }

    /// Drop the entry for `path`; absent keys are ignored
    ///
    /// Always bumps the generation, so in-flight refreshes of a path that
    /// was never cached are discarded too.
    pub fn remove(&self, path: &str) {
        let mut slots = self.lock();
        slots.generation = slots.generation.wrapping_add(1);
        if slots.entries.remove(path).is_some() {
            debug!(path = path, "Invalidated cached attributes");
        }
    }

    /// Entries whose key falls in `[path, path + "/" + U+FFFF)`, in key order
    pub fn list_under(&self, path: &str) -> Vec<Arc<Entry>> {
        let upper = format!("{}{}", path, RANGE_END);
        let slots = self.lock();
        slots
            .entries
            .range::<str, _>((Bound::Included(path), Bound::Excluded(upper.as_str())))
            .map(|(_, entry)| Arc::clone(entry))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.entries.clear();
        slots.generation = slots.generation.wrapping_add(1);
        debug!("Cleared attribute cache");
    }
}
