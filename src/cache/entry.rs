//! Cached attribute record

use std::time::Duration;

use tokio::time::Instant;

use crate::types::{BlobProperties, ListItem};

/// Cached metadata of one object path
///
/// Entries are never mutated once stored; a refresh replaces the whole entry.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Object path, same as the cache key
    pub name: String,
    pub properties: BlobProperties,
    /// When the properties were last fetched from the remote store
    pub refreshed_at: Instant,
    /// Directories only ever enter the cache as listing placeholders
    pub is_directory: bool,
}

impl Entry {
    /// Entry for properties fetched just now
    pub fn new(name: impl Into<String>, properties: BlobProperties, is_directory: bool) -> Self {
        Self {
            name: name.into(),
            properties,
            refreshed_at: Instant::now(),
            is_directory,
        }
    }

    /// Entry derived from a listing page fetched at `fetched_at`
    pub fn from_list_item(item: &ListItem, fetched_at: Instant) -> Self {
        Self {
            name: item.name.clone(),
            properties: item.properties.clone(),
            refreshed_at: fetched_at,
            is_directory: item.is_directory,
        }
    }

    /// Time since the last remote refresh
    pub fn age(&self) -> Duration {
        self.refreshed_at.elapsed()
    }

    /// Whether the entry may still be served under the given TTL
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}
