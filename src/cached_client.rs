//! Caching blob client
//!
//! Wraps any [`BlobClient`] and keeps an [`AttrCache`] coherent with the
//! operations passing through it:
//! - metadata reads are served from the cache while the entry is within TTL
//! - writes and deletes invalidate the path before the remote call, and
//!   again once it returns
//! - listings always go to the remote store and warm the cache as a side effect
//! - content reads and the directory-empty probe bypass the cache
//!
//! With caching disabled every call is a plain pass-through.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::cache::{AttrCache, Entry};
use crate::client::BlobClient;
use crate::config::CacheConfig;
use crate::error::{CacheError, RemoteError};
use crate::listing::{classify_directory, Pager};
use crate::types::{BlobProperties, DirectoryState, ListItem, ListPage};

/// Cache-aware decorator around a remote blob client
pub struct CachedBlobClient<C> {
    inner: C,
    cache: Arc<AttrCache>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: BlobClient> CachedBlobClient<C> {
    /// Wrap `inner` with a cache of its own
    pub fn new(inner: C, config: CacheConfig) -> Self {
        Self::with_cache(inner, config, Arc::new(AttrCache::new()))
    }

    /// Wrap `inner` sharing an existing cache
    pub fn with_cache(inner: C, config: CacheConfig, cache: Arc<AttrCache>) -> Self {
        debug!(
            enabled = config.enabled,
            ttl_secs = config.ttl.as_secs(),
            max_list_failures = config.retry.max_consecutive_failures,
            "Attribute cache configured"
        );
        Self {
            inner,
            cache,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<AttrCache> {
        &self.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached entry for `path` if it is still within TTL
    fn lookup_fresh(&self, path: &str) -> Option<Arc<Entry>> {
        match self.cache.get(path) {
            Some(entry) if entry.is_fresh(self.config.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache HIT for attributes");
                Some(entry)
            }
            stale => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, stale = stale.is_some(), "Cache MISS for attributes");
                None
            }
        }
    }

    /// Fetch object metadata, from cache when fresh
    ///
    /// A failed refresh is returned as is; stale entries are never served.
    /// A refresh that overlaps a write or delete of the same store is
    /// returned but not cached.
    pub async fn get_properties(
        &self,
        container: &str,
        path: &str,
    ) -> Result<BlobProperties, RemoteError> {
        if !self.config.enabled {
            return self.inner.get_properties(container, path).await;
        }

        if let Some(entry) = self.lookup_fresh(path) {
            return Ok(entry.properties.clone());
        }

        let generation = self.cache.generation();
        let properties = self.inner.get_properties(container, path).await?;
        let entry = Entry::new(path, properties.clone(), false);
        self.cache.put_if_generation(path, entry, generation);
        Ok(properties)
    }

    /// Check existence; a fresh cache entry answers `true` without a remote call
    ///
    /// Remote answers are not cached.
    pub async fn exists(&self, container: &str, path: &str) -> Result<bool, RemoteError> {
        if self.config.enabled && self.lookup_fresh(path).is_some() {
            return Ok(true);
        }
        self.inner.exists(container, path).await
    }

    /// Upload `data` to `path`, invalidating its cached attributes first
    pub async fn upload(
        &self,
        container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError> {
        self.invalidate(path);
        let result = self.inner.upload(container, path, data, metadata).await;
        // Drops anything refreshed while the write was in flight
        self.invalidate(path);
        let properties = result?;
        info!(container = container, path = path, size = properties.content_length, "Uploaded");
        Ok(properties)
    }

    /// Upload the contents of a local file
    pub async fn upload_file(
        &self,
        container: &str,
        path: &str,
        source: &Path,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, CacheError> {
        let data = tokio::fs::read(source).await?;
        Ok(self.upload(container, path, data, metadata).await?)
    }

    /// Read object content; never touches the cache
    pub async fn download(
        &self,
        container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError> {
        self.inner.download(container, path, range).await
    }

    /// Download a whole object into `dest`, replacing it atomically
    ///
    /// Returns the number of bytes written.
    pub async fn download_to_file(
        &self,
        container: &str,
        path: &str,
        dest: &Path,
    ) -> Result<u64, CacheError> {
        let data = self.download(container, path, None).await?;
        let size = data.len() as u64;
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || write_atomically(&dest, &data))
            .await
            .map_err(std::io::Error::other)??;

        debug!(container = container, path = path, size = size, "Downloaded to file");
        Ok(size)
    }

    /// Delete `path`, invalidating its cached attributes first
    pub async fn delete(&self, container: &str, path: &str) -> Result<(), RemoteError> {
        self.invalidate(path);
        let result = self.inner.delete(container, path).await;
        self.invalidate(path);
        result?;
        info!(container = container, path = path, "Deleted");
        Ok(())
    }

    /// List everything under `prefix`
    ///
    /// Always a full remote listing; every file in the result refreshes its
    /// cache entry, stamped with the time its page was fetched.
    pub async fn list_all(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
    ) -> Result<Vec<ListItem>, CacheError> {
        let pager = Pager::new(&self.inner, container, delimiter, prefix, self.config.retry);
        self.collect_and_warm(pager).await
    }

    /// Like [`Self::list_all`], stopping between pages once `cancel` fires
    pub async fn list_all_cancellable(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListItem>, CacheError> {
        let pager = Pager::new(&self.inner, container, delimiter, prefix, self.config.retry)
            .with_cancellation(cancel);
        self.collect_and_warm(pager).await
    }

    /// Drain `pager`, warming the cache page by page
    ///
    /// Pages that arrive before a failure or cancellation stay cached.
    async fn collect_and_warm(
        &self,
        mut pager: Pager<'_, C>,
    ) -> Result<Vec<ListItem>, CacheError> {
        let mut results = Vec::new();
        loop {
            let generation = self.cache.generation();
            let Some(items) = pager.next_page().await? else {
                break;
            };
            let fetched_at = pager.last_fetched_at().unwrap_or_else(Instant::now);
            self.warm(&items, fetched_at, generation);
            results.extend(items);
        }
        debug!(pages = pager.pages_fetched(), count = results.len(), "Listing complete");
        Ok(results)
    }

    /// Classify `prefix` as missing, empty (marker only) or non-empty
    pub async fn is_directory_empty(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
    ) -> Result<DirectoryState, CacheError> {
        let pager = Pager::new(&self.inner, container, delimiter, prefix, self.config.retry);
        classify_directory(pager).await
    }

    /// Fresh cached entries under a directory prefix
    ///
    /// Stale entries are filtered out one by one; an empty result does not
    /// mean the directory is empty.
    pub fn fresh_entries_under(&self, prefix: &str) -> Vec<Arc<Entry>> {
        if !self.config.enabled {
            return Vec::new();
        }
        self.cache
            .list_under(prefix)
            .into_iter()
            .filter(|entry| entry.is_fresh(self.config.ttl))
            .collect()
    }

    /// Drop cached attributes for `path`
    pub fn invalidate(&self, path: &str) {
        if self.config.enabled {
            self.cache.remove(path);
        }
    }

    /// Cache the files of one listing page
    ///
    /// `generation` is read before the page was requested; if anything was
    /// invalidated since, the whole page is skipped.
    fn warm(&self, items: &[ListItem], fetched_at: Instant, generation: u64) {
        if !self.config.enabled {
            return;
        }
        let mut warmed = 0usize;
        for item in items.iter().filter(|item| !item.is_directory) {
            let entry = Entry::from_list_item(item, fetched_at);
            if !self.cache.put_if_generation(&item.name, entry, generation) {
                debug!("Listing page overlapped an invalidation, not cached");
                return;
            }
            warmed += 1;
        }
        debug!(count = warmed, "Warmed attribute cache from listing");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.cache.len(),
            "Cache metrics"
        );
    }
}

/// Write `data` to a temp file next to `dest`, then rename it into place
fn write_atomically(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl<C: BlobClient> BlobClient for CachedBlobClient<C> {
    async fn get_properties(
        &self,
        container: &str,
        path: &str,
    ) -> Result<BlobProperties, RemoteError> {
        CachedBlobClient::get_properties(self, container, path).await
    }

    async fn exists(&self, container: &str, path: &str) -> Result<bool, RemoteError> {
        CachedBlobClient::exists(self, container, path).await
    }

    /// Single remote page; its files warm the cache
    async fn list_page(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        let generation = self.cache.generation();
        let page = self
            .inner
            .list_page(container, delimiter, prefix, continuation)
            .await?;
        self.warm(&page.items, Instant::now(), generation);
        Ok(page)
    }

    async fn upload(
        &self,
        container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError> {
        CachedBlobClient::upload(self, container, path, data, metadata).await
    }

    async fn download(
        &self,
        container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError> {
        CachedBlobClient::download(self, container, path, range).await
    }

    async fn delete(&self, container: &str, path: &str) -> Result<(), RemoteError> {
        CachedBlobClient::delete(self, container, path).await
    }
}
