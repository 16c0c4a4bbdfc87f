//! Attribute caching and resilient listing for blob storage
//!
//! [`CachedBlobClient`] sits in front of any [`BlobClient`] and keeps
//! per-object properties in a TTL cache, invalidating on writes. Listings
//! go through [`listing::Pager`], which follows continuation tokens, drops
//! items repeated across page boundaries and gives up after a run of
//! consecutive failures.

pub mod b2;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{AttrCache, Entry};
pub use cached_client::CachedBlobClient;
pub use client::BlobClient;
pub use config::{Backoff, CacheConfig, ConfigError, RetryPolicy};
pub use error::{CacheError, RemoteError};
pub use types::{BlobProperties, DirectoryState, ListItem, ListPage};
