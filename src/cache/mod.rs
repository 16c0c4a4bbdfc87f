//! Attribute caching layer
//!
//! Path-keyed cache of object metadata with reader-side TTL checks.

pub mod entry;
pub mod store;

pub use entry::Entry;
pub use store::AttrCache;
