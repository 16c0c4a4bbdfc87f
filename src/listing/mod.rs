//! Remote listing: continuation-token paging with bounded retry, and the
//! directory-empty probe built on it.

pub mod pager;
pub mod probe;

pub use pager::{exhausted_cause, list_all, Pager};
pub use probe::classify_directory;
