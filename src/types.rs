//! Blob metadata and listing types shared by the cache and remote backends

use serde::Serialize;
use std::collections::BTreeMap;

/// Name suffix of the reserved object that stands in for an empty directory
pub const DIRECTORY_MARKER_SUFFIX: &str = ".directory";

/// Metadata of one remote object
///
/// The cache never interprets these fields; they are passed through as
/// returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlobProperties {
    /// Size in bytes
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_sha1: Option<String>,
    /// Backend-specific object version id
    pub file_id: Option<String>,
    /// Upload timestamp in milliseconds since epoch
    pub upload_timestamp: Option<u64>,
    /// Custom key/value metadata
    pub metadata: BTreeMap<String, String>,
}

/// One object or virtual directory returned by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    /// Full object path within the container
    pub name: String,
    pub is_directory: bool,
    pub properties: BlobProperties,
}

impl ListItem {
    pub fn file(name: impl Into<String>, properties: BlobProperties) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            properties,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            properties: BlobProperties::default(),
        }
    }

    /// Whether this item is the reserved marker object of a directory
    pub fn is_directory_marker(&self) -> bool {
        !self.is_directory
            && self.name.len() > DIRECTORY_MARKER_SUFFIX.len()
            && self.name.ends_with(DIRECTORY_MARKER_SUFFIX)
    }
}

/// One page of a remote listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    /// Cursor for the following page, None when this was the last page
    pub next_token: Option<String>,
}

/// Result of the directory-empty probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryState {
    /// Nothing exists under the prefix
    NotExist,
    /// Only the directory marker exists under the prefix
    Empty,
    NotEmpty,
}
