//! B2 API wire types
//!
//! Deserialization of `b2_list_file_names` responses and their mapping onto
//! the backend-neutral listing types.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

use crate::types::{BlobProperties, ListItem};

/// Deserialize a number that might be encoded as a string or null.
/// B2 API sometimes returns numeric fields as strings (e.g. "1536964279000")
/// and may return null for folder/hide entries.
fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct FlexibleU64Visitor;

    impl<'de> de::Visitor<'de> for FlexibleU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a u64, a string containing a u64, or null")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| de::Error::custom("negative value for u64"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.parse::<u64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(FlexibleU64Visitor)
}

/// One file version or virtual folder from `b2_list_file_names`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_name: String,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub content_length: u64,
    #[serde(deserialize_with = "deserialize_flexible_u64")]
    pub upload_timestamp: u64,
    /// "upload", "folder", "hide" or "start"
    pub action: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_sha1: Option<String>,
    /// Custom `X-Bz-Info-*` metadata
    #[serde(default)]
    pub file_info: BTreeMap<String, String>,
}

/// Response from b2_list_file_names API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    pub files: Vec<FileInfo>,
    /// First file name of the next page, None on the last page
    pub next_file_name: Option<String>,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.action == "folder"
    }

    pub fn properties(&self) -> BlobProperties {
        BlobProperties {
            content_length: self.content_length,
            content_type: self.content_type.clone(),
            // Large files report "none" here
            content_sha1: self
                .content_sha1
                .clone()
                .filter(|sha| sha != "none"),
            file_id: self.file_id.clone(),
            upload_timestamp: (self.upload_timestamp > 0).then_some(self.upload_timestamp),
            metadata: self.file_info.clone(),
        }
    }
}

impl From<FileInfo> for ListItem {
    fn from(file: FileInfo) -> Self {
        if file.is_directory() {
            ListItem::directory(file.file_name)
        } else {
            let properties = file.properties();
            ListItem::file(file.file_name, properties)
        }
    }
}
