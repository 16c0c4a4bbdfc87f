//! Remote blob client interface
//!
//! Everything below this seam (authentication, signing, HTTP) belongs to the
//! backend. The caching layer only needs these operations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{BlobProperties, ListPage};

/// Operations a remote object store exposes to the caching layer
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Fetch metadata of one object
    async fn get_properties(&self, container: &str, path: &str)
        -> Result<BlobProperties, RemoteError>;

    /// Check whether an object exists
    async fn exists(&self, container: &str, path: &str) -> Result<bool, RemoteError>;

    /// Fetch one page of a hierarchical listing
    ///
    /// `continuation` is None for the first page. The first item of a page
    /// may repeat the last item of the previous one.
    async fn list_page(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, RemoteError>;

    /// Create or replace an object
    async fn upload(
        &self,
        container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError>;

    /// Read object content, optionally an inclusive byte range
    async fn download(
        &self,
        container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError>;

    async fn delete(&self, container: &str, path: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: BlobClient + ?Sized> BlobClient for Arc<T> {
    async fn get_properties(
        &self,
        container: &str,
        path: &str,
    ) -> Result<BlobProperties, RemoteError> {
        (**self).get_properties(container, path).await
    }

    async fn exists(&self, container: &str, path: &str) -> Result<bool, RemoteError> {
        (**self).exists(container, path).await
    }

    async fn list_page(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        (**self)
            .list_page(container, delimiter, prefix, continuation)
            .await
    }

    async fn upload(
        &self,
        container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError> {
        (**self).upload(container, path, data, metadata).await
    }

    async fn download(
        &self,
        container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError> {
        (**self).download(container, path, range).await
    }

    async fn delete(&self, container: &str, path: &str) -> Result<(), RemoteError> {
        (**self).delete(container, path).await
    }
}
