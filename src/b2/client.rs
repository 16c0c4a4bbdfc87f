//! Backblaze B2 API Client
//!
//! Remote backend for the caching layer. One client serves every bucket of
//! the authorized account; bucket names are the container names.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use super::types::{FileInfo, ListFilesResponse};
use crate::client::BlobClient;
use crate::error::RemoteError;
use crate::types::{BlobProperties, ListItem, ListPage};

/// B2 API base URL for authorization (v3 for nested apiInfo structure)
const B2_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Files requested per b2_list_file_names call
const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Prefix of custom metadata headers
const INFO_HEADER_PREFIX: &str = "x-bz-info-";

/// Auth state that can be refreshed (interior mutability)
struct AuthState {
    account_id: String,
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// B2 API client for making authenticated requests
#[derive(Clone)]
pub struct B2Client {
    http_client: Client,
    auth_state: Arc<RwLock<AuthState>>,
    /// Stored credentials for re-authorization
    key_id: String,
    key: String,
    /// Bucket name to bucket id, filled on first use
    bucket_ids: Arc<RwLock<HashMap<String, String>>>,
    page_size: u32,
}

/// Response from b2_authorize_account API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    authorization_token: String,
    api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInfo {
    storage_api: StorageApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageApiInfo {
    api_url: String,
    download_url: String,
}

/// Response from b2_list_buckets API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

/// Request body for b2_list_file_names API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest {
    bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
    max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<String>,
}

/// Upload URL from B2 (valid for 24 hours)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrl {
    upload_url: String,
    authorization_token: String,
}

impl B2Client {
    /// Authorize with B2 using an application key
    pub async fn authorize(key_id: &str, key: &str) -> Result<Self, RemoteError> {
        info!("Authorizing with B2 API...");

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let auth = Self::request_auth(&http_client, key_id, key).await?;
        debug!(
            api_url = %auth.api_info.storage_api.api_url,
            download_url = %auth.api_info.storage_api.download_url,
            "B2 authorization successful"
        );

        Ok(Self {
            http_client,
            auth_state: Arc::new(RwLock::new(AuthState::from(auth))),
            key_id: key_id.to_string(),
            key: key.to_string(),
            bucket_ids: Arc::new(RwLock::new(HashMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the number of files requested per listing page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn request_auth(
        http_client: &Client,
        key_id: &str,
        key: &str,
    ) -> Result<AuthorizeAccountResponse, RemoteError> {
        let credentials = format!("{}:{}", key_id, key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        let response = http_client
            .get(B2_AUTH_URL)
            .header("Authorization", format!("Basic {}", encoded))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// Refresh the auth token by re-authorizing with B2
    pub async fn refresh_auth(&self) -> Result<(), RemoteError> {
        info!("Refreshing B2 auth token...");
        let auth = Self::request_auth(&self.http_client, &self.key_id, &self.key).await?;
        *self
            .auth_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = AuthState::from(auth);
        info!("B2 auth token refreshed successfully");
        Ok(())
    }

    fn auth<T>(&self, f: impl FnOnce(&AuthState) -> T) -> T {
        f(&self.auth_state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn auth_token(&self) -> String {
        self.auth(|state| state.auth_token.clone())
    }

    fn api_endpoint(&self, operation: &str) -> String {
        self.auth(|state| format!("{}/b2api/v2/{}", state.api_url, operation))
    }

    fn download_endpoint(&self, bucket: &str, path: &str) -> String {
        self.auth(|state| {
            format!(
                "{}/file/{}/{}",
                state.download_url,
                bucket,
                encode_file_path(path)
            )
        })
    }

    /// Run `f`, re-authorizing once if the token has expired
    async fn with_auth_retry<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match f().await {
            Err(RemoteError::AuthExpired) => {
                warn!(operation = operation, "Auth expired, refreshing token...");
                self.refresh_auth().await?;
                f().await
            }
            result => result,
        }
    }

    /// Turn a non-success response into a RemoteError
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status.as_u16(), &body))
    }

    /// Look up (and remember) the id of a bucket
    async fn bucket_id(&self, bucket_name: &str) -> Result<String, RemoteError> {
        let known = self
            .bucket_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket_name)
            .cloned();
        if let Some(id) = known {
            return Ok(id);
        }

        let response: ListBucketsResponse = self
            .with_auth_retry("list_buckets", || async {
                let body = serde_json::json!({
                    "accountId": self.auth(|state| state.account_id.clone()),
                    "bucketName": bucket_name,
                });
                let response = self
                    .http_client
                    .post(self.api_endpoint("b2_list_buckets"))
                    .header("Authorization", self.auth_token())
                    .json(&body)
                    .send()
                    .await?;
                Ok(Self::check(response).await?.json().await?)
            })
            .await?;

        let id = response
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket_name)
            .map(|b| b.bucket_id)
            .ok_or_else(|| RemoteError::NotFound(format!("bucket '{}'", bucket_name)))?;

        debug!(bucket_name = bucket_name, bucket_id = %id, "Resolved B2 bucket");
        self.bucket_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket_name.to_string(), id.clone());
        Ok(id)
    }

    /// HEAD request against the download URL of a file
    async fn head(&self, bucket: &str, path: &str) -> Result<HeaderMap, RemoteError> {
        self.with_auth_retry("head", || async {
            let response = self
                .http_client
                .head(self.download_endpoint(bucket, path))
                .header("Authorization", self.auth_token())
                .send()
                .await?;
            Ok(Self::check(response).await?.headers().clone())
        })
        .await
    }

    async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadUrl, RemoteError> {
        let response = self
            .http_client
            .post(self.api_endpoint("b2_get_upload_url"))
            .header("Authorization", self.auth_token())
            .json(&serde_json::json!({ "bucketId": bucket_id }))
            .send()
            .await?;
        let upload_url: UploadUrl = Self::check(response).await?.json().await?;
        debug!(url = %upload_url.upload_url, "Got B2 upload URL");
        Ok(upload_url)
    }
}

impl From<AuthorizeAccountResponse> for AuthState {
    fn from(auth: AuthorizeAccountResponse) -> Self {
        Self {
            account_id: auth.account_id,
            auth_token: auth.authorization_token,
            api_url: auth.api_info.storage_api.api_url,
            download_url: auth.api_info.storage_api.download_url,
        }
    }
}

/// URL-encode each path segment, keeping the separators
fn encode_file_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map download/HEAD response headers onto blob properties
fn properties_from_headers(headers: &HeaderMap) -> BlobProperties {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(INFO_HEADER_PREFIX)?;
            let raw = value.to_str().ok()?;
            let decoded = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            Some((key.to_string(), decoded))
        })
        .collect();

    BlobProperties {
        content_length: text("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        content_type: text("content-type"),
        content_sha1: text("x-bz-content-sha1").filter(|sha| sha != "none"),
        file_id: text("x-bz-file-id"),
        upload_timestamp: text("x-bz-upload-timestamp").and_then(|v| v.parse().ok()),
        metadata,
    }
}

#[async_trait]
impl BlobClient for B2Client {
    async fn get_properties(
        &self,
        container: &str,
        path: &str,
    ) -> Result<BlobProperties, RemoteError> {
        let headers = self.head(container, path).await?;
        Ok(properties_from_headers(&headers))
    }

    async fn exists(&self, container: &str, path: &str) -> Result<bool, RemoteError> {
        match self.head(container, path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_page(
        &self,
        container: &str,
        delimiter: Option<&str>,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        let request = ListFileNamesRequest {
            bucket_id: self.bucket_id(container).await?,
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            delimiter: delimiter.map(String::from),
            max_file_count: self.page_size,
            start_file_name: continuation.map(String::from),
        };

        debug!(prefix = prefix, delimiter = ?delimiter, start = ?continuation, "Listing files from B2");

        let response: ListFilesResponse = self
            .with_auth_retry("list_file_names", || async {
                let response = self
                    .http_client
                    .post(self.api_endpoint("b2_list_file_names"))
                    .header("Authorization", self.auth_token())
                    .json(&request)
                    .send()
                    .await?;
                Ok(Self::check(response).await?.json().await?)
            })
            .await?;

        Ok(ListPage {
            items: response.files.into_iter().map(ListItem::from).collect(),
            next_token: response.next_file_name,
        })
    }

    async fn upload(
        &self,
        container: &str,
        path: &str,
        data: Vec<u8>,
        metadata: &[(String, String)],
    ) -> Result<BlobProperties, RemoteError> {
        let bucket_id = self.bucket_id(container).await?;
        let hash = format!("{:x}", Sha1::digest(&data));

        info!(file = path, size = data.len(), "Uploading file to B2");

        let file: FileInfo = self
            .with_auth_retry("upload", || async {
                let upload_url = self.get_upload_url(&bucket_id).await?;
                let mut request = self
                    .http_client
                    .post(&upload_url.upload_url)
                    .header("Authorization", &upload_url.authorization_token)
                    .header("X-Bz-File-Name", encode_file_path(path))
                    .header("Content-Type", "b2/x-auto")
                    .header("X-Bz-Content-Sha1", &hash);
                for (key, value) in metadata {
                    request = request.header(
                        format!("X-Bz-Info-{}", key),
                        urlencoding::encode(value).into_owned(),
                    );
                }
                let response = request.body(data.clone()).send().await?;
                Ok(Self::check(response).await?.json().await?)
            })
            .await?;

        info!(file = path, file_id = ?file.file_id, "File uploaded to B2");
        Ok(file.properties())
    }

    async fn download(
        &self,
        container: &str,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, RemoteError> {
        debug!(file = path, range = ?range, "Downloading file from B2");

        let bytes = self
            .with_auth_retry("download", || async {
                let mut request = self
                    .http_client
                    .get(self.download_endpoint(container, path))
                    .header("Authorization", self.auth_token());
                if let Some((start, end)) = range {
                    request = request.header("Range", format!("bytes={}-{}", start, end));
                }
                let response = request.send().await?;
                Ok(Self::check(response).await?.bytes().await?)
            })
            .await?;

        debug!(file = path, size = bytes.len(), "Downloaded file from B2");
        Ok(bytes.to_vec())
    }

    /// Permanently delete the current version of a file
    async fn delete(&self, container: &str, path: &str) -> Result<(), RemoteError> {
        let file_id = properties_from_headers(&self.head(container, path).await?)
            .file_id
            .ok_or_else(|| RemoteError::Decode(format!("no file id returned for {}", path)))?;

        info!(file = path, file_id = %file_id, "Deleting file from B2");

        self.with_auth_retry("delete", || async {
            let response = self
                .http_client
                .post(self.api_endpoint("b2_delete_file_version"))
                .header("Authorization", self.auth_token())
                .json(&serde_json::json!({
                    "fileName": path,
                    "fileId": file_id,
                }))
                .send()
                .await?;
            Self::check(response).await?;
            Ok(())
        })
        .await
    }
}
