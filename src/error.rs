//! Error types
//!
//! `RemoteError` is what a single remote call can fail with. `CacheError` is
//! what the caching layer surfaces once its own policies (retry ceiling,
//! cancellation, local I/O) have been applied.

/// Failure of a single remote storage operation
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Authentication expired, token needs refresh")]
    AuthExpired,

    #[error("Rate limited, try again after backoff")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the remote layer itself may retry this request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited
                | RemoteError::Timeout
                | RemoteError::Network(_)
                | RemoteError::Server(_, _)
                | RemoteError::AuthExpired
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// Create a RemoteError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => RemoteError::AuthExpired,
            403 => RemoteError::Forbidden(body.to_string()),
            404 => RemoteError::NotFound(body.to_string()),
            408 => RemoteError::Timeout,
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::Server(status, body.to_string()),
            _ => RemoteError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_connect() {
            RemoteError::Network(err.to_string())
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status.as_u16(), &err.to_string())
        } else {
            RemoteError::Request(err.to_string())
        }
    }
}

/// Errors surfaced by the caching layer
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Listing gave up after {attempts} consecutive failures: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: RemoteError,
    },

    /// Only produced by the directory-empty probe; never means "not found"
    #[error("Directory state indeterminate after {attempts} consecutive failures: {last}")]
    Indeterminate {
        attempts: u32,
        #[source]
        last: RemoteError,
    },

    #[error("Listing cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
