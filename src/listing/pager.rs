//! Paginated listing with retry
//!
//! Drives a remote `list_page` call across continuation tokens. Each page
//! is retried in place until it succeeds or the consecutive-failure ceiling
//! is reached. The first item of a page is dropped when it repeats the last
//! item of the page before it.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::BlobClient;
use crate::config::RetryPolicy;
use crate::error::{CacheError, RemoteError};
use crate::types::{ListItem, ListPage};

/// Lazy sequence of deduplicated listing pages
pub struct Pager<'a, C: BlobClient + ?Sized> {
    client: &'a C,
    container: &'a str,
    delimiter: Option<&'a str>,
    prefix: &'a str,
    policy: RetryPolicy,
    cancel: Option<&'a CancellationToken>,
    /// Token for the next page, None before the first page
    token: Option<String>,
    /// Name of the last item of the previous non-empty page
    prior: Option<String>,
    finished: bool,
    pages: u32,
    /// When the most recent page came back from the remote store
    fetched_at: Option<Instant>,
}

impl<'a, C: BlobClient + ?Sized> Pager<'a, C> {
    pub fn new(
        client: &'a C,
        container: &'a str,
        delimiter: Option<&'a str>,
        prefix: &'a str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            container,
            delimiter,
            prefix,
            policy,
            cancel: None,
            token: None,
            prior: None,
            finished: false,
            pages: 0,
            fetched_at: None,
        }
    }

    /// Stop before the next page fetch (or backoff sleep) once `token` fires
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether the last page has been returned
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of pages fetched successfully so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// When the page last returned by [`Self::next_page`] was fetched
    pub fn last_fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Fetch the next page
    ///
    /// Returns `Ok(None)` once the listing is complete. After an error the
    /// pager still points at the failed page, so calling again retries it.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListItem>>, CacheError> {
        if self.finished {
            return Ok(None);
        }

        let page = self.fetch_with_retry().await?;
        self.fetched_at = Some(Instant::now());
        self.pages += 1;
        self.token = page.next_token.filter(|token| !token.is_empty());
        self.finished = self.token.is_none();

        let mut items = page.items;
        let last = items.last().map(|item| item.name.clone());
        if let (Some(first), Some(prior)) = (items.first(), self.prior.as_deref()) {
            if first.name == prior {
                items.remove(0);
            }
        }
        if last.is_some() {
            self.prior = last;
        }

        debug!(
            container = self.container,
            prefix = self.prefix,
            page = self.pages,
            items = items.len(),
            more = !self.finished,
            "Fetched listing page"
        );
        Ok(Some(items))
    }

    /// Drain every remaining page into one vector, in listing order
    pub async fn collect_all(mut self) -> Result<Vec<ListItem>, CacheError> {
        let mut results = Vec::new();
        while let Some(items) = self.next_page().await? {
            results.extend(items);
        }
        debug!(
            container = self.container,
            prefix = self.prefix,
            pages = self.pages,
            count = results.len(),
            "Listing complete"
        );
        Ok(results)
    }

    async fn fetch_with_retry(&self) -> Result<ListPage, CacheError> {
        let ceiling = self.policy.max_consecutive_failures.max(1);
        let mut failures = 0u32;

        loop {
            self.check_cancelled()?;

            let err = match self
                .client
                .list_page(
                    self.container,
                    self.delimiter,
                    self.prefix,
                    self.token.as_deref(),
                )
                .await
            {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            failures += 1;
            warn!(
                container = self.container,
                prefix = self.prefix,
                attempt = failures,
                max = ceiling,
                error = %err,
                "Listing page failed"
            );
            if failures >= ceiling {
                return Err(CacheError::ExhaustedRetries {
                    attempts: failures,
                    last: err,
                });
            }

            self.pause(failures).await?;
        }
    }

    async fn pause(&self, failures: u32) -> Result<(), CacheError> {
        let Some(backoff) = self.policy.backoff else {
            return Ok(());
        };
        let delay = backoff.delay(failures);
        match self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(CacheError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), CacheError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(CacheError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// List everything under `prefix`, following continuation tokens
pub async fn list_all<C: BlobClient + ?Sized>(
    client: &C,
    container: &str,
    delimiter: Option<&str>,
    prefix: &str,
    policy: RetryPolicy,
) -> Result<Vec<ListItem>, CacheError> {
    Pager::new(client, container, delimiter, prefix, policy)
        .collect_all()
        .await
}

/// Last remote error carried by a retry-exhaustion error
pub fn exhausted_cause(err: &CacheError) -> Option<&RemoteError> {
    match err {
        CacheError::ExhaustedRetries { last, .. } | CacheError::Indeterminate { last, .. } => {
            Some(last)
        }
        _ => None,
    }
}
