//! Directory-empty probe
//!
//! Classifies a prefix by paging through it and stopping as soon as the
//! answer is known. A directory counts as empty when the only object under
//! it is its marker (see [`crate::types::ListItem::is_directory_marker`]).

use tracing::debug;

use super::pager::Pager;
use crate::client::BlobClient;
use crate::error::CacheError;
use crate::types::DirectoryState;

/// Classify the prefix behind `pager`
///
/// Retry exhaustion is reported as [`CacheError::Indeterminate`], never as
/// [`DirectoryState::NotExist`].
///
/// Pages arrive boundary-deduplicated, so a marker repeated as the first
/// item of the next page is seen once and still classifies as `Empty`.
pub async fn classify_directory<C: BlobClient + ?Sized>(
    mut pager: Pager<'_, C>,
) -> Result<DirectoryState, CacheError> {
    let mut marker_found = false;

    loop {
        let items = match pager.next_page().await {
            Ok(Some(items)) => items,
            Ok(None) => break,
            Err(CacheError::ExhaustedRetries { attempts, last }) => {
                return Err(CacheError::Indeterminate { attempts, last });
            }
            Err(err) => return Err(err),
        };

        match items.as_slice() {
            [] => {}
            [only] if !marker_found && only.is_directory_marker() => {
                marker_found = true;
            }
            _ => {
                debug!(pages = pager.pages_fetched(), "Directory is not empty");
                return Ok(DirectoryState::NotEmpty);
            }
        }
    }

    Ok(if marker_found {
        DirectoryState::Empty
    } else {
        DirectoryState::NotExist
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::testing::{MockBlobClient, Op};
    use crate::types::{BlobProperties, ListItem};

    fn file(name: &str) -> ListItem {
        ListItem::file(name, BlobProperties::default())
    }

    async fn classify(client: &MockBlobClient) -> Result<DirectoryState, CacheError> {
        classify_directory(Pager::new(
            client,
            "c",
            Some("/"),
            "photos/",
            RetryPolicy::default(),
        ))
        .await
    }

    #[tokio::test]
    async fn test_nothing_under_prefix() {
        let client = MockBlobClient::new();
        client.script_pages(vec![vec![]]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::NotExist);
    }

    #[tokio::test]
    async fn test_marker_only() {
        let client = MockBlobClient::new();
        client.script_pages(vec![vec![file("photos/.directory")]]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::Empty);
    }

    #[tokio::test]
    async fn test_marker_then_other_object() {
        let client = MockBlobClient::new();
        client.script_pages(vec![
            vec![file("photos/.directory")],
            vec![file("photos/zebra.jpg")],
        ]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::NotEmpty);
    }

    #[tokio::test]
    async fn test_other_object_then_marker() {
        let client = MockBlobClient::new();
        client.script_pages(vec![
            vec![file("photos/alice.jpg")],
            vec![file("photos/.directory")],
        ]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::NotEmpty);
        // Decided on the first page
        assert_eq!(client.calls(Op::ListPage), 1);
    }

    #[tokio::test]
    async fn test_two_items_stop_paging() {
        let client = MockBlobClient::new();
        client.script_pages(vec![
            vec![file("photos/a.jpg"), file("photos/b.jpg")],
            vec![file("photos/c.jpg")],
            vec![file("photos/d.jpg")],
        ]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::NotEmpty);
        assert_eq!(client.calls(Op::ListPage), 1);
    }

    #[tokio::test]
    async fn test_subdirectory_is_not_a_marker() {
        let client = MockBlobClient::new();
        client.script_pages(vec![vec![ListItem::directory("photos/.directory")]]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::NotEmpty);
    }

    #[tokio::test]
    async fn test_empty_pages_between_marker() {
        let client = MockBlobClient::new();
        client.script_pages(vec![vec![], vec![file("photos/.directory")], vec![]]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::Empty);
        assert_eq!(client.calls(Op::ListPage), 3);
    }

    #[tokio::test]
    async fn test_marker_repeated_at_page_boundary() {
        let client = MockBlobClient::new();
        client.script_pages(vec![
            vec![file("photos/.directory")],
            vec![file("photos/.directory")],
        ]);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::Empty);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_indeterminate() {
        let client = MockBlobClient::new();
        client.fail_all_lists(true);

        let err = classify(&client).await.unwrap_err();
        assert!(matches!(err, CacheError::Indeterminate { attempts: 20, .. }));
        assert_eq!(client.calls(Op::ListPage), 20);
    }

    #[tokio::test]
    async fn test_recovers_before_ceiling() {
        let client = MockBlobClient::new();
        client.script_pages(vec![vec![file("photos/.directory")]]);
        client.fail_next_lists(19);
        assert_eq!(classify(&client).await.unwrap(), DirectoryState::Empty);
    }
}
