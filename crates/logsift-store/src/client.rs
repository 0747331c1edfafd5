use std::sync::Arc;

use async_trait::async_trait;

use logsift_types::{FetchResponse, ListingEntry, StoreError};

/// Remote object store as seen by the log processing core
///
/// `fetch` reports non-2xx outcomes through `FetchResponse::status` rather than
/// `Err`; `Err` is reserved for the call itself failing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start reading one object
    async fn fetch(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<FetchResponse, StoreError>;

    /// List a container in name order, bounded by `marker` (inclusive) and
    /// `end_marker` (exclusive)
    async fn list(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        end_marker: Option<&str>,
    ) -> Result<Vec<ListingEntry>, StoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn fetch(
        &self,
        account: &str,
        container: &str,
        object: &str,
    ) -> Result<FetchResponse, StoreError> {
        (**self).fetch(account, container, object).await
    }

    async fn list(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        end_marker: Option<&str>,
    ) -> Result<Vec<ListingEntry>, StoreError> {
        (**self).list(account, container, marker, end_marker).await
    }
}

/// Whether `name` falls inside the `[marker, end_marker)` listing range
pub(crate) fn in_marker_range(name: &str, marker: Option<&str>, end_marker: Option<&str>) -> bool {
    if let Some(marker) = marker {
        if name < marker {
            return false;
        }
    }
    if let Some(end) = end_marker {
        if name >= end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_range_bounds() {
        assert!(in_marker_range("2020/01/01/00/a", Some("2020/01/01/00"), None));
        assert!(!in_marker_range("2019/12/31/23/a", Some("2020/01/01/00"), None));
        assert!(in_marker_range("2020/01/01/05/a", None, Some("2020/01/01/06")));
        assert!(!in_marker_range("2020/01/01/06", None, Some("2020/01/01/06")));
        assert!(in_marker_range("anything", None, None));
    }

    #[test]
    fn test_marker_range_inverted_is_empty() {
        assert!(!in_marker_range("m", Some("z"), Some("a")));
    }
}
