use async_trait::async_trait;

use crate::{CoreError, ListingSort, RawComment, RawItem};

/// Read-only access to a remote content API.
///
/// The collector only talks to this trait, so tests can hand it a fake
/// source instead of a live HTTP client.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List up to `limit` items of `community` in the given order.
    async fn list(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
    ) -> Result<Vec<RawItem>, CoreError>;

    /// Flattened comments of one item, breadth first.
    async fn comments(&self, item_id: &str) -> Result<Vec<RawComment>, CoreError>;
}
