use crate::error::Result;
use crate::store::Store;
use dbs_api::{MigrationRequest, RequestFilter};
use tracing::info;

/// Reads the request store for queries; authorizes and deletes requests
/// belonging to a caller (C6).
pub struct StatusApi {
    store: Store,
}

impl StatusApi {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn status(&self, filter: &RequestFilter) -> Result<Vec<MigrationRequest>> {
        self.store.list_requests(filter).await
    }

    pub async fn total(&self) -> Result<i64> {
        self.store.total().await
    }

    /// Idempotent: deleting a non-existent row is a no-op, not an error.
    /// Authorization is by `create_by` equality only.
    pub async fn remove(&self, request_id: i64, create_by: &str) -> Result<u64> {
        let removed = self.store.delete_requests(request_id, create_by).await?;
        if removed > 0 {
            info!(request_id, create_by, "migration request removed");
        }
        Ok(removed)
    }
}
