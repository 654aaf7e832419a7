use crate::error::StoreError;
use crate::models::IndexRecord;
use async_trait::async_trait;

/// A vector collection keyed by stable point ids.
///
/// Upserts overwrite points with the same id, so re-indexing a document is
/// idempotent once its stale tail is pruned.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection when absent and checks its vector size otherwise.
    async fn ensure_collection(&self, vector_size: usize) -> Result<(), StoreError>;

    async fn drop_collection(&self) -> Result<(), StoreError>;

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), StoreError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError>;

    /// Removes points of `document_id` whose chunk index is `keep` or higher.
    async fn prune_document(&self, document_id: &str, keep: u64) -> Result<(), StoreError>;
}
