//! Document store for [`NewsRecord`]s.
//!
//! The pipeline only needs insert-if-absent keyed by fingerprint plus a few
//! reads for the export. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local, used by tests and `--store :memory:`
//! - [`JsonFileStore`]: append-only JSON lines file that survives restarts
//!
//! Fingerprint uniqueness is enforced by the backend inside one critical
//! section, so concurrent writers can never store the same record twice.

use crate::error::StoreError;
use crate::models::NewsRecord;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Store location meaning "keep everything in memory".
pub const MEMORY_LOCATION: &str = ":memory:";

/// Fingerprint-keyed record store.
///
/// The pipeline writes through [`NewsStore::insert_if_absent`] one record at
/// a time so each candidate gets its own outcome. [`NewsStore::insert_many`]
/// and [`NewsStore::by_category`] complete the contract for batch loaders and
/// read-side consumers; backends may override the defaults.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Cheap health check, used at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// Store `record` unless one with the same fingerprint exists.
    /// Returns whether it was written.
    async fn insert_if_absent(&self, record: &NewsRecord) -> Result<bool, StoreError>;

    /// Batch form of [`NewsStore::insert_if_absent`]. Returns how many
    /// records were written.
    async fn insert_many(&self, records: &[NewsRecord]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for record in records {
            if self.insert_if_absent(record).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Every record in insertion order.
    async fn all(&self) -> Result<Vec<NewsRecord>, StoreError>;

    async fn by_category(&self, category: &str) -> Result<Vec<NewsRecord>, StoreError> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.category == category)
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError>;
}

/// Open the store named by `location`: [`MEMORY_LOCATION`] or a file path.
///
/// Fails when the backing file cannot be opened or read; callers treat this
/// as fatal at startup.
pub async fn open(location: &str) -> Result<Arc<dyn NewsStore>, StoreError> {
    let store: Arc<dyn NewsStore> = if location == MEMORY_LOCATION {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::open(Path::new(location)).await?)
    };
    store.ping().await?;
    info!(location, records = store.len().await?, "Store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory() {
        let store = open(MEMORY_LOCATION).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.jsonl");
        let store = open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_unreachable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the records file.
        assert!(open(dir.path().to_str().unwrap()).await.is_err());
    }
}
