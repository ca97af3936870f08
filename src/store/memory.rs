use crate::error::StoreError;
use crate::models::NewsRecord;
use crate::store::NewsStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryInner {
    /// Fingerprint to position in `records`.
    index: HashMap<String, usize>,
    records: Vec<NewsRecord>,
}

impl MemoryInner {
    fn insert_if_absent(&mut self, record: &NewsRecord) -> bool {
        if self.index.contains_key(&record.fingerprint) {
            return false;
        }
        self.index
            .insert(record.fingerprint.clone(), self.records.len());
        self.records.push(record.clone());
        true
    }
}

/// In-process store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.index.contains_key(fingerprint))
    }

    async fn insert_if_absent(&self, record: &NewsRecord) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.insert_if_absent(record))
    }

    async fn insert_many(&self, records: &[NewsRecord]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(records
            .iter()
            .filter(|r| inner.insert_if_absent(r))
            .count())
    }

    async fn all(&self) -> Result<Vec<NewsRecord>, StoreError> {
        Ok(self.inner.read().await.records.clone())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::record;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_if_absent() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent(&record("a", "world")).await.unwrap());
        assert!(!store.insert_if_absent(&record("a", "world")).await.unwrap());
        assert!(store.contains("a").await.unwrap());
        assert!(!store.contains("b").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_many_skips_duplicates_within_batch() {
        let store = MemoryStore::new();
        store.insert_if_absent(&record("a", "world")).await.unwrap();
        let batch = vec![record("a", "world"), record("b", "world"), record("b", "world")];
        assert_eq!(store.insert_many(&batch).await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_by_category_and_order() {
        let store = MemoryStore::new();
        for (fp, cat) in [("1", "world"), ("2", "technology"), ("3", "world")] {
            store.insert_if_absent(&record(fp, cat)).await.unwrap();
        }
        let world: Vec<_> = store
            .by_category("world")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(world, vec!["1", "3"]);
        let all: Vec<_> = store.all().await.unwrap().into_iter().map(|r| r.fingerprint).collect();
        assert_eq!(all, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_concurrent_writers_store_once() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert_if_absent(&record("same", "world")).await.unwrap()
            }));
        }
        let mut written = 0;
        for h in handles {
            if h.await.unwrap() {
                written += 1;
            }
        }
        assert_eq!(written, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
