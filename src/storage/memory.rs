//! Default in-memory storage.
//!
//! Items live in a `HashMap` guarded by a `parking_lot::RwLock`, so concurrent
//! handlers may read in parallel while writers are serialized. Searches return
//! items in the order they were first stored.

use super::{Filter, Storage, StorageResult};
use crate::error::StorageError;
use crate::types::Resource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

struct Entry<T> {
    seq: u64,
    item: T,
}

struct Inner<T> {
    items: HashMap<String, Entry<T>>,
    next_seq: u64,
}

/// Thread-safe in-memory [`Storage`].
///
/// Cloning yields another handle to the same items.
///
/// # Examples
///
/// ```ignore
/// use canopy_axum_http::storage::{MemoryStorage, Storage};
///
/// let store = MemoryStorage::<Album>::new();
/// store.set(album).await?;
/// let found = store.get(&id).await?;
/// ```
pub struct MemoryStorage<T> {
    inner: Arc<RwLock<Inner<T>>>,
}

impl<T: Resource> MemoryStorage<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                items: HashMap::new(),
                next_seq: 0,
            })),
        }
    }

    /// Number of stored items, end-dated ones included.
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }
}

#[async_trait]
impl<T: Resource> Storage<T> for MemoryStorage<T> {
    async fn get(&self, id: &str) -> StorageResult<T> {
        let inner = self.inner.read();
        inner
            .items
            .get(id)
            .map(|entry| entry.item.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn search(&self, parent_id: Option<&str>, filter: &Filter<T>) -> StorageResult<Vec<T>> {
        let inner = self.inner.read();
        let mut found: Vec<&Entry<T>> = inner
            .items
            .values()
            .filter(|entry| match parent_id {
                Some(parent) => entry.item.parent_id() == Some(parent),
                None => true,
            })
            .filter(|entry| filter.matches(&entry.item))
            .collect();
        found.sort_by_key(|entry| entry.seq);
        Ok(found.into_iter().map(|entry| entry.item.clone()).collect())
    }

    async fn set(&self, item: T) -> StorageResult<()> {
        if item.id().is_empty() {
            return Err(StorageError::Backend("cannot store an item without id".into()));
        }
        let mut inner = self.inner.write();
        let id = item.id().to_string();
        if let Some(entry) = inner.items.get_mut(&id) {
            entry.item = item;
            return Ok(());
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.items.insert(id, Entry { seq, item });
        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let entry = inner.items.get_mut(id).ok_or(StorageError::NotFound)?;

        if let Some(end_dated) = entry.item.as_end_dated_mut() {
            if !end_dated.is_ended() {
                end_dated.set_end_date(Some(OffsetDateTime::now_utc()));
                tracing::debug!(id, "end-dated resource");
                return Ok(());
            }
        }

        inner.items.remove(id);
        tracing::debug!(id, "removed resource");
        Ok(())
    }
}

impl<T> Clone for MemoryStorage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Resource> Default for MemoryStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EndDated;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Item {
        id: String,
        parent: Option<String>,
        name: String,
    }

    impl Resource for Item {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn parent_id(&self) -> Option<&str> {
            self.parent.as_deref()
        }
        fn set_parent_id(&mut self, parent_id: String) {
            self.parent = Some(parent_id);
        }
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Lease {
        id: String,
        ended: Option<OffsetDateTime>,
    }

    impl EndDated for Lease {
        fn end_date(&self) -> Option<OffsetDateTime> {
            self.ended
        }
        fn set_end_date(&mut self, at: Option<OffsetDateTime>) {
            self.ended = at;
        }
    }

    impl Resource for Lease {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
        fn as_end_dated(&self) -> Option<&dyn EndDated> {
            Some(self)
        }
        fn as_end_dated_mut(&mut self) -> Option<&mut dyn EndDated> {
            Some(self)
        }
    }

    fn item(id: &str, parent: Option<&str>, name: &str) -> Item {
        Item {
            id: id.into(),
            parent: parent.map(String::from),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStorage::<Item>::new();
        assert_eq!(store.get("nope").await.unwrap_err(), StorageError::NotFound);
    }

    #[tokio::test]
    async fn test_set_replaces_in_place() {
        let store = MemoryStorage::new();
        store.set(item("a", None, "first")).await.unwrap();
        store.set(item("b", None, "second")).await.unwrap();
        store.set(item("a", None, "renamed")).await.unwrap();

        let all = store.search(None, &Filter::all()).await.unwrap();
        let names: Vec<_> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["renamed", "second"]);
    }

    #[tokio::test]
    async fn test_search_scopes_by_parent_and_filter() {
        let store = MemoryStorage::new();
        store.set(item("1", Some("p1"), "one")).await.unwrap();
        store.set(item("2", Some("p2"), "two")).await.unwrap();
        store.set(item("3", Some("p1"), "three")).await.unwrap();

        let scoped = store.search(Some("p1"), &Filter::all()).await.unwrap();
        assert_eq!(scoped.len(), 2);

        let filtered = store
            .search(Some("p1"), &Filter::new(|i: &Item| i.name.starts_with('t')))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "3");
    }

    #[tokio::test]
    async fn test_set_without_id_is_rejected() {
        let store = MemoryStorage::new();
        assert!(store.set(item("", None, "x")).await.is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_lifecycle() {
        let store = MemoryStorage::new();
        store
            .set(Lease {
                id: "l1".into(),
                ended: None,
            })
            .await
            .unwrap();

        store.delete("l1").await.unwrap();
        assert!(store.get("l1").await.unwrap().ended.is_some());
        assert!(store.search(None, &Filter::all()).await.unwrap().is_empty());
        let with_ended = store
            .search(None, &Filter::all().including_ended(true))
            .await
            .unwrap();
        assert_eq!(with_ended.len(), 1);

        store.delete("l1").await.unwrap();
        assert_eq!(store.get("l1").await.unwrap_err(), StorageError::NotFound);

        assert_eq!(store.delete("l1").await.unwrap_err(), StorageError::NotFound);
    }

    #[tokio::test]
    async fn test_hard_delete_without_capability() {
        let store = MemoryStorage::new();
        store.set(item("a", None, "x")).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clone_shares_state() {
        let store1 = MemoryStorage::new();
        tokio_test::block_on(store1.set(item("a", None, "x"))).unwrap();
        let store2 = store1.clone();
        assert_eq!(store2.len(), 1);
    }
}
