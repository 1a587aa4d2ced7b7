//! Storage port consumed by resource nodes.
//!
//! A node owns one `Arc<dyn Storage<T>>`. The default is [`MemoryStorage`];
//! anything implementing the four operations below can replace it.
//!
//! # Soft delete
//!
//! For items exposing [`EndDated`](crate::EndDated), implementations are expected to
//! follow the two-step delete:
//!
//! 1. the first `delete` sets the end date and keeps the item (still readable by `get`,
//!    hidden from `search` unless [`Filter::include_ended`] is set);
//! 2. a `delete` on an already end-dated item removes it;
//! 3. any further `delete` answers [`StorageError::NotFound`].

mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use crate::types::Resource;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Result of a storage operation.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Get/search/set/delete by key.
#[async_trait]
pub trait Storage<T: Resource>: Send + Sync {
    /// Fetch one item by identity.
    async fn get(&self, id: &str) -> StorageResult<T>;

    /// Every item whose recorded parent equals `parent_id` (all items when `None`)
    /// and which passes `filter`.
    async fn search(&self, parent_id: Option<&str>, filter: &Filter<T>) -> StorageResult<Vec<T>>;

    /// Insert or replace an item, keyed by its identity.
    async fn set(&self, item: T) -> StorageResult<()>;

    /// Delete an item by identity.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}

/// Predicate applied by [`Storage::search`].
pub struct Filter<T> {
    /// Return end-dated items too.
    pub include_ended: bool,
    predicate: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

impl<T: Resource> Filter<T> {
    /// Match every live item.
    pub fn all() -> Self {
        Self {
            include_ended: false,
            predicate: None,
        }
    }

    /// Match live items passing `predicate`.
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            include_ended: false,
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Also match end-dated items.
    #[must_use]
    pub fn including_ended(mut self, include: bool) -> Self {
        self.include_ended = include;
        self
    }

    /// Whether `item` passes this filter.
    pub fn matches(&self, item: &T) -> bool {
        if !self.include_ended && item.as_end_dated().is_some_and(|e| e.is_ended()) {
            return false;
        }
        self.predicate.as_ref().map_or(true, |p| p(item))
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            include_ended: self.include_ended,
            predicate: self.predicate.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("include_ended", &self.include_ended)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
