//! Bounded, single-use token storage.

use indexmap::IndexMap;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTokenRecord {
    pub user: String,
    pub session_id: String,
    pub created_at: Instant,
    pub proof_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTokenRecord {
    pub user: String,
    pub session_id: String,
    pub created_at: Instant,
}

/// In-memory token map holding at most `capacity` records.
///
/// When full, the oldest inserted record is dropped to make room. Eviction looks
/// only at insertion order, never at how recently a record was read. Reads are
/// destructive: `take` removes the record it returns.
#[derive(Debug)]
pub struct TokenStore<R> {
    capacity: usize,
    tokens: Mutex<IndexMap<String, R>>,
}

impl<R> TokenStore<R> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tokens: Mutex::new(IndexMap::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }

    /// Insert a record, evicting the oldest ones while the store is full.
    pub async fn add(&self, token: String, record: R) {
        let mut tokens = self.tokens.lock().await;
        while tokens.len() >= self.capacity {
            tokens.shift_remove_index(0);
        }
        tokens.insert(token, record);
    }

    /// Remove and return the record for `token`, if any.
    pub async fn take(&self, token: &str) -> Option<R> {
        // shift_remove keeps the remaining records in insertion order
        self.tokens.lock().await.shift_remove(token)
    }
}
