//! Key-value store contract backing the session cache.
//!
//! Keys are forward-slash-separated hierarchical paths (`memory/notes/1`).
//! Top-level namespace labels reserved by convention: `memory`, `skills`,
//! `agents`. Keys containing a `.`-prefixed path segment are treated as
//! hidden and excluded from listing.
//!
//! The store is stateless between calls; all session-scoped coherence lives
//! in [`SessionCache`](crate::cache::SessionCache).

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;

/// A single keyed byte-string value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Errors from store operations.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// A requested key does not exist.
    #[error("key not found: {key}")]
    #[diagnostic(code(loomflow::store::key_not_found))]
    KeyNotFound { key: String },

    /// A load failed for a reason other than a missing key.
    #[error("load failed: {message}")]
    #[diagnostic(code(loomflow::store::load_failed))]
    LoadFailed { message: String },

    /// A save failed; no entries from the batch should be assumed durable.
    #[error("save failed: {message}")]
    #[diagnostic(code(loomflow::store::save_failed))]
    SaveFailed { message: String },

    /// The operation was abandoned because the caller's token fired.
    #[error("store operation cancelled")]
    #[diagnostic(code(loomflow::store::cancelled))]
    Cancelled,

    /// Backend storage error (database, filesystem, network).
    #[error("store backend error: {message}")]
    #[diagnostic(code(loomflow::store::backend))]
    Backend { message: String },
}

/// Contract for a hierarchical key-value backend.
///
/// Every operation accepts a cancellation token. Backends with real I/O are
/// expected to observe it mid-flight; the in-process backends in this
/// module check it once on entry. Implementations must be safe for
/// concurrent callers.
#[async_trait]
pub trait Store: Send + Sync {
    /// All visible keys, in unspecified order. Keys with a `.`-prefixed
    /// path segment are excluded.
    async fn list(&self, token: &CancellationToken) -> Result<Vec<String>, StoreError>;

    /// Load entries for the given keys.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::KeyNotFound`] for the first missing key;
    /// partial results are never returned.
    async fn load(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<Vec<Entry>, StoreError>;

    /// Durably write entries, creating or overwriting each key.
    async fn save(
        &self,
        token: &CancellationToken,
        entries: &[Entry],
    ) -> Result<(), StoreError>;

    /// Delete keys. Idempotent: missing keys are silently skipped.
    async fn delete(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<(), StoreError>;
}

/// True when any `/`-separated segment of `key` starts with a dot.
pub(crate) fn is_hidden_key(key: &str) -> bool {
    key.split('/').any(|segment| segment.starts_with('.'))
}

fn ensure_live(token: &CancellationToken) -> Result<(), StoreError> {
    if token.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

/// Volatile in-process [`Store`]. Suitable for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }

    /// Seed the store with entries, bypassing the async contract. Test
    /// convenience only.
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let store = Self::new();
        {
            let mut map = store.inner.write();
            for entry in entries {
                map.insert(entry.key, entry.value);
            }
        }
        store
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self, token: &CancellationToken) -> Result<Vec<String>, StoreError> {
        ensure_live(token)?;
        let map = self.inner.read();
        Ok(map
            .keys()
            .filter(|k| !is_hidden_key(k))
            .cloned()
            .collect())
    }

    async fn load(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<Vec<Entry>, StoreError> {
        ensure_live(token)?;
        let map = self.inner.read();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match map.get(key) {
                Some(value) => entries.push(Entry::new(key.clone(), value.clone())),
                None => {
                    return Err(StoreError::KeyNotFound { key: key.clone() });
                }
            }
        }
        Ok(entries)
    }

    async fn save(
        &self,
        token: &CancellationToken,
        entries: &[Entry],
    ) -> Result<(), StoreError> {
        ensure_live(token)?;
        let mut map = self.inner.write();
        for entry in entries {
            map.insert(entry.key.clone(), entry.value.clone());
        }
        Ok(())
    }

    async fn delete(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<(), StoreError> {
        ensure_live(token)?;
        let mut map = self.inner.write();
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

/// Store that holds nothing: empty listings, not-found loads, no-op writes.
///
/// Returned by [`open_store`] when the configured path is empty, which is
/// the "store disabled" setting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    async fn list(&self, token: &CancellationToken) -> Result<Vec<String>, StoreError> {
        ensure_live(token)?;
        Ok(Vec::new())
    }

    async fn load(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<Vec<Entry>, StoreError> {
        ensure_live(token)?;
        match keys.first() {
            Some(key) => Err(StoreError::KeyNotFound { key: key.clone() }),
            None => Ok(Vec::new()),
        }
    }

    async fn save(
        &self,
        token: &CancellationToken,
        _entries: &[Entry],
    ) -> Result<(), StoreError> {
        ensure_live(token)
    }

    async fn delete(
        &self,
        token: &CancellationToken,
        _keys: &[String],
    ) -> Result<(), StoreError> {
        ensure_live(token)
    }
}

/// Open a store from configuration.
///
/// An empty `path` disables the store and yields a [`NullStore`]; any other
/// locator yields an in-process [`MemoryStore`] (the locator is opaque to
/// the memory backend). Durable backends implement [`Store`] directly and
/// bypass this factory.
pub fn open_store(config: &StoreConfig) -> Arc<dyn Store> {
    if config.path.is_empty() {
        Arc::new(NullStore)
    } else {
        Arc::new(MemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_keys_have_dot_segments() {
        assert!(is_hidden_key(".git/config"));
        assert!(is_hidden_key("memory/.cache/x"));
        assert!(!is_hidden_key("memory/notes/today"));
        assert!(!is_hidden_key("skills/read.me"));
    }

    #[tokio::test]
    async fn memory_store_list_skips_hidden() {
        let token = CancellationToken::new();
        let store = MemoryStore::with_entries([
            Entry::new("memory/a", b"1".to_vec()),
            Entry::new("memory/.hidden/b", b"2".to_vec()),
        ]);
        let keys = store.list(&token).await.unwrap();
        assert_eq!(keys, vec!["memory/a".to_string()]);
    }

    #[tokio::test]
    async fn load_fails_on_first_missing_key() {
        let token = CancellationToken::new();
        let store = MemoryStore::with_entries([Entry::new("a", b"1".to_vec())]);
        let err = store
            .load(&token, &["a".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound { key } if key == "missing"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let token = CancellationToken::new();
        let store = MemoryStore::new();
        store.delete(&token, &["ghost".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_token_aborts_operations() {
        let token = CancellationToken::new();
        token.cancel();
        let store = MemoryStore::with_entries([Entry::new("a", b"1".to_vec())]);
        assert!(matches!(
            store.list(&token).await,
            Err(StoreError::Cancelled)
        ));
        assert!(matches!(
            store.load(&token, &["a".to_string()]).await,
            Err(StoreError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn null_store_is_inert() {
        let token = CancellationToken::new();
        let store = open_store(&StoreConfig::default());
        assert!(store.list(&token).await.unwrap().is_empty());
        store
            .save(&token, &[Entry::new("k", b"v".to_vec())])
            .await
            .unwrap();
        assert!(matches!(
            store.load(&token, &["k".to_string()]).await,
            Err(StoreError::KeyNotFound { .. })
        ));
    }
}
