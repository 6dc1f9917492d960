//! Session-scoped cache over a [`Store`].
//!
//! A [`SessionCache`] gives one session a single, consistent in-memory view
//! over the hierarchical key namespace, progressively materialised from the
//! (slow) backing store. Reads never perform I/O; writes are buffered until
//! [`SessionCache::flush`].
//!
//! The caching policy is *first read wins for the session*: once a key has
//! been resolved into the content cache it is never re-fetched, even if the
//! backing store changes underneath.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::store::{Entry, Store, StoreError};

/// Errors from cache operations, labelled with the operation that touched
/// the store. The underlying [`StoreError`] stays reachable through
/// `source()` for sentinel matching.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("bootstrap index: {source}")]
    #[diagnostic(code(loomflow::cache::bootstrap))]
    Bootstrap {
        #[source]
        source: StoreError,
    },

    #[error("resolve: {source}")]
    #[diagnostic(code(loomflow::cache::resolve))]
    Resolve {
        #[source]
        source: StoreError,
    },

    #[error("flush save: {source}")]
    #[diagnostic(code(loomflow::cache::flush_save))]
    FlushSave {
        #[source]
        source: StoreError,
    },

    #[error("flush delete: {source}")]
    #[diagnostic(code(loomflow::cache::flush_delete))]
    FlushDelete {
        #[source]
        source: StoreError,
    },
}

impl CacheError {
    /// The underlying store error.
    pub fn store_error(&self) -> &StoreError {
        match self {
            CacheError::Bootstrap { source }
            | CacheError::Resolve { source }
            | CacheError::FlushSave { source }
            | CacheError::FlushDelete { source } => source,
        }
    }
}

#[derive(Default)]
struct CacheInner {
    /// Keys known to exist, cached or not.
    index: FxHashSet<String>,
    /// Materialised values.
    content: FxHashMap<String, Vec<u8>>,
    /// Keys with buffered writes awaiting flush.
    dirty: FxHashSet<String>,
    /// Keys deleted in this session awaiting flush.
    removed: FxHashSet<String>,
}

/// In-memory session view over a [`Store`].
///
/// All operations are safe for concurrent callers: reads take shared access,
/// mutations exclusive access, and store I/O runs outside the lock against a
/// snapshot of the relevant key sets. Byte values are defensively copied on
/// both sides of the boundary, so callers may freely reuse or mutate their
/// buffers.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use loomflow::cache::SessionCache;
/// use loomflow::store::{Entry, MemoryStore};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), loomflow::cache::CacheError> {
/// let store = Arc::new(MemoryStore::with_entries([
///     Entry::new("memory/greeting", b"hello".to_vec()),
///     Entry::new("skills/echo", b"...".to_vec()),
/// ]));
///
/// let token = CancellationToken::new();
/// let cache = SessionCache::new(store);
/// cache.bootstrap(&token, &["memory/".to_string()]).await?;
///
/// // memory/* was eagerly loaded; skills/* is indexed but uncached.
/// assert_eq!(cache.get("memory/greeting"), Some(b"hello".to_vec()));
/// assert!(cache.has("skills/echo"));
/// assert_eq!(cache.get("skills/echo"), None);
///
/// cache.set("memory/reply", b"world");
/// cache.flush(&token).await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionCache {
    store: Arc<dyn Store>,
    inner: RwLock<CacheInner>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Populate the index from the store, then eagerly load every key
    /// matching any of `prefixes` into the content cache. With no prefixes,
    /// only the index is populated. Store I/O observes `token`.
    pub async fn bootstrap(
        &self,
        token: &CancellationToken,
        prefixes: &[String],
    ) -> Result<(), CacheError> {
        let keys = self
            .store
            .list(token)
            .await
            .map_err(|source| CacheError::Bootstrap { source })?;

        let mut eager = Vec::new();
        {
            let mut inner = self.inner.write();
            for key in keys {
                if !prefixes.is_empty() && prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                    eager.push(key.clone());
                }
                inner.index.insert(key);
            }
        }

        if eager.is_empty() {
            return Ok(());
        }
        self.resolve(token, &eager).await
    }

    /// Load the subset of `keys` not yet in the content cache. Loaded
    /// entries enter both the content cache and the index. Already-cached
    /// keys are never re-fetched.
    pub async fn resolve(
        &self,
        token: &CancellationToken,
        keys: &[String],
    ) -> Result<(), CacheError> {
        let missing: Vec<String> = {
            let inner = self.inner.read();
            keys.iter()
                .filter(|k| !inner.content.contains_key(k.as_str()))
                .cloned()
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }

        let entries = self
            .store
            .load(token, &missing)
            .await
            .map_err(|source| CacheError::Resolve { source })?;

        let mut inner = self.inner.write();
        for entry in entries {
            inner.index.insert(entry.key.clone());
            inner.content.insert(entry.key, entry.value);
        }
        Ok(())
    }

    /// Cached bytes for `key`, or `None` when the key is not materialised.
    /// The returned buffer is an independent copy.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        inner.content.get(key).cloned()
    }

    /// Buffer a write. The key becomes indexed, dirty, and not-removed; the
    /// value is copied, so later mutation of `value` cannot corrupt the
    /// cache.
    pub fn set(&self, key: impl Into<String>, value: &[u8]) {
        let key = key.into();
        let mut inner = self.inner.write();
        inner.index.insert(key.clone());
        inner.removed.remove(&key);
        inner.dirty.insert(key.clone());
        inner.content.insert(key, value.to_vec());
    }

    /// Buffer a deletion: drops the key from content, index, and dirty, and
    /// marks it removed for the next flush.
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.write();
        inner.content.remove(key);
        inner.index.remove(key);
        inner.dirty.remove(key);
        inner.removed.insert(key.to_string());
    }

    /// Index membership, not content presence.
    pub fn has(&self, key: &str) -> bool {
        self.inner.read().index.contains(key)
    }

    /// All indexed keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut keys: Vec<String> = inner.index.iter().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// All currently-cached entries whose key starts with `prefix`, sorted
    /// by key. Values are independent copies.
    pub fn entries(&self, prefix: &str) -> Vec<Entry> {
        let inner = self.inner.read();
        let mut entries: Vec<Entry> = inner
            .content
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Entry::new(k.clone(), v.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Write back buffered mutations: save all dirty entries, then delete
    /// all removed keys. Dirty and removed are cleared only when both phases
    /// succeed; on failure they are left intact for retry.
    pub async fn flush(&self, token: &CancellationToken) -> Result<(), CacheError> {
        let (to_save, to_delete) = {
            let inner = self.inner.read();
            let to_save: Vec<Entry> = inner
                .dirty
                .iter()
                .filter_map(|k| {
                    inner
                        .content
                        .get(k)
                        .map(|v| Entry::new(k.clone(), v.clone()))
                })
                .collect();
            let to_delete: Vec<String> = inner.removed.iter().cloned().collect();
            (to_save, to_delete)
        };

        if !to_save.is_empty() {
            self.store
                .save(token, &to_save)
                .await
                .map_err(|source| CacheError::FlushSave { source })?;
        }
        if !to_delete.is_empty() {
            self.store
                .delete(token, &to_delete)
                .await
                .map_err(|source| CacheError::FlushDelete { source })?;
        }

        let mut inner = self.inner.write();
        for entry in &to_save {
            inner.dirty.remove(&entry.key);
        }
        for key in &to_delete {
            inner.removed.remove(key);
        }
        Ok(())
    }
}
