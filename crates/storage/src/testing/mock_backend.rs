//! An in-memory reference implementation of [`KvBackend`].
//!
//! Stands in for the real transactional KV store in tests. It enforces the
//! same per-value and per-transaction byte budgets as a production backend
//! would (`RingConfig::max_value_bytes`/`max_transaction_bytes`) and
//! detects write-write conflicts on keys a transaction actually read via
//! `get`, so the registry's "retry once on commit-conflict" path and the
//! orchestrator's `BACKEND_TRANSIENT`/`CONFLICT` surfacing both have
//! something real to exercise.
//!
//! Conflict detection is point-key only (no range-read tracking): good
//! enough for every code path in this workspace, since the only operation
//! that reads-then-writes on a contested key is `MetricRegistry::ensure`,
//! which reads the name index by point key before writing the descriptor.

use ringtsdb_core::backend::{KvBackend, KvTransaction};
use ringtsdb_core::error::{Error, Result};
use ringtsdb_core::limits::RingConfig;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    versions: HashMap<Vec<u8>, u64>,
    commit_counter: u64,
}

/// In-memory [`KvBackend`] for tests and examples.
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    config: RingConfig,
}

impl MemoryBackend {
    /// Create an empty backend using the given limits.
    pub fn new(config: RingConfig) -> Self {
        MemoryBackend {
            inner: Arc::new(Mutex::new(Inner {
                data: BTreeMap::new(),
                versions: HashMap::new(),
                commit_counter: 0,
            })),
            config,
        }
    }

    /// Snapshot of every key currently stored, for assertions in tests.
    pub fn dump(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.lock().unwrap().data.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(RingConfig::default())
    }
}

struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    config: RingConfig,
    snapshot_version: u64,
    snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    read_keys: HashSet<Vec<u8>>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    bytes_written: usize,
    read_only: bool,
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read_keys.insert(key.to_vec());
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.snapshot.get(key).cloned())
    }

    async fn get_range(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out: Vec<(Vec<u8>, Vec<u8>)> = self
            .snapshot
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, pending) in self.writes.range(begin.to_vec()..end.to_vec()) {
            out.retain(|(existing, _)| existing != k);
            if let Some(v) = pending {
                out.push((k.clone(), v.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if self.read_only {
            return Err(Error::BackendFatal("write on read-only transaction".into()));
        }
        if value.len() > self.config.max_value_bytes {
            return Err(Error::LimitExceeded(format!(
                "value is {} bytes, exceeds max_value_bytes {}",
                value.len(),
                self.config.max_value_bytes
            )));
        }
        self.bytes_written += key.len() + value.len();
        if self.bytes_written > self.config.max_transaction_bytes {
            return Err(Error::LimitExceeded(format!(
                "transaction exceeded max_transaction_bytes {}",
                self.config.max_transaction_bytes
            )));
        }
        self.writes.insert(key, Some(value));
        Ok(())
    }

    async fn clear(&mut self, key: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::BackendFatal("write on read-only transaction".into()));
        }
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    async fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::BackendFatal("write on read-only transaction".into()));
        }
        let keys: Vec<Vec<u8>> = self
            .snapshot
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            self.writes.insert(k, None);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.read_only || self.writes.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        for key in &self.read_keys {
            if let Some(&version) = inner.versions.get(key) {
                if version > self.snapshot_version {
                    return Err(Error::Conflict(format!(
                        "key {key:?} was modified by a concurrent transaction"
                    )));
                }
            }
        }
        inner.commit_counter += 1;
        let new_version = inner.commit_counter;
        for (key, value) in self.writes {
            match value {
                Some(v) => {
                    inner.data.insert(key.clone(), v);
                }
                None => {
                    inner.data.remove(&key);
                }
            }
            inner.versions.insert(key, new_version);
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>> {
        let inner = self.inner.lock().unwrap();
        let txn = MemoryTransaction {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            snapshot_version: inner.commit_counter,
            snapshot: inner.data.clone(),
            read_keys: HashSet::new(),
            writes: BTreeMap::new(),
            bytes_written: 0,
            read_only: false,
        };
        Ok(Box::new(txn))
    }

    async fn begin_read_only(&self) -> Result<Box<dyn KvTransaction>> {
        let inner = self.inner.lock().unwrap();
        let txn = MemoryTransaction {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            snapshot_version: inner.commit_counter,
            snapshot: inner.data.clone(),
            read_keys: HashSet::new(),
            writes: BTreeMap::new(),
            bytes_written: 0,
            read_only: true,
        };
        Ok(Box::new(txn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_in_same_transaction() {
        let backend = MemoryBackend::default();
        let mut txn = backend.begin().await.unwrap();
        txn.set(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(txn.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        txn.commit().await.unwrap();

        let mut read = backend.begin_read_only().await.unwrap();
        assert_eq!(read.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn concurrent_read_modify_write_conflicts() {
        let backend = MemoryBackend::default();
        {
            let mut setup = backend.begin().await.unwrap();
            setup.set(b"k".to_vec(), b"1".to_vec()).await.unwrap();
            setup.commit().await.unwrap();
        }

        let mut t1 = backend.begin().await.unwrap();
        let mut t2 = backend.begin().await.unwrap();
        assert_eq!(t1.get(b"k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(t2.get(b"k").await.unwrap(), Some(b"1".to_vec()));

        t1.set(b"k".to_vec(), b"2".to_vec()).await.unwrap();
        t1.commit().await.unwrap();

        t2.set(b"k".to_vec(), b"3".to_vec()).await.unwrap();
        assert!(t2.commit().await.is_err());
    }

    #[tokio::test]
    async fn value_over_budget_is_rejected() {
        let config = RingConfig {
            max_value_bytes: 4,
            ..RingConfig::default()
        };
        let backend = MemoryBackend::new(config);
        let mut txn = backend.begin().await.unwrap();
        let err = txn.set(b"k".to_vec(), b"toolong".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn clear_range_is_idempotent() {
        let backend = MemoryBackend::default();
        let mut txn = backend.begin().await.unwrap();
        txn.set(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        txn.set(b"b".to_vec(), b"2".to_vec()).await.unwrap();
        txn.commit().await.unwrap();

        let mut t1 = backend.begin().await.unwrap();
        t1.clear_range(b"a", b"z").await.unwrap();
        t1.commit().await.unwrap();
        assert!(backend.dump().is_empty());

        let mut t2 = backend.begin().await.unwrap();
        t2.clear_range(b"a", b"z").await.unwrap();
        t2.commit().await.unwrap();
        assert!(backend.dump().is_empty());
    }
}
