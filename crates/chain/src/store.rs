//! Key-value store abstraction.
//!
//! Every keeper reads and writes through [`KvStore`]. Methods take `&self`;
//! engines synchronize internally so several keepers can share one store
//! inside a transaction.

use crate::error::{LedgerError, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Single pending mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered list of mutations applied atomically by [`KvStore::write_batch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self { Batch::default() }
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) { self.ops.push(BatchOp::Put(key, value)); }
    pub fn delete(&mut self, key: Vec<u8>) { self.ops.push(BatchOp::Delete(key)); }
    pub fn len(&self) -> usize { self.ops.len() }
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }
    pub fn ops(&self) -> &[BatchOp] { &self.ops }
    pub fn into_ops(self) -> Vec<BatchOp> { self.ops }
}

pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, ascending by key.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every op or none of them.
    fn write_batch(&self, batch: Batch) -> Result<()>;
}

// ════════════════════════════════════════════════════════════════════════════
// RECORD CODEC
// ════════════════════════════════════════════════════════════════════════════

/// Read and bincode-decode a record. Decode failures are `Codec` errors.
pub fn get_record<T: DeserializeOwned>(store: &dyn KvStore, key: &[u8]) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put_record<T: Serialize>(store: &dyn KvStore, key: &[u8], value: &T) -> Result<()> {
    let blob = bincode::serialize(value)?;
    store.set(key, &blob)
}

/// Decode every record under `prefix`.
pub fn records_with_prefix<T: DeserializeOwned>(store: &dyn KvStore, prefix: &[u8]) -> Result<Vec<T>> {
    store
        .iter_prefix(prefix)?
        .into_iter()
        .map(|(_, v)| bincode::deserialize(&v).map_err(LedgerError::from))
        .collect()
}

/// Upper bound for a prefix scan, `None` when the prefix is all `0xff`.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let end = match prefix_end(prefix) {
        Some(e) => Bound::Excluded(e),
        None => Bound::Unbounded,
    };
    (start, end)
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ════════════════════════════════════════════════════════════════════════════

/// In-memory engine backed by an ordered map.
#[derive(Default)]
pub struct MemStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self { MemStore::default() }

    pub fn len(&self) -> usize { self.data.read().len() }

    pub fn is_empty(&self) -> bool { self.data.read().is_empty() }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix_range(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => { data.insert(k, v); }
                BatchOp::Delete(k) => { data.remove(&k); }
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CACHE STORE (transaction overlay)
// ════════════════════════════════════════════════════════════════════════════

/// Write overlay over a parent store.
///
/// Reads see the overlay first. Nothing reaches the parent until the caller
/// turns the overlay into a [`Batch`] and commits it; dropping the overlay
/// discards every write.
pub struct CacheStore<'a> {
    parent: &'a dyn KvStore,
    // None marks a deletion
    writes: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a dyn KvStore) -> Self {
        CacheStore {
            parent,
            writes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn is_dirty(&self) -> bool { !self.writes.read().is_empty() }

    /// Pending writes in key order.
    pub fn into_batch(self) -> Batch {
        let mut batch = Batch::new();
        for (k, v) in self.writes.into_inner() {
            match v {
                Some(v) => batch.put(k, v),
                None => batch.delete(k),
            }
        }
        batch
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.writes.read().get(key) {
            return Ok(entry.clone());
        }
        self.parent.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.write().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.write().insert(key.to_vec(), None);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.parent.iter_prefix(prefix)?.into_iter().collect();
        for (k, v) in self.writes.read().range(prefix_range(prefix)) {
            match v {
                Some(v) => { merged.insert(k.clone(), v.clone()); }
                None => { merged.remove(k); }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        let mut writes = self.writes.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => { writes.insert(k, Some(v)); }
                BatchOp::Delete(k) => { writes.insert(k, None); }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(&[0x21]), Some(vec![0x22]));
        assert_eq!(prefix_end(&[0x21, 0xff]), Some(vec![0x22]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
    }

    #[test]
    fn test_mem_store_prefix_iteration_is_ordered() {
        let s = MemStore::new();
        s.set(&[0x41, 2], b"b").unwrap();
        s.set(&[0x41, 1], b"a").unwrap();
        s.set(&[0x42, 1], b"other").unwrap();
        let got = s.iter_prefix(&[0x41]).unwrap();
        assert_eq!(got, vec![(vec![0x41, 1], b"a".to_vec()), (vec![0x41, 2], b"b".to_vec())]);
    }

    #[test]
    fn test_cache_store_isolates_until_commit() {
        let parent = MemStore::new();
        parent.set(b"k1", b"v1").unwrap();
        parent.set(b"k2", b"v2").unwrap();

        let cache = CacheStore::new(&parent);
        cache.set(b"k3", b"v3").unwrap();
        cache.delete(b"k1").unwrap();

        assert_eq!(cache.get(b"k1").unwrap(), None);
        assert_eq!(cache.get(b"k3").unwrap(), Some(b"v3".to_vec()));
        assert_eq!(parent.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert!(!parent.has(b"k3").unwrap());

        let keys: Vec<Vec<u8>> = cache.iter_prefix(b"k").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"k2".to_vec(), b"k3".to_vec()]);

        let batch = cache.into_batch();
        parent.write_batch(batch).unwrap();
        assert!(!parent.has(b"k1").unwrap());
        assert_eq!(parent.get(b"k3").unwrap(), Some(b"v3".to_vec()));
    }

    #[test]
    fn test_cache_store_drop_discards() {
        let parent = MemStore::new();
        {
            let cache = CacheStore::new(&parent);
            cache.set(b"x", b"1").unwrap();
        }
        assert!(parent.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_codec_error() {
        let s = MemStore::new();
        s.set(b"rec", &[0xff]).unwrap();
        let err = get_record::<(u64, String)>(&s, b"rec").unwrap_err();
        assert!(err.is_fatal());
    }
}
