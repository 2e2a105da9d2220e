//! LMDB-backed ledger store.

use crate::error::Result;
use crate::store::{Batch, BatchOp, KvStore};
use lmdb::{
    Environment,
    Database,
    DatabaseFlags,
    WriteFlags,
    Transaction as LmdbTxn,
    Cursor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the single LMDB database holding all ledger keys.
/// Keys carry their own 1-byte prefix (see `keys`).
pub const LEDGER_DB_NAME: &str = "ledger";

const MAP_SIZE: usize = 1_000_000_000;

pub struct LmdbStore {
    env: Arc<Environment>,
    env_path: PathBuf,
    db: Database,
}

impl LmdbStore {
    /// Buka LMDB environment di path, buat DB ledger jika belum ada
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let p = path.as_ref();
        std::fs::create_dir_all(p)?;

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE)
            .open(p)?;
        let db = env.create_db(Some(LEDGER_DB_NAME), DatabaseFlags::empty())?;
        debug!("opened ledger store at {}", p.display());

        Ok(LmdbStore {
            env: Arc::new(env),
            env_path: p.to_path_buf(),
            db,
        })
    }

    pub fn path(&self) -> &Path { &self.env_path }
}

impl KvStore for LmdbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let rtxn = self.env.begin_ro_txn()?;
        match rtxn.get(self.db, &key) {
            Ok(v) => Ok(Some(v.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut wtxn = self.env.begin_rw_txn()?;
        wtxn.put(self.db, &key, &value, WriteFlags::empty())?;
        wtxn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let mut wtxn = self.env.begin_rw_txn()?;
        match wtxn.del(self.db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        wtxn.commit()?;
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rtxn = self.env.begin_ro_txn()?;
        let mut cursor = rtxn.open_ro_cursor(self.db)?;
        let mut out = Vec::new();
        // iter_from panics when nothing sorts at or after the prefix
        for (key, val) in cursor.iter() {
            if key < prefix {
                continue;
            }
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), val.to_vec()));
        }
        Ok(out)
    }

    fn write_batch(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let n = batch.len();
        let mut wtxn = self.env.begin_rw_txn()?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => wtxn.put(self.db, &k, &v, WriteFlags::empty())?,
                BatchOp::Delete(k) => match wtxn.del(self.db, &k, None) {
                    Ok(()) | Err(lmdb::Error::NotFound) => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        wtxn.commit()?;
        debug!("committed batch of {} ops", n);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lmdb_get_set_delete() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        store.set(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert!(!store.has(b"a").unwrap());
        // deleting a missing key is fine
        store.delete(b"a").unwrap();
    }

    #[test]
    fn test_lmdb_prefix_scan_stops_at_prefix_boundary() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        let mut batch = Batch::new();
        batch.put(vec![0x41, 2], b"b".to_vec());
        batch.put(vec![0x41, 1], b"a".to_vec());
        batch.put(vec![0x42, 0], b"c".to_vec());
        batch.put(vec![0x40, 9], b"z".to_vec());
        store.write_batch(batch).unwrap();

        let got = store.iter_prefix(&[0x41]).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, vec![0x41, 1]);
        assert_eq!(got[1].0, vec![0x41, 2]);
    }

    #[test]
    fn test_lmdb_prefix_scan_on_empty_store() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        assert!(store.iter_prefix(&[0x21]).unwrap().is_empty());
    }

    #[test]
    fn test_lmdb_prefix_scan_past_last_key() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        store.set(&[0x21, 1], b"v").unwrap();
        assert!(store.iter_prefix(&[0x42]).unwrap().is_empty());
        assert_eq!(store.iter_prefix(&[0x21]).unwrap().len(), 1);
        assert!(store.iter_prefix(&[0x20]).unwrap().is_empty());
    }

    #[test]
    fn test_lmdb_reopen_persists() {
        let dir = tempdir().unwrap();
        {
            let store = LmdbStore::open(dir.path()).unwrap();
            store.set(b"persist", b"yes").unwrap();
        }
        let store = LmdbStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"persist").unwrap(), Some(b"yes".to_vec()));
    }
}
