use ferry_core::{
    error::{FerryError, Result},
    traits::{DbStore, KvEntry},
};
use lmdb::{Cursor, Database, Environment, RoCursor, RwTransaction, Transaction, WriteFlags};
use std::sync::Arc;

use crate::storage_err;

/// One named LMDB database
///
/// Reads open a short read-only transaction; writes open, apply and commit a
/// write transaction before returning.
pub struct LmdbDbStore {
    env: Arc<Environment>,
    db: Database,
    name: String,
}

impl LmdbDbStore {
    pub(crate) fn new(env: Arc<Environment>, db: Database, name: String) -> Self {
        Self { env, db, name }
    }

    fn write<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut RwTransaction<'_>, Database) -> std::result::Result<(), lmdb::Error>,
    {
        let mut txn = self.env.begin_rw_txn().map_err(storage_err)?;
        op(&mut txn, self.db).map_err(storage_err)?;
        txn.commit().map_err(storage_err)
    }

    /// Position the cursor with `op` and return the entry it lands on
    fn cursor_entry(cursor: &RoCursor<'_>, op: u32) -> Result<Option<KvEntry>> {
        match cursor.get(None, None, op) {
            Ok((Some(key), value)) => Ok(Some((key.to_vec(), value.to_vec()))),
            Ok((None, _)) => Err(FerryError::Storage(
                "LMDB cursor returned an entry without a key".into(),
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn edge_entry(&self, op: u32) -> Result<Option<KvEntry>> {
        let txn = self.env.begin_ro_txn().map_err(storage_err)?;
        let cursor = txn.open_ro_cursor(self.db).map_err(storage_err)?;
        Self::cursor_entry(&cursor, op)
    }
}

impl DbStore for LmdbDbStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.env.begin_ro_txn().map_err(storage_err)?;
        match txn.get(self.db, &key) {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(|txn, db| txn.put(db, &key, &value, WriteFlags::empty()))
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.write(|txn, db| match txn.del(db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
            Err(e) => Err(e),
        })
    }

    fn first_entry(&self) -> Result<Option<KvEntry>> {
        self.edge_entry(lmdb_sys::MDB_FIRST)
    }

    fn last_entry(&self) -> Result<Option<KvEntry>> {
        self.edge_entry(lmdb_sys::MDB_LAST)
    }

    fn scan_batch(&self, start: Option<&[u8]>, batch_size: usize) -> Result<Vec<KvEntry>> {
        let mut results = Vec::with_capacity(batch_size.min(1024));
        if batch_size == 0 {
            return Ok(results);
        }

        let txn = self.env.begin_ro_txn().map_err(storage_err)?;
        let cursor = txn.open_ro_cursor(self.db).map_err(storage_err)?;

        // Position explicitly instead of using iter_from: an unpositioned
        // cursor on an empty range makes the lmdb iterator panic.
        let first = match start {
            Some(start) => match cursor.get(Some(start), None, lmdb_sys::MDB_SET_RANGE) {
                // an exact match leaves the caller's key buffer in place
                Ok((key, value)) => Some((
                    key.map(<[u8]>::to_vec).unwrap_or_else(|| start.to_vec()),
                    value.to_vec(),
                )),
                Err(lmdb::Error::NotFound) => None,
                Err(e) => return Err(storage_err(e)),
            },
            None => Self::cursor_entry(&cursor, lmdb_sys::MDB_FIRST)?,
        };

        let Some(first) = first else {
            return Ok(results);
        };
        results.push(first);

        while results.len() < batch_size {
            match Self::cursor_entry(&cursor, lmdb_sys::MDB_NEXT)? {
                Some(entry) => results.push(entry),
                None => break,
            }
        }

        Ok(results)
    }
}
