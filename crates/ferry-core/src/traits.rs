//! Raw storage contract
//!
//! Every typed store in ferry is built on a [`DbStore`]: one named partition
//! of an ordered byte key/value engine. Keys compare byte-lexicographically.

use crate::error::Result;
use std::sync::Arc;

/// A raw `(key, value)` pair read from a partition
pub type KvEntry = (Vec<u8>, Vec<u8>);

/// Page size used by the default `len` implementation
const COUNT_PAGE_SIZE: usize = 1024;

/// One named partition of an ordered byte key/value store
///
/// Every mutation is committed before the call returns, so a durable backend
/// makes it durable immediately.
pub trait DbStore: Send + Sync {
    /// Partition name
    fn name(&self) -> &str;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Unconditional upsert
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &[u8]) -> Result<()>;

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Entry with the smallest key
    fn first_entry(&self) -> Result<Option<KvEntry>>;

    /// Entry with the largest key
    fn last_entry(&self) -> Result<Option<KvEntry>>;

    /// Read up to `batch_size` entries in key order, starting at the first
    /// key `>= start` (or at the beginning when `start` is `None`).
    fn scan_batch(&self, start: Option<&[u8]>, batch_size: usize) -> Result<Vec<KvEntry>>;

    /// Visit up to `batch_size` entries in key order.
    ///
    /// The partition read completes before the first callback runs, so the
    /// callback is free to mutate this store.
    fn iterate_batch(
        &self,
        start: Option<&[u8]>,
        batch_size: usize,
        callback: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        for (key, value) in self.scan_batch(start, batch_size)? {
            callback(&key, &value)?;
        }
        Ok(())
    }

    /// Number of entries in the partition (full scan unless overridden)
    fn len(&self) -> Result<usize> {
        let mut count = 0;
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let page = self.scan_batch(cursor.as_deref(), COUNT_PAGE_SIZE)?;
            // resuming at the last key re-reads it, so skip it after page one
            let skip = usize::from(cursor.is_some());
            let fresh = page.len().saturating_sub(skip);
            count += fresh;
            if page.len() < COUNT_PAGE_SIZE || fresh == 0 {
                return Ok(count);
            }
            cursor = page.last().map(|(k, _)| k.clone());
        }
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.first_entry()?.is_none())
    }
}

/// Source of named partitions
pub trait DbStoreProvider: Send + Sync {
    /// Open (creating if needed) the named partition
    fn db_store(&self, partition: &str) -> Result<Arc<dyn DbStore>>;

    /// The unnamed default partition
    fn default_db_store(&self) -> Result<Arc<dyn DbStore>>;

    /// Delete every entry of the partition and forget its handle
    fn remove_db_store(&self, partition: &str) -> Result<()>;

    /// Flush and release the underlying engine
    fn close(&self) -> Result<()>;
}
