//! Volatile in-memory partitions
//!
//! Same contract as the durable backends, nothing survives the process.
//! Used when no data directory is configured and throughout the test suites.

use crate::error::Result;
use crate::traits::{DbStore, DbStoreProvider, KvEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

const DEFAULT_PARTITION: &str = "default";

/// One in-memory partition backed by an ordered map
pub struct InMemoryDbStore {
    name: String,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryDbStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

impl DbStore for InMemoryDbStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn first_entry(&self) -> Result<Option<KvEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn last_entry(&self) -> Result<Option<KvEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn scan_batch(&self, start: Option<&[u8]>, batch_size: usize) -> Result<Vec<KvEntry>> {
        let entries = self.entries.read();
        let lower = match start {
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        };
        Ok(entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .take(batch_size)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }
}

/// Provider handing out in-memory partitions by name
#[derive(Default)]
pub struct InMemoryDbStoreProvider {
    partitions: Mutex<HashMap<String, Arc<InMemoryDbStore>>>,
}

impl InMemoryDbStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all currently open partitions
    pub fn partitions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl DbStoreProvider for InMemoryDbStoreProvider {
    fn db_store(&self, partition: &str) -> Result<Arc<dyn DbStore>> {
        let store = self
            .partitions
            .lock()
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(InMemoryDbStore::new(partition)))
            .clone();
        Ok(store)
    }

    fn default_db_store(&self) -> Result<Arc<dyn DbStore>> {
        self.db_store(DEFAULT_PARTITION)
    }

    fn remove_db_store(&self, partition: &str) -> Result<()> {
        if let Some(store) = self.partitions.lock().remove(partition) {
            // other holders of the handle must observe an empty partition
            store.clear();
            tracing::debug!(partition, "Removed in-memory partition");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last_follow_byte_order() {
        let store = InMemoryDbStore::new("t");
        store.put(b"b", b"2").unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"c", b"3").unwrap();

        assert_eq!(store.first_entry().unwrap().unwrap().0, b"a".to_vec());
        assert_eq!(store.last_entry().unwrap().unwrap().0, b"c".to_vec());
    }

    #[test]
    fn test_scan_batch_starts_at_or_after_key() {
        let store = InMemoryDbStore::new("t");
        for k in [b"a", b"c", b"e", b"g"] {
            store.put(k, b"v").unwrap();
        }

        let page = store.scan_batch(Some(b"b"), 2).unwrap();
        let keys: Vec<_> = page.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"e".to_vec()]);

        let page = store.scan_batch(Some(b"e"), 10).unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = InMemoryDbStore::new("t");
        store.put(b"k", b"v").unwrap();
        store.remove(b"k").unwrap();
        store.remove(b"k").unwrap();
        assert!(!store.contains(b"k").unwrap());
    }

    #[test]
    fn test_iterate_batch_callback_can_mutate() {
        let store = InMemoryDbStore::new("t");
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();

        store
            .iterate_batch(None, 10, &mut |key, _| store.remove(key))
            .unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_provider_reuses_and_removes_partitions() {
        let provider = InMemoryDbStoreProvider::new();
        let a = provider.db_store("a").unwrap();
        a.put(b"k", b"v").unwrap();

        let again = provider.db_store("a").unwrap();
        assert_eq!(again.get(b"k").unwrap(), Some(b"v".to_vec()));

        provider.remove_db_store("a").unwrap();
        assert!(a.is_empty().unwrap());
        assert!(provider.partitions().is_empty());
    }

    #[test]
    fn test_default_len_pages_through_scan() {
        struct Paged(InMemoryDbStore);
        impl DbStore for Paged {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
                self.0.get(key)
            }
            fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
                self.0.put(key, value)
            }
            fn remove(&self, key: &[u8]) -> Result<()> {
                self.0.remove(key)
            }
            fn first_entry(&self) -> Result<Option<KvEntry>> {
                self.0.first_entry()
            }
            fn last_entry(&self) -> Result<Option<KvEntry>> {
                self.0.last_entry()
            }
            fn scan_batch(&self, start: Option<&[u8]>, n: usize) -> Result<Vec<KvEntry>> {
                self.0.scan_batch(start, n)
            }
        }

        let store = Paged(InMemoryDbStore::new("t"));
        for i in 0u32..2500 {
            store.put(&i.to_be_bytes(), b"v").unwrap();
        }
        assert_eq!(store.len().unwrap(), 2500);
    }
}
