//! Typed keyed store over one raw partition
//!
//! Values are stored as JSON. Read-modify-write operations take the stripe
//! lock of their key, so two `update`s on the same key never interleave.

use crate::keys::StoreKey;
use ferry_core::{DbStore, FerryError, LockManager, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn encode_value<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| FerryError::Serialization(e.to_string()))
}

pub(crate) fn decode_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    serde_json::from_slice(bytes).map_err(|e| FerryError::Serialization(e.to_string()))
}

/// Typed view of one partition
pub struct EntityStore<K, V> {
    db_store: Arc<dyn DbStore>,
    entity_name: String,
    locks: Arc<LockManager>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> EntityStore<K, V>
where
    K: StoreKey,
    V: Serialize + DeserializeOwned,
{
    pub fn new(
        db_store: Arc<dyn DbStore>,
        entity_name: impl Into<String>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            db_store,
            entity_name: entity_name.into(),
            locks,
            _marker: PhantomData,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.get_raw(&key.to_key_bytes())
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<V>> {
        self.db_store
            .get(key)?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Unconditional upsert
    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.db_store.put(&key.to_key_bytes(), &encode_value(value)?)
    }

    /// Idempotent
    pub fn remove(&self, key: &K) -> Result<()> {
        self.db_store.remove(&key.to_key_bytes())
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        self.db_store.contains(&key.to_key_bytes())
    }

    /// Replace the value with `f(old)`.
    ///
    /// Returns the new value, or `None` without writing if the key is absent.
    pub fn update<F>(&self, key: &K, f: F) -> Result<Option<V>>
    where
        F: FnOnce(V) -> V,
    {
        let raw_key = key.to_key_bytes();
        let _guard = self.locks.lock(&raw_key)?;

        let Some(old) = self.get_raw(&raw_key)? else {
            return Ok(None);
        };
        let new = f(old);
        self.db_store.put(&raw_key, &encode_value(&new)?)?;
        Ok(Some(new))
    }

    /// Insert `initial` if absent, otherwise replace with `f(old)`.
    ///
    /// Returns the value now stored.
    pub fn put_or_update<F>(&self, key: &K, initial: V, f: F) -> Result<V>
    where
        F: FnOnce(V) -> V,
    {
        let raw_key = key.to_key_bytes();
        let _guard = self.locks.lock(&raw_key)?;

        let value = match self.get_raw(&raw_key)? {
            Some(old) => f(old),
            None => initial,
        };
        self.db_store.put(&raw_key, &encode_value(&value)?)?;
        Ok(value)
    }

    /// Store `value` only if the key is absent. Returns whatever is stored
    /// afterwards.
    pub fn find_or_put(&self, key: &K, value: V) -> Result<V> {
        let raw_key = key.to_key_bytes();
        let _guard = self.locks.lock(&raw_key)?;

        if let Some(existing) = self.get_raw(&raw_key)? {
            return Ok(existing);
        }
        self.db_store.put(&raw_key, &encode_value(&value)?)?;
        Ok(value)
    }

    /// Remove the key if it exists and `predicate` accepts its value.
    pub fn remove_if<P>(&self, key: &K, predicate: P) -> Result<bool>
    where
        P: FnOnce(&V) -> bool,
    {
        let raw_key = key.to_key_bytes();
        let _guard = self.locks.lock(&raw_key)?;

        match self.get_raw(&raw_key)? {
            Some(value) if predicate(&value) => {
                self.db_store.remove(&raw_key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Visit up to `batch_size` entries with key `>= start` in key order
    pub fn iterate_batch<F>(&self, start: Option<&K>, batch_size: usize, mut f: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<()>,
    {
        let start = start.map(StoreKey::to_key_bytes);
        self.db_store
            .iterate_batch(start.as_deref(), batch_size, &mut |key: &[u8], value: &[u8]| {
                f(K::from_key_bytes(key)?, decode_value(value)?)
            })
    }

    /// Collect up to `batch_size` entries with key `>= start`
    pub fn batch(&self, start: Option<&K>, batch_size: usize) -> Result<Vec<(K, V)>> {
        let mut out = Vec::new();
        self.iterate_batch(start, batch_size, |k, v| {
            out.push((k, v));
            Ok(())
        })?;
        Ok(out)
    }

    /// Visit every entry, paging `page_size` entries at a time
    pub fn for_each<F>(&self, page_size: usize, mut f: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<()>,
    {
        if page_size == 0 {
            return Err(FerryError::InvalidArgument(
                "page size must be at least 1".into(),
            ));
        }

        let mut cursor: Option<Vec<u8>> = None;
        loop {
            // a resumed scan re-reads the previous page's last key
            let requested = page_size + usize::from(cursor.is_some());
            let page = self.db_store.scan_batch(cursor.as_deref(), requested)?;
            let full = page.len() == requested;
            let mut last = None;
            for (key, value) in page {
                if cursor.as_deref() == Some(key.as_slice()) {
                    continue;
                }
                f(K::from_key_bytes(&key)?, decode_value(&value)?)?;
                last = Some(key);
            }
            match last {
                Some(key) if full => cursor = Some(key),
                _ => return Ok(()),
            }
        }
    }

    pub fn first_entry(&self) -> Result<Option<(K, V)>> {
        self.db_store
            .first_entry()?
            .map(|(k, v)| Ok((K::from_key_bytes(&k)?, decode_value(&v)?)))
            .transpose()
    }

    pub fn last_entry(&self) -> Result<Option<(K, V)>> {
        self.db_store
            .last_entry()?
            .map(|(k, v)| Ok((K::from_key_bytes(&k)?, decode_value(&v)?)))
            .transpose()
    }

    /// Number of entries (full scan)
    pub fn len(&self) -> Result<usize> {
        self.db_store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.db_store.is_empty()
    }
}
