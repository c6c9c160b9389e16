//! Append-only, offset-addressed log over an entity store

use crate::entity_store::EntityStore;
use ferry_core::{FerryError, Offset, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

/// Ordered log of items keyed by a gapless, increasing offset
///
/// Offsets are handed out under a per-instance lock. The head is trimmed only
/// through [`SequentialStore::remove_first`], which holds a separate head lock
/// so appends never wait on trimming.
pub struct SequentialStore<T> {
    entity_store: EntityStore<Offset, T>,
    next_offset: Mutex<Offset>,
    head_lock: Mutex<()>,
}

impl<T> SequentialStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open a log resuming after its last stored offset (0 when empty)
    pub fn create(entity_store: EntityStore<Offset, T>) -> Result<Self> {
        Self::create_with_default_head(entity_store, 0)
    }

    /// Open a log whose next offset is at least `default_head`
    ///
    /// The stored tail still wins when it is further ahead, so offsets
    /// already written are never handed out twice.
    pub fn create_with_default_head(
        entity_store: EntityStore<Offset, T>,
        default_head: Offset,
    ) -> Result<Self> {
        let tail = entity_store
            .last_entry()?
            .map(|(offset, _)| offset + 1)
            .unwrap_or(0);
        let next_offset = tail.max(default_head.max(0));

        tracing::debug!(
            store = entity_store.entity_name(),
            next_offset,
            "Opened sequential store"
        );

        Ok(Self {
            entity_store,
            next_offset: Mutex::new(next_offset),
            head_lock: Mutex::new(()),
        })
    }

    /// Append `item` and return the offset it was stored at
    pub fn append(&self, item: &T) -> Result<Offset> {
        let mut next = self.next_offset.lock();
        let offset = *next;
        self.entity_store.put(&offset, item)?;
        *next = offset + 1;
        Ok(offset)
    }

    /// Up to `batch_size` items with offset `>= start`, in offset order
    pub fn get_batch(&self, start: Offset, batch_size: usize) -> Result<Vec<(Offset, T)>> {
        if start < 0 {
            return Err(FerryError::InvalidArgument(format!(
                "starting offset must be non-negative, got {start}"
            )));
        }
        if batch_size == 0 {
            return Err(FerryError::InvalidArgument(
                "batch size must be at least 1".into(),
            ));
        }
        self.entity_store.batch(Some(&start), batch_size)
    }

    /// Remove the lowest entry if `predicate` accepts it.
    ///
    /// The predicate may mutate other stores. If it fails, nothing is removed
    /// and the error is returned.
    pub fn remove_first<P>(&self, predicate: P) -> Result<bool>
    where
        P: FnOnce(Offset, &T) -> Result<bool>,
    {
        let _head = self.head_lock.lock();

        let Some((offset, item)) = self.entity_store.first_entry()? else {
            return Ok(false);
        };
        if !predicate(offset, &item)? {
            return Ok(false);
        }
        self.entity_store.remove(&offset)?;
        Ok(true)
    }

    /// Offset the next `append` will use
    pub fn next_offset(&self) -> Offset {
        *self.next_offset.lock()
    }

    /// Lowest stored offset, if any
    pub fn first_offset(&self) -> Result<Option<Offset>> {
        Ok(self.entity_store.first_entry()?.map(|(offset, _)| offset))
    }

    pub fn entity_name(&self) -> &str {
        self.entity_store.entity_name()
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<usize> {
        self.entity_store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.entity_store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{DbStoreProvider, InMemoryDbStoreProvider, LockManager};
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn entity_store(provider: &InMemoryDbStoreProvider, name: &str) -> EntityStore<Offset, String> {
        EntityStore::new(
            provider.db_store(name).unwrap(),
            name,
            Arc::new(LockManager::default()),
        )
    }

    #[test]
    fn test_append_starts_at_zero() {
        let provider = InMemoryDbStoreProvider::new();
        let log = SequentialStore::create(entity_store(&provider, "log")).unwrap();

        assert_eq!(log.next_offset(), 0);
        assert_eq!(log.append(&"a".into()).unwrap(), 0);
        assert_eq!(log.append(&"b".into()).unwrap(), 1);
        assert_eq!(log.next_offset(), 2);
        assert_eq!(log.first_offset().unwrap(), Some(0));
    }

    #[test]
    fn test_seeding_takes_max_of_tail_and_default_head() {
        let provider = InMemoryDbStoreProvider::new();
        {
            let log = SequentialStore::create(entity_store(&provider, "log")).unwrap();
            for _ in 0..3 {
                log.append(&"x".into()).unwrap();
            }
        }

        // tail (3) beats a lower head
        let log =
            SequentialStore::create_with_default_head(entity_store(&provider, "log"), 1).unwrap();
        assert_eq!(log.next_offset(), 3);

        // head beats an empty or shorter log
        let log =
            SequentialStore::create_with_default_head(entity_store(&provider, "log"), 10).unwrap();
        assert_eq!(log.append(&"y".into()).unwrap(), 10);

        // negative head is clamped
        let log =
            SequentialStore::create_with_default_head(entity_store(&provider, "fresh"), -1).unwrap();
        assert_eq!(log.next_offset(), 0);
    }

    #[test]
    fn test_get_batch_paging() {
        let provider = InMemoryDbStoreProvider::new();
        let log = SequentialStore::create(entity_store(&provider, "log")).unwrap();
        for i in 0..10 {
            log.append(&format!("item-{i}")).unwrap();
        }

        let mut start = 0;
        let mut seen = Vec::new();
        loop {
            let page = log.get_batch(start, 3).unwrap();
            assert!(page.len() <= 3);
            let Some((last, _)) = page.last() else { break };
            start = last + 1;
            seen.extend(page.into_iter().map(|(offset, _)| offset));
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        assert!(log.get_batch(-1, 3).unwrap_err().is_invalid_argument());
        assert!(log.get_batch(0, 0).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_remove_first_respects_predicate() {
        let provider = InMemoryDbStoreProvider::new();
        let log = SequentialStore::create(entity_store(&provider, "log")).unwrap();
        assert!(!log.remove_first(|_, _| Ok(true)).unwrap());

        for i in 0..3 {
            log.append(&format!("item-{i}")).unwrap();
        }

        assert!(!log.remove_first(|_, _| Ok(false)).unwrap());
        assert_eq!(log.len().unwrap(), 3);

        assert!(log.remove_first(|offset, item| Ok(offset == 0 && item == "item-0")).unwrap());
        assert_eq!(log.first_offset().unwrap(), Some(1));

        let err = log
            .remove_first(|_, _| Err(FerryError::Storage("boom".into())))
            .unwrap_err();
        assert!(matches!(err, FerryError::Storage(_)));
        assert_eq!(log.first_offset().unwrap(), Some(1));

        // trimming never reuses offsets
        assert_eq!(log.append(&"next".into()).unwrap(), 3);
    }

    #[test]
    fn test_concurrent_append_is_gapless() {
        let provider = InMemoryDbStoreProvider::new();
        let log = Arc::new(SequentialStore::create(entity_store(&provider, "log")).unwrap());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    (0..25)
                        .map(|i| log.append(&format!("{t}-{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut offsets = HashSet::new();
        for h in handles {
            for offset in h.join().unwrap() {
                assert!(offsets.insert(offset), "offset {offset} handed out twice");
            }
        }
        assert_eq!(offsets, (0..200).collect::<HashSet<_>>());
    }
}
