use crate::{entity_store::EntityStore, keys::StoreKey, sequential_store::SequentialStore};
use ferry_core::{
    DbStoreConfig, DbStoreProvider, InMemoryDbStoreProvider, LockManager, Offset, Result,
};
use ferry_lmdb::LmdbDbStoreProvider;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Hands out typed stores over the partitions of one raw provider
///
/// All entity stores created here share a single [`LockManager`].
#[derive(Clone)]
pub struct StoreProvider {
    db_provider: Arc<dyn DbStoreProvider>,
    locks: Arc<LockManager>,
}

impl StoreProvider {
    pub fn new(db_provider: Arc<dyn DbStoreProvider>) -> Self {
        Self::with_lock_manager(db_provider, LockManager::default())
    }

    pub fn with_lock_manager(db_provider: Arc<dyn DbStoreProvider>, locks: LockManager) -> Self {
        Self {
            db_provider,
            locks: Arc::new(locks),
        }
    }

    /// Volatile provider, for tests and stores that need not survive restarts
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDbStoreProvider::new()))
    }

    /// Durable provider backed by an LMDB environment at `cfg.path`
    pub fn open_lmdb(cfg: DbStoreConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(LmdbDbStoreProvider::open(cfg)?)))
    }

    pub fn entity_store<K, V>(&self, name: &str) -> Result<EntityStore<K, V>>
    where
        K: StoreKey,
        V: Serialize + DeserializeOwned,
    {
        Ok(EntityStore::new(
            self.db_provider.db_store(name)?,
            name,
            self.locks.clone(),
        ))
    }

    pub fn sequential_store<T>(&self, name: &str) -> Result<SequentialStore<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        SequentialStore::create(self.entity_store(name)?)
    }

    /// Sequential store whose next offset is at least `default_head`
    pub fn sequential_store_with_default_head<T>(
        &self,
        name: &str,
        default_head: Offset,
    ) -> Result<SequentialStore<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        SequentialStore::create_with_default_head(self.entity_store(name)?, default_head)
    }

    /// Delete every entry stored under `name`
    pub fn remove_store(&self, name: &str) -> Result<()> {
        self.db_provider.remove_db_store(name)
    }

    pub fn db_provider(&self) -> &Arc<dyn DbStoreProvider> {
        &self.db_provider
    }

    pub fn close(&self) -> Result<()> {
        self.db_provider.close()
    }
}
