use ferry_core::{
    config::{DbStoreConfig, SyncMode},
    error::{FerryError, Result},
    traits::{DbStore, DbStoreProvider},
};
use lmdb::{DatabaseFlags, Environment, EnvironmentFlags, Transaction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{db_store::LmdbDbStore, storage_err};

/// Named partition used for `default_db_store`.
///
/// LMDB's unnamed database stores the names of the named ones, so it is
/// never handed out for data.
const DEFAULT_PARTITION: &str = "$default";

/// LMDB environment handing out one named database per partition
pub struct LmdbDbStoreProvider {
    env: Arc<Environment>,
    path: PathBuf,
    partitions: Mutex<HashMap<String, Arc<LmdbDbStore>>>,
    closed: AtomicBool,
}

impl LmdbDbStoreProvider {
    pub fn open(cfg: DbStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.path)?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(cfg.max_partitions);
        env_builder.set_map_size(cfg.map_size);
        env_builder.set_max_readers(cfg.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match cfg.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => {
                flags.insert(EnvironmentFlags::NO_META_SYNC);
            }
            SyncMode::NoSync => {
                flags.insert(EnvironmentFlags::NO_SYNC);
            }
        }
        env_builder.set_flags(flags);

        let env = env_builder
            .open(&cfg.path)
            .map_err(|e| FerryError::Io(std::io::Error::other(e)))?;

        tracing::info!(
            path = %cfg.path.display(),
            sync_mode = ?cfg.sync_mode,
            "Opened LMDB store"
        );

        Ok(Self {
            env: Arc::new(env),
            path: cfg.path,
            partitions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Directory the environment lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FerryError::InvalidState(format!(
                "LMDB store at {} is closed",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl DbStoreProvider for LmdbDbStoreProvider {
    fn db_store(&self, partition: &str) -> Result<Arc<dyn DbStore>> {
        self.ensure_open()?;

        let mut partitions = self.partitions.lock();
        if let Some(store) = partitions.get(partition) {
            return Ok(store.clone());
        }

        let db = self
            .env
            .create_db(Some(partition), DatabaseFlags::empty())
            .map_err(storage_err)?;
        let store = Arc::new(LmdbDbStore::new(
            self.env.clone(),
            db,
            partition.to_string(),
        ));
        partitions.insert(partition.to_string(), store.clone());

        tracing::debug!(partition, "Opened partition");
        Ok(store)
    }

    fn default_db_store(&self) -> Result<Arc<dyn DbStore>> {
        self.db_store(DEFAULT_PARTITION)
    }

    fn remove_db_store(&self, partition: &str) -> Result<()> {
        self.ensure_open()?;

        let mut partitions = self.partitions.lock();
        partitions.remove(partition);

        // The partition may exist on disk without having been opened in this
        // process.
        let db = match self.env.open_db(Some(partition)) {
            Ok(db) => db,
            Err(lmdb::Error::NotFound) => return Ok(()),
            Err(e) => return Err(storage_err(e)),
        };

        // clear_db rather than drop_db: handles cloned out earlier stay valid
        // and simply see an empty partition.
        let mut txn = self.env.begin_rw_txn().map_err(storage_err)?;
        txn.clear_db(db).map_err(storage_err)?;
        txn.commit().map_err(storage_err)?;

        tracing::debug!(partition, "Removed partition");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.partitions.lock().clear();
        // LMDB closes the environment when the last handle drops
        self.env.sync(true).map_err(storage_err)
    }
}
