use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a durable partitioned store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStoreConfig {
    /// Directory holding the store files
    pub path: PathBuf,

    /// Maximum map size for LMDB (in bytes)
    /// Default: 1GB
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of named partitions (LMDB named databases)
    ///
    /// The message store opens one partition per endpoint plus two shared
    /// ones, so this bounds how many endpoints can be registered.
    /// Default: 1024
    #[serde(default = "default_max_partitions")]
    pub max_partitions: u32,

    /// Maximum number of concurrent readers (LMDB specific)
    /// Default: 126
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// Sync mode for durability
    #[serde(default)]
    pub sync_mode: SyncMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Full durability – calls `fsync()` on every commit.
    ///
    /// Committed data survives power loss and OS crashes, at the cost of the
    /// highest write latency.
    Full,

    /// Skips syncing the LMDB meta-page on each commit (default).
    ///
    /// Data pages are still synced. After an OS crash the last commit _may_
    /// be lost but the store stays consistent.
    #[default]
    NoMetaSync,

    /// Disables `fsync()` entirely – the OS page cache decides when to flush.
    ///
    /// **WARNING**: no durability beyond process lifetime. Only for
    /// ephemeral or test workloads.
    NoSync,
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_max_partitions() -> u32 {
    1024
}

fn default_max_readers() -> u32 {
    126
}

impl DbStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size: default_map_size(),
            max_partitions: default_max_partitions(),
            max_readers: default_max_readers(),
            sync_mode: SyncMode::default(),
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_max_partitions(mut self, max_partitions: u32) -> Self {
        self.max_partitions = max_partitions;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}
