//! LMDB-backed partitioned store
//!
//! Implements the ferry raw storage contract on top of LMDB.
//!
//! Key features:
//! - One LMDB environment per provider, one named database per partition
//! - Every mutation is its own committed write transaction
//! - Ordered scans via raw cursors (byte-lexicographic key order)
//! - Configurable sync mode for durability vs. latency

pub mod db_store;
pub mod store;

pub use db_store::LmdbDbStore;
pub use store::LmdbDbStoreProvider;

use ferry_core::FerryError;

pub(crate) fn storage_err(e: lmdb::Error) -> FerryError {
    FerryError::Storage(e.to_string())
}
