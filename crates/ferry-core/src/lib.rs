//! Ferry Core: traits and types shared by the ferry message store crates
//!
//! This crate defines:
//! - The raw partitioned key/value contract (`DbStore`, `DbStoreProvider`)
//!   that every typed store is layered on
//! - A volatile in-memory implementation of that contract
//! - Striped per-key locking used for read-modify-write operations
//! - Configuration structs for the storage backend and the message store
//! - The shared error type

pub mod config;
pub mod error;
pub mod lock_manager;
pub mod memory;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{DbStoreConfig, MessageStoreConfig, SyncMode};
pub use error::{FerryError, Result};
pub use lock_manager::LockManager;
pub use memory::{InMemoryDbStore, InMemoryDbStoreProvider};
pub use traits::{DbStore, DbStoreProvider, KvEntry};
pub use types::{Offset, INVALID_OFFSET};
